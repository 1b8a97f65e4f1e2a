//! Exchange history reconstructed from ledger events, paged over a bounded
//! block window instead of scanning the whole chain.

use campus_economics::{AccountId, SwapKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::LedgerServiceError;
use crate::ledger_service::LedgerService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeEventKind {
    TokensPurchased,
    TokensSold,
}

impl From<SwapKind> for ExchangeEventKind {
    fn from(kind: SwapKind) -> Self {
        match kind {
            SwapKind::Buy => ExchangeEventKind::TokensPurchased,
            SwapKind::Sell => ExchangeEventKind::TokensSold,
        }
    }
}

/// Raw event as emitted by the ledger for a confirmed swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeEvent {
    pub kind: ExchangeEventKind,
    pub account: AccountId,
    pub token_amount: u128,
    pub currency_amount: u128,
    pub block_number: u64,
    pub tx_ref: String,
    pub log_index: u32,
}

/// Inclusive block range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn contains(&self, block: u64) -> bool {
        self.from <= block && block <= self.to
    }
}

/// One human-readable history row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    /// `buy-<tx>-<i>` or `sell-<tx>-<i>`
    pub id: String,
    pub kind: SwapKind,
    pub token_amount: u128,
    pub currency_amount: u128,
    pub block_number: u64,
    pub tx_ref: String,
}

impl From<ExchangeEvent> for ExchangeRecord {
    fn from(event: ExchangeEvent) -> Self {
        let (kind, prefix) = match event.kind {
            ExchangeEventKind::TokensPurchased => (SwapKind::Buy, "buy"),
            ExchangeEventKind::TokensSold => (SwapKind::Sell, "sell"),
        };
        ExchangeRecord {
            id: format!("{}-{}-{}", prefix, event.tx_ref, event.log_index),
            kind,
            token_amount: event.token_amount,
            currency_amount: event.currency_amount,
            block_number: event.block_number,
            tx_ref: event.tx_ref,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Newest first
    pub records: Vec<ExchangeRecord>,
    pub range: BlockRange,
    /// Block to resume from; `None` once the look-back is exhausted
    pub next_cursor: Option<u64>,
}

pub struct ExchangeHistory {
    ledger: Arc<dyn LedgerService>,
    /// Blocks covered by one page
    window: u64,
    /// Oldest block reachable, counted back from the latest one
    max_lookback: u64,
}

impl ExchangeHistory {
    pub fn new(ledger: Arc<dyn LedgerService>, window: u64, max_lookback: u64) -> Self {
        ExchangeHistory {
            ledger,
            window: window.max(1),
            max_lookback,
        }
    }

    /// Fetch one window ending at `cursor` (the latest block if `None`).
    pub async fn page(&self, owner: &AccountId, cursor: Option<u64>) -> Result<HistoryPage, LedgerServiceError> {
        let latest = self.ledger.latest_block().await?;
        let floor = latest.saturating_sub(self.max_lookback);
        let to = cursor.unwrap_or(latest).min(latest);
        let from = to.saturating_sub(self.window - 1).max(floor);
        let range = BlockRange { from, to };

        let kinds = [ExchangeEventKind::TokensPurchased, ExchangeEventKind::TokensSold];
        let mut events = if to < floor {
            Vec::new()
        } else {
            self.ledger.query_history(owner, &kinds, range).await?
        };
        events.sort_by(|a, b| {
            b.block_number
                .cmp(&a.block_number)
                .then(b.log_index.cmp(&a.log_index))
        });

        let next_cursor = if from > floor && from > 0 { Some(from - 1) } else { None };
        tracing::debug!(owner = %owner, from, to, found = events.len(), "history page");
        Ok(HistoryPage {
            records: events.into_iter().map(ExchangeRecord::from).collect(),
            range,
            next_cursor,
        })
    }
}
