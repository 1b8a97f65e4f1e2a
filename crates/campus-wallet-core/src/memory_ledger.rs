//! Reference ledger service backed by an in-process [`CampusEconomics`].
//!
//! Submissions confirm after `confirmation_delay`; reads observe the newest
//! committed state older than `read_lag`. Faults can be queued to exercise
//! rejection, stalls and transport loss.

use async_trait::async_trait;
use campus_economics::integration::CampusEconomics;
use campus_economics::{
    AccountId, ActionOutcome, AssetId, CourseId, CourseRecord, FixedPointAmount, LedgerAction, LedgerError,
    ReservePool, StakeRecord, StakingPoolStats, TrackId,
};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::errors::{ActionFailure, LedgerServiceError};
use crate::history::{BlockRange, ExchangeEvent, ExchangeEventKind};
use crate::ledger_service::LedgerService;
use crate::lifecycle::{ActionHandle, ActionReporter, ConfirmedAction};

/// Fault applied to the next submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Declined at the signing boundary, before `Confirming`
    UserRejected,
    /// Accepted but never resolved
    Stall,
    /// Transport failure; no handle is returned
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLedgerConfig {
    pub confirmation_delay: Duration,
    pub read_lag: Duration,
}

impl Default for MemoryLedgerConfig {
    fn default() -> Self {
        MemoryLedgerConfig {
            confirmation_delay: Duration::from_millis(500),
            read_lag: Duration::ZERO,
        }
    }
}

struct Committed {
    at: Instant,
    block: u64,
    state: Arc<CampusEconomics>,
}

struct LedgerState {
    live: CampusEconomics,
    block: u64,
    /// Oldest first; never empty
    committed: VecDeque<Committed>,
    events: Vec<ExchangeEvent>,
    faults: VecDeque<Fault>,
    /// Reporters of stalled actions whose handles are still held
    stalled: Vec<ActionReporter>,
}

impl LedgerState {
    fn new(live: CampusEconomics) -> Self {
        let mut state = LedgerState {
            live,
            block: 0,
            committed: VecDeque::new(),
            events: Vec::new(),
            faults: VecDeque::new(),
            stalled: Vec::new(),
        };
        state.reset_reads();
        state
    }

    /// Make the live state visible immediately, dropping older commits
    fn reset_reads(&mut self) {
        self.committed.clear();
        self.committed.push_back(Committed {
            at: Instant::now(),
            block: self.block,
            state: Arc::new(self.live.clone()),
        });
    }

    fn commit(&mut self, lag: Duration) {
        let now = Instant::now();
        self.committed.push_back(Committed {
            at: now,
            block: self.block,
            state: Arc::new(self.live.clone()),
        });
        if let Some(cutoff) = now.checked_sub(lag) {
            while self.committed.len() > 1 && self.committed.get(1).map(|c| c.at <= cutoff).unwrap_or(false) {
                self.committed.pop_front();
            }
        }
    }

    fn visible(&self, lag: Duration) -> Option<&Committed> {
        let newest_old_enough = Instant::now()
            .checked_sub(lag)
            .and_then(|cutoff| self.committed.iter().rev().find(|c| c.at <= cutoff));
        newest_old_enough.or_else(|| self.committed.front())
    }

    fn execute(&mut self, actor: &AccountId, action: &LedgerAction, lag: Duration) -> Result<ConfirmedAction, ActionFailure> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let outcome = self.live.apply(actor, action, now)?;
        if let Err(e) = self.live.verify_invariants() {
            error!(action = action.name(), error = %e, "ledger invariant violated");
        }

        self.block += 1;
        let tx_ref = transaction_ref(self.block, actor, action);
        if let ActionOutcome::Swapped(receipt) = &outcome {
            self.events.push(ExchangeEvent {
                kind: receipt.kind.into(),
                account: receipt.account.clone(),
                token_amount: receipt.token_amount,
                currency_amount: receipt.currency_amount,
                block_number: self.block,
                tx_ref: tx_ref.clone(),
                log_index: 0,
            });
        }
        self.commit(lag);

        Ok(ConfirmedAction {
            tx_ref,
            block: self.block,
            outcome,
        })
    }
}

/// SHA-256 over block height, actor and action
fn transaction_ref(block: u64, actor: &AccountId, action: &LedgerAction) -> String {
    let mut hasher = Sha256::new();
    hasher.update(block.to_le_bytes());
    hasher.update(actor.as_str().as_bytes());
    hasher.update(serde_json::to_vec(action).unwrap_or_default());
    hex::encode(hasher.finalize())
}

#[derive(Clone)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    config: MemoryLedgerConfig,
}

impl InMemoryLedger {
    pub fn new(config: MemoryLedgerConfig) -> Self {
        Self::with_state(CampusEconomics::genesis(), config)
    }

    pub fn with_state(economics: CampusEconomics, config: MemoryLedgerConfig) -> Self {
        InMemoryLedger {
            state: Arc::new(Mutex::new(LedgerState::new(economics))),
            config,
        }
    }

    pub fn config(&self) -> MemoryLedgerConfig {
        self.config
    }

    /// Issue `amount` of `asset` to `account`. Seeding is visible immediately.
    pub fn credit(&self, account: &AccountId, asset: &AssetId, amount: FixedPointAmount) -> Result<(), LedgerError> {
        self.seed(|economics| economics.credit(account, asset, amount))
    }

    /// Apply `action` synchronously, bypassing latency and faults
    pub fn apply_now(&self, actor: &AccountId, action: &LedgerAction) -> Result<ActionOutcome, LedgerError> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.seed(|economics| economics.apply(actor, action, now))
    }

    /// Mutate the live state directly. Seeding is visible immediately.
    pub fn seed<R, F>(&self, mutate: F) -> Result<R, LedgerError>
    where
        F: FnOnce(&mut CampusEconomics) -> Result<R, LedgerError>,
    {
        let mut state = self.state.lock();
        let result = mutate(&mut state.live)?;
        state.reset_reads();
        Ok(result)
    }

    pub fn inject_fault(&self, fault: Fault) {
        debug!(?fault, "fault queued");
        self.state.lock().faults.push_back(fault);
    }

    /// Authoritative state, ignoring read lag
    pub fn snapshot(&self) -> CampusEconomics {
        self.state.lock().live.clone()
    }

    pub fn block_height(&self) -> u64 {
        self.state.lock().block
    }

    pub fn stalled_actions(&self) -> usize {
        let mut state = self.state.lock();
        state.stalled.retain(|reporter| !reporter.is_abandoned());
        state.stalled.len()
    }

    fn view(&self) -> (u64, Arc<CampusEconomics>) {
        let state = self.state.lock();
        match state.visible(self.config.read_lag) {
            Some(committed) => (committed.block, committed.state.clone()),
            None => (state.block, Arc::new(state.live.clone())),
        }
    }
}

fn not_found(err: LedgerError) -> LedgerServiceError {
    LedgerServiceError::Rejected(err.to_string())
}

#[async_trait]
impl LedgerService for InMemoryLedger {
    async fn read_balance(&self, owner: &AccountId, asset: &AssetId) -> Result<u128, LedgerServiceError> {
        Ok(self.view().1.balance(owner, asset))
    }

    async fn read_allowance(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        asset: &AssetId,
    ) -> Result<u128, LedgerServiceError> {
        Ok(self.view().1.allowance(owner, spender, asset))
    }

    async fn read_reserves(&self) -> Result<ReservePool, LedgerServiceError> {
        Ok(self.view().1.reserves())
    }

    async fn read_stake_record(&self, owner: &AccountId, track: &TrackId) -> Result<StakeRecord, LedgerServiceError> {
        let (_, view) = self.view();
        let pool = view.pool(track).map_err(not_found)?;
        Ok(pool.record(owner))
    }

    async fn read_pool_stats(&self, track: &TrackId) -> Result<StakingPoolStats, LedgerServiceError> {
        let (_, view) = self.view();
        let pool = view.pool(track).map_err(not_found)?;
        Ok(pool.stats())
    }

    async fn read_paused(&self, track: &TrackId) -> Result<bool, LedgerServiceError> {
        let (_, view) = self.view();
        let pool = view.pool(track).map_err(not_found)?;
        Ok(pool.is_paused())
    }

    async fn read_course(&self, course_id: &CourseId) -> Result<Option<CourseRecord>, LedgerServiceError> {
        Ok(self.view().1.catalog.course(course_id).cloned())
    }

    async fn read_course_ids(&self) -> Result<Vec<CourseId>, LedgerServiceError> {
        Ok(self.view().1.catalog.all_course_ids())
    }

    async fn read_purchased_courses(&self, user: &AccountId) -> Result<Vec<CourseId>, LedgerServiceError> {
        Ok(self.view().1.catalog.purchased_courses(user))
    }

    async fn latest_block(&self) -> Result<u64, LedgerServiceError> {
        Ok(self.view().0)
    }

    async fn submit(&self, actor: &AccountId, action: LedgerAction) -> Result<ActionHandle, LedgerServiceError> {
        let fault = self.state.lock().faults.pop_front();
        if fault == Some(Fault::Unavailable) {
            warn!(actor = %actor, action = action.name(), "ledger unavailable");
            return Err(LedgerServiceError::Unavailable("ledger connection lost".to_string()));
        }

        let (reporter, handle) = ActionHandle::channel(action.name());
        if fault == Some(Fault::UserRejected) {
            reporter.fail(ActionFailure::user_rejected());
            return Ok(handle);
        }

        reporter.confirming();
        if fault == Some(Fault::Stall) {
            let mut state = self.state.lock();
            state.stalled.retain(|reporter| !reporter.is_abandoned());
            state.stalled.push(reporter);
            return Ok(handle);
        }

        let state = self.state.clone();
        let actor = actor.clone();
        let MemoryLedgerConfig { confirmation_delay, read_lag } = self.config;
        tokio::spawn(async move {
            tokio::time::sleep(confirmation_delay).await;
            let result = state.lock().execute(&actor, &action, read_lag);
            match result {
                Ok(confirmed) => {
                    info!(actor = %actor, action = action.name(), block = confirmed.block, "action confirmed");
                    reporter.confirm(confirmed);
                }
                Err(failure) => {
                    debug!(actor = %actor, action = action.name(), kind = ?failure.kind, "action failed on ledger");
                    reporter.fail(failure);
                }
            }
        });
        Ok(handle)
    }

    async fn query_history(
        &self,
        owner: &AccountId,
        kinds: &[ExchangeEventKind],
        range: BlockRange,
    ) -> Result<Vec<ExchangeEvent>, LedgerServiceError> {
        let (visible_block, _) = self.view();
        let state = self.state.lock();
        Ok(state
            .events
            .iter()
            .filter(|event| {
                &event.account == owner
                    && kinds.contains(&event.kind)
                    && range.contains(event.block_number)
                    && event.block_number <= visible_block
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ActionStatus;
    use campus_economics::{ErrorKind, Scale};

    fn eth(units: u128) -> FixedPointAmount {
        FixedPointAmount::from_units(units, Scale::STANDARD).unwrap()
    }

    fn yd(units: u128) -> FixedPointAmount {
        FixedPointAmount::from_units(units, Scale::STANDARD).unwrap()
    }

    fn alice() -> AccountId {
        AccountId::new("alice")
    }

    fn ledger(read_lag: Duration) -> InMemoryLedger {
        let ledger = InMemoryLedger::new(MemoryLedgerConfig {
            confirmation_delay: Duration::from_millis(500),
            read_lag,
        });
        let operator = AccountId::new("operator");
        ledger.credit(&operator, &AssetId::new("eth"), eth(10)).unwrap();
        ledger.credit(&alice(), &AssetId::new("eth"), eth(5)).unwrap();
        ledger
            .apply_now(&operator, &LedgerAction::MintTokenReserve { amount: yd(1_000_000) })
            .unwrap();
        ledger
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_submission_confirms_after_delay() {
        let ledger = ledger(Duration::ZERO);
        let mut handle = ledger
            .submit(&alice(), LedgerAction::Buy { currency_amount: eth(1) })
            .await
            .unwrap();
        assert_eq!(handle.status(), ActionStatus::Confirming);

        let confirmed = handle.wait_terminal(Duration::from_secs(5)).await.unwrap();
        assert_eq!(confirmed.block, 1);
        assert_eq!(confirmed.tx_ref.len(), 64);
        assert_eq!(ledger.read_balance(&alice(), &AssetId::new("yd")).await.unwrap(), yd(4000).raw());
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_reads_lag_behind_writes() {
        let ledger = ledger(Duration::from_millis(1000));
        let mut handle = ledger
            .submit(&alice(), LedgerAction::Buy { currency_amount: eth(1) })
            .await
            .unwrap();
        handle.wait_terminal(Duration::from_secs(5)).await.unwrap();

        assert_eq!(ledger.read_balance(&alice(), &AssetId::new("yd")).await.unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(ledger.read_balance(&alice(), &AssetId::new("yd")).await.unwrap(), yd(4000).raw());
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_ledger_rejection_keeps_kind() {
        let ledger = ledger(Duration::ZERO);
        let mut handle = ledger
            .submit(&alice(), LedgerAction::Buy { currency_amount: eth(50) })
            .await
            .unwrap();
        let err = handle.wait_terminal(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientBalance);
        assert_eq!(ledger.block_height(), 0);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_injected_faults() {
        let ledger = ledger(Duration::ZERO);
        let buy = LedgerAction::Buy { currency_amount: eth(1) };

        ledger.inject_fault(Fault::UserRejected);
        let handle = ledger.submit(&alice(), buy.clone()).await.unwrap();
        assert!(matches!(handle.status(), ActionStatus::Failed(f) if f.kind == ErrorKind::UserRejected));

        ledger.inject_fault(Fault::Unavailable);
        assert!(matches!(
            ledger.submit(&alice(), buy.clone()).await,
            Err(LedgerServiceError::Unavailable(_))
        ));

        ledger.inject_fault(Fault::Stall);
        let mut handle = ledger.submit(&alice(), buy).await.unwrap();
        let err = handle.wait_terminal(Duration::from_secs(30)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(ledger.stalled_actions(), 1);
        assert_eq!(ledger.block_height(), 0);

        drop(handle);
        assert_eq!(ledger.stalled_actions(), 0);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_abandoned_stalls_are_released() {
        let ledger = ledger(Duration::ZERO);
        let buy = LedgerAction::Buy { currency_amount: eth(1) };

        for _ in 0..5 {
            ledger.inject_fault(Fault::Stall);
            let mut handle = ledger.submit(&alice(), buy.clone()).await.unwrap();
            assert!(handle.wait_terminal(Duration::from_secs(1)).await.is_err());
        }
        assert_eq!(ledger.stalled_actions(), 0);

        ledger.inject_fault(Fault::Stall);
        let _held = ledger.submit(&alice(), buy).await.unwrap();
        assert_eq!(ledger.stalled_actions(), 1);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_history_records_swaps() {
        let ledger = ledger(Duration::ZERO);
        let mut handle = ledger
            .submit(&alice(), LedgerAction::Buy { currency_amount: eth(1) })
            .await
            .unwrap();
        let confirmed = handle.wait_terminal(Duration::from_secs(5)).await.unwrap();

        let events = ledger
            .query_history(&alice(), &[ExchangeEventKind::TokensPurchased], BlockRange { from: 0, to: 10 })
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tx_ref, confirmed.tx_ref);
        assert_eq!(events[0].currency_amount, eth(1).raw());

        let sells = ledger
            .query_history(&alice(), &[ExchangeEventKind::TokensSold], BlockRange { from: 0, to: 10 })
            .await
            .unwrap();
        assert!(sells.is_empty());
    }
}
