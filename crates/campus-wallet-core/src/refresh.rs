//! Delayed re-reads after a confirmed action.
//!
//! The ledger's read path may trail its write path, so dependent state is
//! refreshed after a grace period rather than immediately.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::ledger_service::LedgerService;
use crate::snapshot::{SnapshotCache, StateKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshGrace {
    pub allowance: Duration,
    pub state: Duration,
}

impl RefreshGrace {
    pub fn for_key(&self, key: &StateKey) -> Duration {
        match key {
            StateKey::Allowance { .. } => self.allowance,
            _ => self.state,
        }
    }
}

impl Default for RefreshGrace {
    fn default() -> Self {
        RefreshGrace {
            allowance: Duration::from_millis(1500),
            state: Duration::from_millis(2000),
        }
    }
}

pub struct RefreshScheduler {
    ledger: Arc<dyn LedgerService>,
    cache: Arc<SnapshotCache>,
    grace: RefreshGrace,
    pending: Arc<AtomicUsize>,
}

impl RefreshScheduler {
    pub fn new(ledger: Arc<dyn LedgerService>, cache: Arc<SnapshotCache>, grace: RefreshGrace) -> Self {
        RefreshScheduler {
            ledger,
            cache,
            grace,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn grace(&self) -> RefreshGrace {
        self.grace
    }

    /// Refresh batches not yet run
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Re-read `keys` once their grace period has passed. One task per distinct delay.
    pub fn schedule(&self, keys: Vec<StateKey>) -> Vec<JoinHandle<()>> {
        let mut batches: BTreeMap<Duration, Vec<StateKey>> = BTreeMap::new();
        for key in keys {
            batches.entry(self.grace.for_key(&key)).or_default().push(key);
        }

        batches
            .into_iter()
            .map(|(delay, keys)| {
                let ledger = self.ledger.clone();
                let cache = self.cache.clone();
                let pending = self.pending.clone();
                pending.fetch_add(1, Ordering::SeqCst);
                debug!(delay_ms = delay.as_millis() as u64, keys = keys.len(), "refresh scheduled");

                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    for key in keys {
                        if let Err(e) = cache.refetch(ledger.as_ref(), &key).await {
                            warn!(?key, error = %e, "refresh failed, dropping cached value");
                            cache.invalidate(&key);
                        }
                    }
                    pending.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect()
    }
}
