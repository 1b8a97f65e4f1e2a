//! Read-through cache of ledger state with per-entry staleness windows.
//!
//! Cached values are never authoritative: mutating paths re-read from the
//! ledger, and confirmed actions schedule a delayed refresh of what they touched.

use campus_economics::{AccountId, AssetId, CourseId, ReservePool, StakeRecord, StakingPoolStats, TrackId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::errors::LedgerServiceError;
use crate::ledger_service::LedgerService;

/// One piece of ledger state the client may cache
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKey {
    Balance { owner: AccountId, asset: AssetId },
    Allowance { owner: AccountId, spender: AccountId, asset: AssetId },
    Reserves,
    StakeRecord { owner: AccountId, track: TrackId },
    PoolStats(TrackId),
    Paused(TrackId),
    Purchases(AccountId),
    CourseIds,
}

impl StateKey {
    /// Balances and allowances change per user action and go stale faster
    pub fn is_account_level(&self) -> bool {
        matches!(self, StateKey::Balance { .. } | StateKey::Allowance { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Snapshot {
    Amount(u128),
    Reserves(ReservePool),
    Stake(StakeRecord),
    Stats(StakingPoolStats),
    Flag(bool),
    Courses(Vec<CourseId>),
}

impl Snapshot {
    pub fn amount(&self) -> Option<u128> {
        match self {
            Snapshot::Amount(amount) => Some(*amount),
            _ => None,
        }
    }

    pub fn reserves(&self) -> Option<ReservePool> {
        match self {
            Snapshot::Reserves(pool) => Some(*pool),
            _ => None,
        }
    }

    pub fn stake(&self) -> Option<StakeRecord> {
        match self {
            Snapshot::Stake(record) => Some(*record),
            _ => None,
        }
    }

    pub fn stats(&self) -> Option<StakingPoolStats> {
        match self {
            Snapshot::Stats(stats) => Some(*stats),
            _ => None,
        }
    }

    pub fn flag(&self) -> Option<bool> {
        match self {
            Snapshot::Flag(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn courses(&self) -> Option<Vec<CourseId>> {
        match self {
            Snapshot::Courses(courses) => Some(courses.clone()),
            _ => None,
        }
    }
}

/// Staleness windows, by key class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Staleness {
    pub account: Duration,
    pub shared: Duration,
}

impl Staleness {
    pub fn for_key(&self, key: &StateKey) -> Duration {
        if key.is_account_level() {
            self.account
        } else {
            self.shared
        }
    }
}

#[derive(Debug, Clone)]
struct Cached {
    value: Snapshot,
    fetched_at: Instant,
}

pub struct SnapshotCache {
    entries: DashMap<StateKey, Cached>,
    staleness: Staleness,
}

impl SnapshotCache {
    pub fn new(staleness: Staleness) -> Self {
        SnapshotCache {
            entries: DashMap::new(),
            staleness,
        }
    }

    /// Cached value if it is still inside its staleness window
    pub fn fresh(&self, key: &StateKey) -> Option<Snapshot> {
        let window = self.staleness.for_key(key);
        self.entries
            .get(key)
            .filter(|cached| cached.fetched_at.elapsed() < window)
            .map(|cached| cached.value.clone())
    }

    /// Cached value regardless of age
    pub fn peek(&self, key: &StateKey) -> Option<Snapshot> {
        self.entries.get(key).map(|cached| cached.value.clone())
    }

    pub fn store(&self, key: StateKey, value: Snapshot) {
        self.entries.insert(
            key,
            Cached {
                value,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &StateKey) {
        self.entries.remove(key);
    }

    /// Serve from cache inside the staleness window, otherwise fetch and store
    pub async fn read(&self, ledger: &dyn LedgerService, key: &StateKey) -> Result<Snapshot, LedgerServiceError> {
        if let Some(value) = self.fresh(key) {
            return Ok(value);
        }
        self.refetch(ledger, key).await
    }

    /// Fetch from the ledger unconditionally and store the result
    pub async fn refetch(&self, ledger: &dyn LedgerService, key: &StateKey) -> Result<Snapshot, LedgerServiceError> {
        let value = fetch(ledger, key).await?;
        self.store(key.clone(), value.clone());
        Ok(value)
    }
}

pub async fn fetch(ledger: &dyn LedgerService, key: &StateKey) -> Result<Snapshot, LedgerServiceError> {
    Ok(match key {
        StateKey::Balance { owner, asset } => Snapshot::Amount(ledger.read_balance(owner, asset).await?),
        StateKey::Allowance { owner, spender, asset } => {
            Snapshot::Amount(ledger.read_allowance(owner, spender, asset).await?)
        }
        StateKey::Reserves => Snapshot::Reserves(ledger.read_reserves().await?),
        StateKey::StakeRecord { owner, track } => Snapshot::Stake(ledger.read_stake_record(owner, track).await?),
        StateKey::PoolStats(track) => Snapshot::Stats(ledger.read_pool_stats(track).await?),
        StateKey::Paused(track) => Snapshot::Flag(ledger.read_paused(track).await?),
        StateKey::Purchases(user) => Snapshot::Courses(ledger.read_purchased_courses(user).await?),
        StateKey::CourseIds => Snapshot::Courses(ledger.read_course_ids().await?),
    })
}
