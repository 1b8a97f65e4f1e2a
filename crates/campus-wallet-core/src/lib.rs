//! Async client core for the campus token economy.
//!
//! Talks to an external ledger through [`LedgerService`], caches what it reads,
//! and drives every mutation through the submitted, confirming, terminal lifecycle.

pub mod errors;
pub mod lifecycle;
pub mod history;
pub mod ledger_service;
pub mod memory_ledger;
pub mod snapshot;
pub mod session;
pub mod refresh;
pub mod config;
pub mod client;

pub use errors::{ActionFailure, ConfigError, LedgerServiceError};

pub use lifecycle::{ActionHandle, ActionReporter, ActionStatus, ConfirmedAction};

pub use history::{BlockRange, ExchangeEvent, ExchangeEventKind, ExchangeHistory, ExchangeRecord, HistoryPage};

pub use ledger_service::LedgerService;

pub use memory_ledger::{Fault, InMemoryLedger, MemoryLedgerConfig};

pub use snapshot::{Snapshot, SnapshotCache, Staleness, StateKey};

pub use session::{InFlightGuard, OperatorCapability, SessionContext, UserProfile, DEFAULT_PROFILE_NAME};

pub use refresh::{RefreshGrace, RefreshScheduler};

pub use config::ClientConfig;

pub use client::{ApprovalStatus, CampusClient};
