//! LEDGER ERRORS
//!
//! Every precondition a state transition can violate, plus the
//! machine-readable kind the presentation layer branches on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fixed_point::FixedPointError;
use crate::types::{AccountId, AssetId, TrackId};

/// Machine-readable failure kind carried by every failed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Local, pre-submission: empty/zero amount, missing field, bad literal
    Validation,
    /// Caller lacks the required role, or is a creator buying their own course
    Unauthorized,
    /// Allowance below the required amount; the caller should approve first
    NeedsApproval,
    InsufficientBalance,
    ReserveInsufficient,
    PoolPaused,
    NoRewardsAvailable,
    AlreadyPurchased,
    NotFound,
    /// The same action is already in flight for this session
    ActionInFlight,
    /// Cancelled at the signing boundary
    UserRejected,
    LedgerRejected,
    Timeout,
}

impl ErrorKind {
    /// Whether repeating the same request can ever succeed without a
    /// different identity or input.
    pub fn is_retryable(&self) -> bool {
        match self {
            ErrorKind::Validation
            | ErrorKind::Unauthorized
            | ErrorKind::AlreadyPurchased
            | ErrorKind::NotFound => false,
            ErrorKind::NeedsApproval
            | ErrorKind::InsufficientBalance
            | ErrorKind::ReserveInsufficient
            | ErrorKind::PoolPaused
            | ErrorKind::NoRewardsAvailable
            | ErrorKind::ActionInFlight
            | ErrorKind::UserRejected
            | ErrorKind::LedgerRejected
            | ErrorKind::Timeout => true,
        }
    }

    /// `NeedsApproval` is a routing signal (approve, then act), not a hard failure
    pub fn is_routing_signal(&self) -> bool {
        matches!(self, ErrorKind::NeedsApproval)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Needs approval: {spender} may move {approved} of {asset} but {required} is required")]
    NeedsApproval {
        owner: AccountId,
        spender: AccountId,
        asset: AssetId,
        required: u128,
        approved: u128,
    },
    #[error("Insufficient balance: {account} holds {available} of {asset}, needs {required}")]
    InsufficientBalance {
        account: AccountId,
        asset: AssetId,
        required: u128,
        available: u128,
    },
    #[error("Reserve insufficient: {asset} reserve holds {available}, needs {required}")]
    ReserveInsufficient {
        asset: AssetId,
        required: u128,
        available: u128,
    },
    #[error("Staking pool {0} is paused")]
    PoolPaused(TrackId),
    #[error("No rewards available to claim on track {0}")]
    NoRewardsAvailable(TrackId),
    #[error("Course {course_id} already purchased by {buyer}")]
    AlreadyPurchased { course_id: String, buyer: AccountId },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Amount error: {0}")]
    Amount(#[from] FixedPointError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation(_) | LedgerError::Amount(_) => ErrorKind::Validation,
            LedgerError::Unauthorized(_) => ErrorKind::Unauthorized,
            LedgerError::NeedsApproval { .. } => ErrorKind::NeedsApproval,
            LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            LedgerError::ReserveInsufficient { .. } => ErrorKind::ReserveInsufficient,
            LedgerError::PoolPaused(_) => ErrorKind::PoolPaused,
            LedgerError::NoRewardsAvailable(_) => ErrorKind::NoRewardsAvailable,
            LedgerError::AlreadyPurchased { .. } => ErrorKind::AlreadyPurchased,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
        }
    }
}
