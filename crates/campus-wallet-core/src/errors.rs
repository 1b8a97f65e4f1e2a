use campus_economics::{ErrorKind, FixedPointError, LedgerError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Ledger service transport errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerServiceError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
    #[error("Ledger did not respond in time")]
    Timeout,
    #[error("Ledger rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config source error: {0}")]
    Source(#[from] config::ConfigError),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Terminal `Failed` payload: machine-readable kind plus human-readable reason
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind:?}: {reason}")]
pub struct ActionFailure {
    pub kind: ErrorKind,
    pub reason: String,
}

impl ActionFailure {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        ActionFailure {
            kind,
            reason: reason.into(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, reason)
    }

    pub fn in_flight(action: &str) -> Self {
        Self::new(ErrorKind::ActionInFlight, format!("{} is already in flight", action))
    }

    pub fn user_rejected() -> Self {
        Self::new(ErrorKind::UserRejected, "request declined at the signing boundary")
    }

    pub fn timeout(action: &str) -> Self {
        Self::new(ErrorKind::Timeout, format!("{} was not confirmed in time", action))
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<LedgerError> for ActionFailure {
    fn from(err: LedgerError) -> Self {
        ActionFailure::new(err.kind(), err.to_string())
    }
}

impl From<FixedPointError> for ActionFailure {
    fn from(err: FixedPointError) -> Self {
        ActionFailure::validation(err.to_string())
    }
}

impl From<LedgerServiceError> for ActionFailure {
    fn from(err: LedgerServiceError) -> Self {
        let kind = match err {
            LedgerServiceError::Timeout => ErrorKind::Timeout,
            LedgerServiceError::Unavailable(_) | LedgerServiceError::Rejected(_) => ErrorKind::LedgerRejected,
        };
        ActionFailure::new(kind, err.to_string())
    }
}
