//! Action lifecycle: `Submitted -> Confirming -> Confirmed | Failed`.
//!
//! The ledger side keeps an [`ActionReporter`] and publishes transitions; the
//! caller polls or awaits the matching [`ActionHandle`].

use campus_economics::{ActionOutcome, ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use crate::errors::ActionFailure;

/// Final record of a confirmed action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedAction {
    /// Unique transaction reference (hex)
    pub tx_ref: String,
    pub block: u64,
    pub outcome: ActionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    Submitted,
    /// Accepted by the ledger, not yet final
    Confirming,
    Confirmed(ConfirmedAction),
    Failed(ActionFailure),
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionStatus::Confirmed(_) | ActionStatus::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionStatus::Submitted => "submitted",
            ActionStatus::Confirming => "confirming",
            ActionStatus::Confirmed(_) => "confirmed",
            ActionStatus::Failed(_) => "failed",
        }
    }
}

/// Caller side of a submitted action
#[derive(Debug, Clone)]
pub struct ActionHandle {
    pub id: Uuid,
    pub action: String,
    status: watch::Receiver<ActionStatus>,
}

/// Ledger side of a submitted action
#[derive(Debug)]
pub struct ActionReporter {
    pub id: Uuid,
    status: watch::Sender<ActionStatus>,
}

impl ActionHandle {
    /// New `Submitted` action and the reporter that drives it
    pub fn channel(action: &str) -> (ActionReporter, ActionHandle) {
        let id = Uuid::new_v4();
        let (tx, rx) = watch::channel(ActionStatus::Submitted);
        (
            ActionReporter { id, status: tx },
            ActionHandle {
                id,
                action: action.to_string(),
                status: rx,
            },
        )
    }

    /// Handle that is already terminal
    pub fn resolved(action: &str, status: ActionStatus) -> ActionHandle {
        let (reporter, handle) = Self::channel(action);
        reporter.publish(status);
        handle
    }

    /// Latest published status
    pub fn status(&self) -> ActionStatus {
        self.status.borrow().clone()
    }

    /// Wait until the action is terminal or `limit` elapses.
    ///
    /// A ledger that stops reporting without a terminal status counts as
    /// `LedgerRejected`; running out of time counts as `Timeout`.
    pub async fn wait_terminal(&mut self, limit: Duration) -> Result<ConfirmedAction, ActionFailure> {
        let status = match tokio::time::timeout(limit, self.status.wait_for(ActionStatus::is_terminal)).await {
            Err(_) => return Err(ActionFailure::timeout(&self.action)),
            Ok(Err(_)) => {
                return Err(ActionFailure::new(
                    ErrorKind::LedgerRejected,
                    format!("ledger stopped reporting {}", self.action),
                ))
            }
            Ok(Ok(status)) => status.clone(),
        };
        match status {
            ActionStatus::Confirmed(confirmed) => Ok(confirmed),
            ActionStatus::Failed(failure) => Err(failure),
            other => Err(ActionFailure::new(
                ErrorKind::LedgerRejected,
                format!("{} ended in {}", self.action, other.label()),
            )),
        }
    }
}

impl ActionReporter {
    pub fn confirming(&self) {
        self.publish(ActionStatus::Confirming);
    }

    pub fn confirm(&self, confirmed: ConfirmedAction) {
        self.publish(ActionStatus::Confirmed(confirmed));
    }

    pub fn fail(&self, failure: ActionFailure) {
        self.publish(ActionStatus::Failed(failure));
    }

    /// True once every handle for this action has been dropped
    pub fn is_abandoned(&self) -> bool {
        self.status.is_closed()
    }

    fn publish(&self, status: ActionStatus) {
        // Terminal states are final
        self.status.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            *current = status;
            true
        });
    }
}
