//! Per-session context passed explicitly into the client: acting identity,
//! operator capability, snapshot cache, in-flight actions and user profile.

use campus_economics::{AccountId, CourseId, LedgerAction};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::errors::ActionFailure;
use crate::snapshot::{SnapshotCache, Staleness};

pub const DEFAULT_PROFILE_NAME: &str = "New user";

/// Proof that the session actor is the operator.
///
/// Only [`OperatorCapability::resolve`] creates one, once per session; privileged
/// client calls take it by reference instead of comparing identities again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorCapability {
    operator: AccountId,
}

impl OperatorCapability {
    pub fn resolve(actor: &AccountId, operator: &AccountId) -> Option<Self> {
        (actor == operator).then(|| OperatorCapability {
            operator: operator.clone(),
        })
    }

    pub fn operator(&self) -> &AccountId {
        &self.operator
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub account: AccountId,
    pub name: String,
    pub purchased_courses: Vec<CourseId>,
}

impl UserProfile {
    pub fn new(account: AccountId) -> Self {
        UserProfile {
            account,
            name: DEFAULT_PROFILE_NAME.to_string(),
            purchased_courses: Vec::new(),
        }
    }

    pub fn rename(&mut self, name: &str) -> Result<(), ActionFailure> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ActionFailure::validation("name cannot be blank"));
        }
        self.name = name.to_string();
        Ok(())
    }

    /// Returns false if the course was already recorded
    pub fn record_purchase(&mut self, course_id: &CourseId) -> bool {
        if self.purchased_courses.contains(course_id) {
            return false;
        }
        self.purchased_courses.push(course_id.clone());
        true
    }
}

pub struct SessionContext {
    actor: AccountId,
    capability: Option<OperatorCapability>,
    cache: Arc<SnapshotCache>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    profile: RwLock<UserProfile>,
}

impl SessionContext {
    pub fn new(actor: AccountId, operator: &AccountId, staleness: Staleness) -> Self {
        let capability = OperatorCapability::resolve(&actor, operator);
        SessionContext {
            profile: RwLock::new(UserProfile::new(actor.clone())),
            actor,
            capability,
            cache: Arc::new(SnapshotCache::new(staleness)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn actor(&self) -> &AccountId {
        &self.actor
    }

    pub fn operator_capability(&self) -> Option<&OperatorCapability> {
        self.capability.as_ref()
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    pub fn profile(&self) -> UserProfile {
        self.profile.read().clone()
    }

    pub fn rename(&self, name: &str) -> Result<(), ActionFailure> {
        self.profile.write().rename(name)
    }

    pub fn record_purchase(&self, course_id: &CourseId) -> bool {
        self.profile.write().record_purchase(course_id)
    }

    /// Lock `action` for the duration of its lifecycle.
    ///
    /// Fails with `ActionInFlight` if the same action is still unresolved.
    pub fn begin(&self, action: &LedgerAction) -> Result<InFlightGuard, ActionFailure> {
        let key = action.lock_key();
        if !self.in_flight.lock().insert(key.clone()) {
            return Err(ActionFailure::in_flight(action.name()));
        }
        Ok(InFlightGuard {
            key,
            in_flight: self.in_flight.clone(),
        })
    }

    pub fn is_in_flight(&self, action: &LedgerAction) -> bool {
        self.in_flight.lock().contains(&action.lock_key())
    }
}

/// Releases the in-flight lock when dropped
#[derive(Debug)]
pub struct InFlightGuard {
    key: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_economics::{ErrorKind, FixedPointAmount, Scale, TrackId};
    use std::time::Duration;

    fn session(actor: &str) -> SessionContext {
        SessionContext::new(
            AccountId::new(actor),
            &AccountId::new("operator"),
            Staleness {
                account: Duration::from_millis(1000),
                shared: Duration::from_millis(2000),
            },
        )
    }

    #[test]
    fn test_capability_resolved_once() {
        assert!(session("operator").operator_capability().is_some());
        assert!(session("alice").operator_capability().is_none());
        assert!(session("OPERATOR").operator_capability().is_some());
    }

    #[test]
    fn test_in_flight_lock_released_on_drop() {
        let session = session("alice");
        let stake = LedgerAction::Stake {
            track: TrackId::new("usdt"),
            amount: FixedPointAmount::new(1, Scale::STABLE),
        };

        let guard = session.begin(&stake).unwrap();
        let err = session.begin(&stake).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ActionInFlight);

        drop(guard);
        assert!(!session.is_in_flight(&stake));
        assert!(session.begin(&stake).is_ok());
    }

    #[test]
    fn test_profile_defaults_and_rename() {
        let session = session("alice");
        assert_eq!(session.profile().name, DEFAULT_PROFILE_NAME);
        assert!(session.rename("   ").is_err());
        session.rename(" Ada ").unwrap();
        assert_eq!(session.profile().name, "Ada");
    }

    #[test]
    fn test_record_purchase_is_idempotent() {
        let session = session("alice");
        let course = CourseId::new("course_1_x_abc");
        assert!(session.record_purchase(&course));
        assert!(!session.record_purchase(&course));
        assert_eq!(session.profile().purchased_courses, vec![course]);
    }
}
