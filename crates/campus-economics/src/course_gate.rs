//! COURSE CATALOG & PURCHASE GATE
//!
//! Creators publish priced courses; buyers unlock them with a one-time token
//! transfer that reuses the allowance pattern with the gate as spender.
//! Purchase records are append-only and never hold duplicates.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::allowance::AllowanceLedger;
use crate::balances::BalanceBook;
use crate::errors::LedgerError;
use crate::fixed_point::FixedPointAmount;
use crate::types::{AccountId, AssetSpec};

/// Characters of the creator identity embedded in a course id
const CREATOR_SUFFIX_LEN: usize = 6;
const RANDOM_COMPONENT_LEN: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CourseId(String);

impl CourseId {
    pub fn new(id: impl AsRef<str>) -> Self {
        CourseId(id.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CourseId {
    fn from(id: &str) -> Self {
        CourseId::new(id)
    }
}

/// Build a fresh course id: `course_<millis>_<random9>_<creator suffix>`.
///
/// Content fields never take part, so duplicate titles are fine.
pub fn generate_course_id<R: Rng + ?Sized>(creator: &AccountId, now_millis: u64, rng: &mut R) -> CourseId {
    let random: String = rng
        .sample_iter(&Alphanumeric)
        .take(RANDOM_COMPONENT_LEN)
        .map(char::from)
        .collect();
    CourseId::new(format!(
        "course_{}_{}_{}",
        now_millis,
        random,
        creator.suffix(CREATOR_SUFFIX_LEN)
    ))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub id: CourseId,
    pub title: String,
    pub description: String,
    /// Raw token units
    pub price: u128,
    pub creator: AccountId,
    pub is_active: bool,
    /// Unix seconds
    pub created_at: u64,
}

/// Where purchase payments land
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentDestination {
    #[default]
    Creator,
    Treasury(AccountId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseCatalog {
    /// Spender identity buyers approve before purchasing
    pub gate_id: AccountId,
    pub operator: AccountId,
    pub token: AssetSpec,
    pub destination: PaymentDestination,
    courses: BTreeMap<CourseId, CourseRecord>,
    /// Insertion order of course ids
    order: Vec<CourseId>,
    purchases: BTreeMap<AccountId, Vec<CourseId>>,
}

impl CourseCatalog {
    pub fn new(gate_id: AccountId, operator: AccountId, token: AssetSpec, destination: PaymentDestination) -> Self {
        CourseCatalog {
            gate_id,
            operator,
            token,
            destination,
            courses: BTreeMap::new(),
            order: Vec::new(),
            purchases: BTreeMap::new(),
        }
    }

    pub fn create_course(
        &mut self,
        creator: &AccountId,
        course_id: CourseId,
        title: &str,
        description: &str,
        price: FixedPointAmount,
        now: u64,
    ) -> Result<CourseRecord, LedgerError> {
        let title = title.trim();
        let description = description.trim();
        if title.is_empty() {
            return Err(LedgerError::Validation("course title is required".to_string()));
        }
        if description.is_empty() {
            return Err(LedgerError::Validation("course description is required".to_string()));
        }
        let price = price.expect_scale(self.token.scale)?.raw();
        if price == 0 {
            return Err(LedgerError::Validation("course price must be positive".to_string()));
        }
        if course_id.as_str().is_empty() {
            return Err(LedgerError::Validation("course id is required".to_string()));
        }
        if self.courses.contains_key(&course_id) {
            return Err(LedgerError::Validation(format!("course id {} already exists", course_id)));
        }

        let record = CourseRecord {
            id: course_id.clone(),
            title: title.to_string(),
            description: description.to_string(),
            price,
            creator: creator.clone(),
            is_active: true,
            created_at: now,
        };
        self.courses.insert(course_id.clone(), record.clone());
        self.order.push(course_id);
        log::debug!("course {} created by {}", record.id, creator);
        Ok(record)
    }

    /// Toggle availability. Allowed for the creator or the operator.
    pub fn set_course_active(
        &mut self,
        caller: &AccountId,
        course_id: &CourseId,
        active: bool,
    ) -> Result<(), LedgerError> {
        let operator = self.operator.clone();
        let course = self
            .courses
            .get_mut(course_id)
            .ok_or_else(|| LedgerError::NotFound(format!("course {}", course_id)))?;
        if caller != &course.creator && caller != &operator {
            return Err(LedgerError::Unauthorized(format!(
                "{} cannot change course {}",
                caller, course_id
            )));
        }
        course.is_active = active;
        Ok(())
    }

    /// Unlock `course_id` for `buyer` by paying its price.
    ///
    /// Checks run in order: exists, not the creator, active, not owned yet,
    /// allowance, balance.
    pub fn purchase(
        &mut self,
        book: &mut BalanceBook,
        allowances: &mut AllowanceLedger,
        buyer: &AccountId,
        course_id: &CourseId,
    ) -> Result<CourseRecord, LedgerError> {
        let course = self
            .courses
            .get(course_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("course {}", course_id)))?;
        if buyer == &course.creator {
            return Err(LedgerError::Unauthorized(format!(
                "creator {} cannot purchase their own course",
                buyer
            )));
        }
        if !course.is_active {
            return Err(LedgerError::Validation(format!("course {} is not active", course_id)));
        }
        if self.has_purchased(buyer, course_id) {
            return Err(LedgerError::AlreadyPurchased {
                course_id: course_id.to_string(),
                buyer: buyer.clone(),
            });
        }
        allowances.require(buyer, &self.gate_id, &self.token.id, course.price)?;
        book.require(buyer, &self.token.id, course.price)?;

        let payee = match &self.destination {
            PaymentDestination::Creator => course.creator.clone(),
            PaymentDestination::Treasury(treasury) => treasury.clone(),
        };
        book.transfer(buyer, &payee, &self.token.id, course.price)?;
        allowances.spend(buyer, &self.gate_id, &self.token.id, course.price)?;
        self.purchases
            .entry(buyer.clone())
            .or_default()
            .push(course_id.clone());

        log::debug!("{} purchased {} for {}", buyer, course_id, course.price);
        Ok(course)
    }

    pub fn all_course_ids(&self) -> Vec<CourseId> {
        self.order.clone()
    }

    pub fn course(&self, course_id: &CourseId) -> Option<&CourseRecord> {
        self.courses.get(course_id)
    }

    pub fn courses_by_creator(&self, creator: &AccountId) -> Vec<CourseRecord> {
        self.order
            .iter()
            .filter_map(|id| self.courses.get(id))
            .filter(|course| &course.creator == creator)
            .cloned()
            .collect()
    }

    pub fn purchased_courses(&self, user: &AccountId) -> Vec<CourseId> {
        self.purchases.get(user).cloned().unwrap_or_default()
    }

    pub fn has_purchased(&self, user: &AccountId, course_id: &CourseId) -> bool {
        self.purchases
            .get(user)
            .map(|owned| owned.contains(course_id))
            .unwrap_or(false)
    }
}
