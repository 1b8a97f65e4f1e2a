//! Typed state-changing requests and their confirmed results.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::course_gate::{CourseId, CourseRecord};
use crate::fixed_point::FixedPointAmount;
use crate::reserve_exchange::{ReservePool, SwapReceipt};
use crate::staking::StakeRecord;
use crate::types::{AccountId, AssetId, TrackId};

/// Every mutating request a session can submit to the ledger.
///
/// The acting identity is carried next to the action, never inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerAction {
    Approve {
        spender: AccountId,
        asset: AssetId,
        amount: FixedPointAmount,
    },
    Buy {
        currency_amount: FixedPointAmount,
    },
    Sell {
        token_amount: FixedPointAmount,
    },
    Stake {
        track: TrackId,
        amount: FixedPointAmount,
    },
    Withdraw {
        track: TrackId,
        amount: FixedPointAmount,
    },
    ClaimRewards {
        track: TrackId,
    },
    Purchase {
        course_id: CourseId,
    },
    CreateCourse {
        course_id: CourseId,
        title: String,
        description: String,
        price: FixedPointAmount,
    },
    MintTokenReserve {
        amount: FixedPointAmount,
    },
    AddCurrencyReserve {
        amount: FixedPointAmount,
    },
    SetPaused {
        track: TrackId,
        paused: bool,
    },
    SetCourseActive {
        course_id: CourseId,
        active: bool,
    },
    /// Yield reported by the external yield source
    AccrueYield {
        track: TrackId,
        amount: FixedPointAmount,
    },
    SetApy {
        track: TrackId,
        apy_bps: u32,
    },
}

impl LedgerAction {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerAction::Approve { .. } => "approve",
            LedgerAction::Buy { .. } => "buy",
            LedgerAction::Sell { .. } => "sell",
            LedgerAction::Stake { .. } => "stake",
            LedgerAction::Withdraw { .. } => "withdraw",
            LedgerAction::ClaimRewards { .. } => "claim_rewards",
            LedgerAction::Purchase { .. } => "purchase",
            LedgerAction::CreateCourse { .. } => "create_course",
            LedgerAction::MintTokenReserve { .. } => "mint_token_reserve",
            LedgerAction::AddCurrencyReserve { .. } => "add_currency_reserve",
            LedgerAction::SetPaused { .. } => "set_paused",
            LedgerAction::SetCourseActive { .. } => "set_course_active",
            LedgerAction::AccrueYield { .. } => "accrue_yield",
            LedgerAction::SetApy { .. } => "set_apy",
        }
    }

    /// Actions only the operator may perform
    pub fn is_privileged(&self) -> bool {
        matches!(
            self,
            LedgerAction::MintTokenReserve { .. }
                | LedgerAction::AddCurrencyReserve { .. }
                | LedgerAction::SetPaused { .. }
                | LedgerAction::AccrueYield { .. }
                | LedgerAction::SetApy { .. }
        )
    }

    /// Key identifying "the same action" for the in-flight lock.
    ///
    /// Two submissions with equal keys must not be in flight together.
    pub fn lock_key(&self) -> String {
        match self {
            LedgerAction::Approve { spender, asset, .. } => format!("approve:{}:{}", spender, asset),
            LedgerAction::Stake { track, .. } => format!("stake:{}", track),
            LedgerAction::Withdraw { track, .. } => format!("withdraw:{}", track),
            LedgerAction::ClaimRewards { track } => format!("claim_rewards:{}", track),
            LedgerAction::Purchase { course_id } => format!("purchase:{}", course_id),
            LedgerAction::SetPaused { track, .. } => format!("set_paused:{}", track),
            LedgerAction::SetCourseActive { course_id, .. } => format!("set_course_active:{}", course_id),
            LedgerAction::AccrueYield { track, .. } => format!("accrue_yield:{}", track),
            LedgerAction::SetApy { track, .. } => format!("set_apy:{}", track),
            other => other.name().to_string(),
        }
    }
}

impl fmt::Display for LedgerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerAction::Approve { spender, asset, amount } => {
                write!(f, "approve {} {} for {}", amount, asset, spender)
            }
            LedgerAction::Buy { currency_amount } => write!(f, "buy with {}", currency_amount),
            LedgerAction::Sell { token_amount } => write!(f, "sell {}", token_amount),
            LedgerAction::Stake { track, amount } => write!(f, "stake {} on {}", amount, track),
            LedgerAction::Withdraw { track, amount } => write!(f, "withdraw {} from {}", amount, track),
            LedgerAction::Purchase { course_id } => write!(f, "purchase {}", course_id),
            other => f.write_str(other.name()),
        }
    }
}

/// What a confirmed action changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    Approved {
        owner: AccountId,
        spender: AccountId,
        asset: AssetId,
        amount: u128,
    },
    Swapped(SwapReceipt),
    Staked {
        track: TrackId,
        record: StakeRecord,
    },
    Withdrawn {
        track: TrackId,
        amount: u128,
        record: StakeRecord,
    },
    RewardsClaimed {
        track: TrackId,
        amount: u128,
    },
    Purchased {
        buyer: AccountId,
        course_id: CourseId,
        price: u128,
    },
    CourseCreated(CourseRecord),
    ReservesUpdated(ReservePool),
    PauseChanged {
        track: TrackId,
        paused: bool,
    },
    CourseActivationChanged {
        course_id: CourseId,
        active: bool,
    },
    YieldAccrued {
        track: TrackId,
        distributed: u128,
    },
    ApyUpdated {
        track: TrackId,
        apy_bps: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_point::Scale;

    #[test]
    fn test_lock_keys_separate_targets() {
        let usdt = LedgerAction::Stake {
            track: TrackId::new("usdt"),
            amount: FixedPointAmount::new(1, Scale::STABLE),
        };
        let usdt_again = LedgerAction::Stake {
            track: TrackId::new("usdt"),
            amount: FixedPointAmount::new(5, Scale::STABLE),
        };
        let link = LedgerAction::Stake {
            track: TrackId::new("link"),
            amount: FixedPointAmount::new(1, Scale::STANDARD),
        };
        assert_eq!(usdt.lock_key(), usdt_again.lock_key());
        assert_ne!(usdt.lock_key(), link.lock_key());
    }

    #[test]
    fn test_privileged_actions() {
        let mint = LedgerAction::MintTokenReserve {
            amount: FixedPointAmount::new(1, Scale::STANDARD),
        };
        let buy = LedgerAction::Buy {
            currency_amount: FixedPointAmount::new(1, Scale::STANDARD),
        };
        assert!(mint.is_privileged());
        assert!(!buy.is_privileged());
    }
}
