//! STAKING / YIELD ACCOUNTING
//!
//! One generic pool, instantiated once per staking track. Each instance
//! carries its own asset and decimal scale; amounts at any other scale are
//! rejected, so the two tracks can never be mixed.
//!
//! Deposits are custodied by the pool account and mirrored 1:1 into a
//! yield-bearing receipt balance. Yield from the external source raises
//! receipt balances only, so `receipt - staked` is what a user may claim.
//!
//! When the pool is paused every mutating operation fails with `PoolPaused`
//! before any other check runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::allowance::AllowanceLedger;
use crate::balances::BalanceBook;
use crate::errors::LedgerError;
use crate::fixed_point::{mul_div_floor, FixedPointAmount, FixedPointError, Scale};
use crate::types::{AccountId, AssetSpec, TrackId};

/// Per-instance parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingPoolConfig {
    pub track: TrackId,
    /// Account that custodies deposits; users approve it as spender
    pub pool_id: AccountId,
    pub asset: AssetSpec,
    /// Symbol of the receipt token, e.g. "aUSDT"
    pub receipt_symbol: String,
}

impl StakingPoolConfig {
    pub fn scale(&self) -> Scale {
        self.asset.scale
    }
}

/// Per-user position on one track
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRecord {
    pub staked_amount: u128,
    pub receipt_token_balance: u128,
    /// Unix seconds of the latest deposit
    pub last_stake_timestamp: u64,
    pub total_rewards_claimed: u128,
}

impl StakeRecord {
    pub fn available_rewards(&self) -> u128 {
        self.receipt_token_balance.saturating_sub(self.staked_amount)
    }

    /// Redeemable value of the receipt balance
    pub fn current_value(&self) -> u128 {
        self.receipt_token_balance
    }

    pub fn is_staked(&self) -> bool {
        self.staked_amount > 0
    }
}

/// Pool-wide aggregate, recomputed from the stake records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingPoolStats {
    pub total_staked: u128,
    pub total_rewards_paid: u128,
    pub total_receipt_tokens: u128,
    pub available_rewards: u128,
    /// Hundredths of a percent (523 = 5.23%)
    pub current_apy_bps: u32,
}

impl StakingPoolStats {
    pub fn apy_display(&self) -> String {
        format!("{}%", FixedPointAmount::new(self.current_apy_bps as u128, Scale::APY))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingPool {
    pub config: StakingPoolConfig,
    /// Identity allowed to pause the pool and report yield
    pub operator: AccountId,
    records: BTreeMap<AccountId, StakeRecord>,
    paused: bool,
    total_rewards_paid: u128,
    /// Yield left over from integer pro-rata distribution
    unallocated_yield: u128,
    current_apy_bps: u32,
}

impl StakingPool {
    pub fn new(config: StakingPoolConfig, operator: AccountId) -> Self {
        StakingPool {
            config,
            operator,
            records: BTreeMap::new(),
            paused: false,
            total_rewards_paid: 0,
            unallocated_yield: 0,
            current_apy_bps: 0,
        }
    }

    pub fn track(&self) -> &TrackId {
        &self.config.track
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn unallocated_yield(&self) -> u128 {
        self.unallocated_yield
    }

    /// Current record for `owner`; zeroed if they never staked
    pub fn record(&self, owner: &AccountId) -> StakeRecord {
        self.records.get(owner).copied().unwrap_or_default()
    }

    pub fn records(&self) -> impl Iterator<Item = (&AccountId, &StakeRecord)> {
        self.records.iter()
    }

    pub fn stats(&self) -> StakingPoolStats {
        let mut stats = StakingPoolStats {
            total_rewards_paid: self.total_rewards_paid,
            current_apy_bps: self.current_apy_bps,
            ..StakingPoolStats::default()
        };
        for record in self.records.values() {
            stats.total_staked = stats.total_staked.saturating_add(record.staked_amount);
            stats.total_receipt_tokens = stats
                .total_receipt_tokens
                .saturating_add(record.receipt_token_balance);
            stats.available_rewards = stats
                .available_rewards
                .saturating_add(record.available_rewards());
        }
        stats
    }

    fn ensure_active(&self) -> Result<(), LedgerError> {
        if self.paused {
            return Err(LedgerError::PoolPaused(self.config.track.clone()));
        }
        Ok(())
    }

    fn authorize_operator(&self, caller: &AccountId) -> Result<(), LedgerError> {
        if caller != &self.operator {
            return Err(LedgerError::Unauthorized(format!(
                "{} cannot administer staking track {}",
                caller, self.config.track
            )));
        }
        Ok(())
    }

    fn positive_amount(&self, amount: FixedPointAmount, what: &str) -> Result<u128, LedgerError> {
        let raw = amount.expect_scale(self.config.scale())?.raw();
        if raw == 0 {
            return Err(LedgerError::Validation(format!("{} amount must be positive", what)));
        }
        Ok(raw)
    }

    /// Deposit `amount` from `owner` into the pool.
    ///
    /// Checks run in order: paused, amount, balance, allowance.
    pub fn stake(
        &mut self,
        book: &mut BalanceBook,
        allowances: &mut AllowanceLedger,
        owner: &AccountId,
        amount: FixedPointAmount,
        now: u64,
    ) -> Result<StakeRecord, LedgerError> {
        self.ensure_active()?;
        let amount = self.positive_amount(amount, "stake")?;
        let asset = self.config.asset.id.clone();
        book.require(owner, &asset, amount)?;
        allowances.require(owner, &self.config.pool_id, &asset, amount)?;

        let mut record = self.record(owner);
        record.staked_amount = record
            .staked_amount
            .checked_add(amount)
            .ok_or(FixedPointError::Overflow)?;
        record.receipt_token_balance = record
            .receipt_token_balance
            .checked_add(amount)
            .ok_or(FixedPointError::Overflow)?;
        record.last_stake_timestamp = now;

        book.transfer(owner, &self.config.pool_id, &asset, amount)?;
        allowances.spend(owner, &self.config.pool_id, &asset, amount)?;
        self.records.insert(owner.clone(), record);

        log::debug!("[{}] {} staked {}", self.config.track, owner, amount);
        Ok(record)
    }

    /// Redeem `amount` of principal back to `owner`. Accrued rewards stay claimable.
    pub fn withdraw(
        &mut self,
        book: &mut BalanceBook,
        owner: &AccountId,
        amount: FixedPointAmount,
    ) -> Result<StakeRecord, LedgerError> {
        self.ensure_active()?;
        let amount = self.positive_amount(amount, "withdraw")?;
        let mut record = self.record(owner);
        if amount > record.staked_amount {
            return Err(LedgerError::InsufficientBalance {
                account: owner.clone(),
                asset: self.config.asset.id.clone(),
                required: amount,
                available: record.staked_amount,
            });
        }

        book.transfer(&self.config.pool_id, owner, &self.config.asset.id, amount)?;
        record.staked_amount -= amount;
        record.receipt_token_balance = record.receipt_token_balance.saturating_sub(amount);
        self.records.insert(owner.clone(), record);

        log::debug!("[{}] {} withdrew {}", self.config.track, owner, amount);
        Ok(record)
    }

    /// Pay out everything `owner` has accrued. Returns the amount paid.
    pub fn claim_rewards(&mut self, book: &mut BalanceBook, owner: &AccountId) -> Result<u128, LedgerError> {
        self.ensure_active()?;
        let mut record = self.record(owner);
        let rewards = record.available_rewards();
        if rewards == 0 {
            return Err(LedgerError::NoRewardsAvailable(self.config.track.clone()));
        }
        let total_rewards_paid = self
            .total_rewards_paid
            .checked_add(rewards)
            .ok_or(FixedPointError::Overflow)?;
        let total_rewards_claimed = record
            .total_rewards_claimed
            .checked_add(rewards)
            .ok_or(FixedPointError::Overflow)?;

        book.transfer(&self.config.pool_id, owner, &self.config.asset.id, rewards)?;
        record.receipt_token_balance -= rewards;
        record.total_rewards_claimed = total_rewards_claimed;
        self.total_rewards_paid = total_rewards_paid;
        self.records.insert(owner.clone(), record);

        log::debug!("[{}] {} claimed {}", self.config.track, owner, rewards);
        Ok(rewards)
    }

    /// Operator only: pause or resume every mutating operation
    pub fn set_paused(&mut self, caller: &AccountId, paused: bool) -> Result<(), LedgerError> {
        self.authorize_operator(caller)?;
        self.paused = paused;
        log::info!("[{}] paused = {}", self.config.track, paused);
        Ok(())
    }

    /// Operator only: publish the APY reported by the yield source
    pub fn set_apy(&mut self, caller: &AccountId, apy_bps: u32) -> Result<(), LedgerError> {
        self.authorize_operator(caller)?;
        self.current_apy_bps = apy_bps;
        Ok(())
    }

    /// Operator only: the yield source produced `amount` of the staking asset.
    ///
    /// The amount is minted into the pool account and spread over receipt
    /// balances pro rata; integer remainders are kept as unallocated yield.
    /// Returns the amount actually distributed.
    pub fn accrue_yield(
        &mut self,
        book: &mut BalanceBook,
        caller: &AccountId,
        amount: FixedPointAmount,
    ) -> Result<u128, LedgerError> {
        self.authorize_operator(caller)?;
        let amount = self.positive_amount(amount, "yield")?;
        let total_receipts = self.stats().total_receipt_tokens;
        if total_receipts == 0 {
            return Err(LedgerError::Validation(format!(
                "no receipt tokens outstanding on track {}",
                self.config.track
            )));
        }

        let mut shares = Vec::with_capacity(self.records.len());
        let mut distributed: u128 = 0;
        for (owner, record) in &self.records {
            let share = mul_div_floor(amount, record.receipt_token_balance, total_receipts)?;
            if share > 0 {
                record
                    .receipt_token_balance
                    .checked_add(share)
                    .ok_or(FixedPointError::Overflow)?;
                distributed += share;
                shares.push((owner.clone(), share));
            }
        }

        book.mint(&self.config.pool_id, &self.config.asset.id, amount)?;
        for (owner, share) in shares {
            if let Some(record) = self.records.get_mut(&owner) {
                record.receipt_token_balance += share;
            }
        }
        self.unallocated_yield = self.unallocated_yield.saturating_add(amount - distributed);

        log::debug!(
            "[{}] yield {} accrued, {} distributed",
            self.config.track,
            amount,
            distributed
        );
        Ok(distributed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdt_pool() -> StakingPool {
        StakingPool::new(
            StakingPoolConfig {
                track: TrackId::new("usdt"),
                pool_id: AccountId::new("staking"),
                asset: AssetSpec::new("usdt", "USDT", Scale::STABLE),
                receipt_symbol: "aUSDT".to_string(),
            },
            AccountId::new("operator"),
        )
    }

    fn usdt(units: u128) -> FixedPointAmount {
        FixedPointAmount::from_units(units, Scale::STABLE).unwrap()
    }

    fn alice() -> AccountId {
        AccountId::new("alice")
    }

    fn bob() -> AccountId {
        AccountId::new("bob")
    }

    fn operator() -> AccountId {
        AccountId::new("operator")
    }

    /// Pool, book and allowances with `alice` and `bob` funded and approved for 1000 USDT
    fn funded() -> (StakingPool, BalanceBook, AllowanceLedger) {
        let pool = usdt_pool();
        let mut book = BalanceBook::new();
        let mut allowances = AllowanceLedger::new();
        for who in [alice(), bob()] {
            book.mint(&who, &pool.config.asset.id, usdt(1000).raw()).unwrap();
            allowances.approve(&who, &pool.config.pool_id, &pool.config.asset.id, usdt(1000).raw());
        }
        (pool, book, allowances)
    }

    #[test]
    fn test_stake_moves_funds_and_mirrors_receipts() {
        let (mut pool, mut book, mut allowances) = funded();
        let record = pool.stake(&mut book, &mut allowances, &alice(), usdt(100), 1_700_000_000).unwrap();

        assert_eq!(record.staked_amount, usdt(100).raw());
        assert_eq!(record.receipt_token_balance, usdt(100).raw());
        assert_eq!(record.last_stake_timestamp, 1_700_000_000);
        assert_eq!(book.balance(&alice(), &pool.config.asset.id), usdt(900).raw());
        assert_eq!(book.balance(&pool.config.pool_id, &pool.config.asset.id), usdt(100).raw());
        assert_eq!(pool.stats().total_staked, usdt(100).raw());
    }

    #[test]
    fn test_stake_requires_allowance() {
        let (mut pool, mut book, _) = funded();
        let mut empty = AllowanceLedger::new();
        let err = pool.stake(&mut book, &mut empty, &alice(), usdt(1), 0).unwrap_err();
        assert!(matches!(err, LedgerError::NeedsApproval { .. }));
        assert_eq!(pool.record(&alice()), StakeRecord::default());
    }

    #[test]
    fn test_stake_rejects_other_scale() {
        let (mut pool, mut book, mut allowances) = funded();
        let standard = FixedPointAmount::from_units(1, Scale::STANDARD).unwrap();
        let err = pool.stake(&mut book, &mut allowances, &alice(), standard, 0).unwrap_err();
        assert!(matches!(err, LedgerError::Amount(FixedPointError::ScaleMismatch { .. })));
    }

    #[test]
    fn test_withdraw_more_than_staked_never_underflows() {
        let (mut pool, mut book, _) = funded();
        let err = pool.withdraw(&mut book, &alice(), usdt(1)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { available: 0, .. }));
        assert_eq!(pool.record(&alice()).staked_amount, 0);
    }

    #[test]
    fn test_paused_pool_rejects_before_other_checks() {
        let (mut pool, mut book, mut allowances) = funded();
        pool.set_paused(&operator(), true).unwrap();

        // Zero amount, no allowance and no stake would each fail on their own
        let mut empty = AllowanceLedger::new();
        let zero = FixedPointAmount::zero(Scale::STABLE);
        assert!(matches!(
            pool.stake(&mut book, &mut empty, &alice(), zero, 0),
            Err(LedgerError::PoolPaused(_))
        ));
        assert!(matches!(pool.withdraw(&mut book, &alice(), usdt(5)), Err(LedgerError::PoolPaused(_))));
        assert!(matches!(pool.claim_rewards(&mut book, &alice()), Err(LedgerError::PoolPaused(_))));

        pool.set_paused(&operator(), false).unwrap();
        assert!(pool.stake(&mut book, &mut allowances, &alice(), usdt(5), 0).is_ok());
    }

    #[test]
    fn test_only_operator_pauses() {
        let mut pool = usdt_pool();
        assert!(matches!(pool.set_paused(&alice(), true), Err(LedgerError::Unauthorized(_))));
        assert!(!pool.is_paused());
    }

    #[test]
    fn test_yield_is_pro_rata_and_claimable() {
        let (mut pool, mut book, mut allowances) = funded();
        pool.stake(&mut book, &mut allowances, &alice(), usdt(300), 0).unwrap();
        pool.stake(&mut book, &mut allowances, &bob(), usdt(100), 0).unwrap();

        let distributed = pool.accrue_yield(&mut book, &operator(), usdt(40)).unwrap();
        assert_eq!(distributed, usdt(40).raw());
        assert_eq!(pool.record(&alice()).available_rewards(), usdt(30).raw());
        assert_eq!(pool.record(&bob()).available_rewards(), usdt(10).raw());

        let claimed = pool.claim_rewards(&mut book, &alice()).unwrap();
        assert_eq!(claimed, usdt(30).raw());
        let record = pool.record(&alice());
        assert_eq!(record.available_rewards(), 0);
        assert_eq!(record.total_rewards_claimed, usdt(30).raw());
        assert_eq!(record.staked_amount, usdt(300).raw());
        assert_eq!(pool.stats().total_rewards_paid, usdt(30).raw());
        assert_eq!(book.balance(&alice(), &pool.config.asset.id), usdt(730).raw());
    }

    #[test]
    fn test_claim_with_nothing_accrued() {
        let (mut pool, mut book, mut allowances) = funded();
        pool.stake(&mut book, &mut allowances, &alice(), usdt(10), 0).unwrap();
        assert!(matches!(pool.claim_rewards(&mut book, &alice()), Err(LedgerError::NoRewardsAvailable(_))));
    }

    #[test]
    fn test_withdraw_keeps_rewards_claimable() {
        let (mut pool, mut book, mut allowances) = funded();
        pool.stake(&mut book, &mut allowances, &alice(), usdt(100), 0).unwrap();
        pool.accrue_yield(&mut book, &operator(), usdt(5)).unwrap();

        let record = pool.withdraw(&mut book, &alice(), usdt(100)).unwrap();
        assert_eq!(record.staked_amount, 0);
        assert_eq!(record.available_rewards(), usdt(5).raw());
        assert_eq!(pool.claim_rewards(&mut book, &alice()).unwrap(), usdt(5).raw());
    }

    #[test]
    fn test_remainder_is_unallocated() {
        let (mut pool, mut book, mut allowances) = funded();
        pool.stake(&mut book, &mut allowances, &alice(), FixedPointAmount::new(1, Scale::STABLE), 0).unwrap();
        pool.stake(&mut book, &mut allowances, &bob(), FixedPointAmount::new(2, Scale::STABLE), 0).unwrap();

        let distributed = pool
            .accrue_yield(&mut book, &operator(), FixedPointAmount::new(2, Scale::STABLE))
            .unwrap();
        assert_eq!(distributed, 1);
        assert_eq!(pool.unallocated_yield(), 1);
    }

    #[test]
    fn test_apy_display() {
        let mut pool = usdt_pool();
        pool.set_apy(&operator(), 523).unwrap();
        assert_eq!(pool.stats().apy_display(), "5.23%");
    }
}
