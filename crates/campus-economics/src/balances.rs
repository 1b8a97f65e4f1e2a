//! BALANCE BOOK
//!
//! (owner, asset) -> amount in smallest units. Entries are created implicitly
//! at zero and never removed. Amounts are unsigned, so a debit that would go
//! negative is rejected before anything is written.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::LedgerError;
use crate::fixed_point::FixedPointError;
use crate::types::{AccountId, AssetId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceBook {
    /// owner -> asset -> amount
    balances: BTreeMap<AccountId, BTreeMap<AssetId, u128>>,
    /// Issued supply per asset (mints minus burns), wherever it is held
    supply: BTreeMap<AssetId, u128>,
}

impl BalanceBook {
    pub fn new() -> Self {
        BalanceBook::default()
    }

    pub fn balance(&self, account: &AccountId, asset: &AssetId) -> u128 {
        self.balances
            .get(account)
            .and_then(|assets| assets.get(asset))
            .copied()
            .unwrap_or(0)
    }

    /// Fail with `InsufficientBalance` unless `account` holds at least `amount`
    pub fn require(&self, account: &AccountId, asset: &AssetId, amount: u128) -> Result<(), LedgerError> {
        let available = self.balance(account, asset);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: account.clone(),
                asset: asset.clone(),
                required: amount,
                available,
            });
        }
        Ok(())
    }

    pub fn credit(&mut self, account: &AccountId, asset: &AssetId, amount: u128) -> Result<(), LedgerError> {
        let current = self.balance(account, asset);
        let updated = current
            .checked_add(amount)
            .ok_or(FixedPointError::Overflow)?;
        self.set(account, asset, updated);
        Ok(())
    }

    pub fn debit(&mut self, account: &AccountId, asset: &AssetId, amount: u128) -> Result<(), LedgerError> {
        self.require(account, asset, amount)?;
        let updated = self.balance(account, asset) - amount;
        self.set(account, asset, updated);
        Ok(())
    }

    /// Move `amount` between two accounts; either both sides change or neither does.
    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        asset: &AssetId,
        amount: u128,
    ) -> Result<(), LedgerError> {
        self.require(from, asset, amount)?;
        if from == to {
            return Ok(());
        }
        self.balance(to, asset)
            .checked_add(amount)
            .ok_or(FixedPointError::Overflow)?;

        self.debit(from, asset, amount)?;
        self.credit(to, asset, amount)
    }

    /// Create new units in `account`
    pub fn mint(&mut self, account: &AccountId, asset: &AssetId, amount: u128) -> Result<(), LedgerError> {
        self.issue(asset, amount)?;
        self.credit(account, asset, amount)
    }

    /// Destroy units held by `account`
    pub fn burn(&mut self, account: &AccountId, asset: &AssetId, amount: u128) -> Result<(), LedgerError> {
        self.debit(account, asset, amount)?;
        let supply = self.supply.entry(asset.clone()).or_insert(0);
        *supply = supply.saturating_sub(amount);
        Ok(())
    }

    /// Record supply that is held outside any account balance (e.g. a reserve)
    pub fn issue(&mut self, asset: &AssetId, amount: u128) -> Result<(), LedgerError> {
        let supply = self.supply.entry(asset.clone()).or_insert(0);
        *supply = supply.checked_add(amount).ok_or(FixedPointError::Overflow)?;
        Ok(())
    }

    pub fn supply(&self, asset: &AssetId) -> u128 {
        self.supply.get(asset).copied().unwrap_or(0)
    }

    /// Sum of all account balances of `asset`
    pub fn holdings(&self, asset: &AssetId) -> u128 {
        self.balances
            .values()
            .filter_map(|assets| assets.get(asset))
            .fold(0u128, |acc, amount| acc.saturating_add(*amount))
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetId> {
        self.supply.keys()
    }

    pub fn accounts(&self) -> impl Iterator<Item = &AccountId> {
        self.balances.keys()
    }

    fn set(&mut self, account: &AccountId, asset: &AssetId, amount: u128) {
        self.balances
            .entry(account.clone())
            .or_default()
            .insert(asset.clone(), amount);
    }
}
