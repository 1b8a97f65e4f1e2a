//! ALLOWANCE LEDGER
//!
//! (owner, spender, asset) -> approved amount. `approve` replaces the previous
//! value (last write wins, never cumulative). Spending components only check
//! `amount <= allowance` through [`AllowanceLedger::require`]; the ledger of
//! record additionally decrements on spend, standard-token style.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::LedgerError;
use crate::types::{AccountId, AssetId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceLedger {
    /// owner -> spender -> asset -> amount
    allowances: BTreeMap<AccountId, BTreeMap<AccountId, BTreeMap<AssetId, u128>>>,
}

impl AllowanceLedger {
    pub fn new() -> Self {
        AllowanceLedger::default()
    }

    /// Set allowance(owner, spender, asset) = amount, replacing any prior value
    pub fn approve(&mut self, owner: &AccountId, spender: &AccountId, asset: &AssetId, amount: u128) {
        log::debug!("approve {} -> {} {} = {}", owner, spender, asset, amount);
        self.allowances
            .entry(owner.clone())
            .or_default()
            .entry(spender.clone())
            .or_default()
            .insert(asset.clone(), amount);
    }

    pub fn allowance(&self, owner: &AccountId, spender: &AccountId, asset: &AssetId) -> u128 {
        self.allowances
            .get(owner)
            .and_then(|spenders| spenders.get(spender))
            .and_then(|assets| assets.get(asset))
            .copied()
            .unwrap_or(0)
    }

    /// Pure gate check. A zero requirement is always sufficient.
    pub fn check_sufficient(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        asset: &AssetId,
        required: u128,
    ) -> bool {
        required == 0 || required <= self.allowance(owner, spender, asset)
    }

    /// Gate check that reports `NeedsApproval` with the shortfall details
    pub fn require(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        asset: &AssetId,
        required: u128,
    ) -> Result<(), LedgerError> {
        if self.check_sufficient(owner, spender, asset, required) {
            return Ok(());
        }
        Err(LedgerError::NeedsApproval {
            owner: owner.clone(),
            spender: spender.clone(),
            asset: asset.clone(),
            required,
            approved: self.allowance(owner, spender, asset),
        })
    }

    /// Consume `amount` of the allowance after a spender-initiated transfer
    pub fn spend(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        asset: &AssetId,
        amount: u128,
    ) -> Result<(), LedgerError> {
        self.require(owner, spender, asset, amount)?;
        let remaining = self.allowance(owner, spender, asset) - amount;
        self.approve(owner, spender, asset, remaining);
        Ok(())
    }
}
