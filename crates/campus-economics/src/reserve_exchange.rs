//! RESERVE EXCHANGE
//!
//! Fixed-rate two-sided reserve converting between the base currency and the
//! utility token. Quotes are pure integer arithmetic; buy and sell validate
//! every precondition before writing, so a swap either applies to the
//! balance book and both reserves together or not at all.
//!
//! Sell quotes truncate toward zero, so rounding always favors the pool.

use serde::{Deserialize, Serialize};

use crate::allowance::AllowanceLedger;
use crate::balances::BalanceBook;
use crate::errors::LedgerError;
use crate::fixed_point::{mul_div_floor, FixedPointAmount, FixedPointError};
use crate::types::{AccountId, AssetSpec};

/// Reference deployment rate: 1 currency unit buys 4000 token units
pub const DEFAULT_TOKENS_PER_CURRENCY: u128 = 4000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Whole tokens per whole currency unit
    pub tokens_per_currency: u128,
    pub currency: AssetSpec,
    pub token: AssetSpec,
}

impl ExchangeRate {
    pub fn new(tokens_per_currency: u128, currency: AssetSpec, token: AssetSpec) -> Result<Self, LedgerError> {
        if tokens_per_currency == 0 {
            return Err(LedgerError::Validation("exchange rate must be positive".to_string()));
        }
        if currency.id == token.id {
            return Err(LedgerError::Validation(
                "currency and token must be different assets".to_string(),
            ));
        }
        Ok(ExchangeRate { tokens_per_currency, currency, token })
    }

    /// Raw token units per whole currency unit
    fn token_units_per_currency(&self) -> Result<u128, FixedPointError> {
        self.tokens_per_currency
            .checked_mul(self.token.scale.one())
            .ok_or(FixedPointError::Overflow)
    }

    /// tokenAmount = currencyAmount * RATE
    pub fn quote_buy(&self, currency_amount: FixedPointAmount) -> Result<FixedPointAmount, LedgerError> {
        let currency_amount = currency_amount.expect_scale(self.currency.scale)?;
        let raw = mul_div_floor(
            currency_amount.raw(),
            self.token_units_per_currency()?,
            self.currency.scale.one(),
        )?;
        Ok(self.token.amount(raw))
    }

    /// currencyAmount = tokenAmount / RATE, truncated toward zero
    pub fn quote_sell(&self, token_amount: FixedPointAmount) -> Result<FixedPointAmount, LedgerError> {
        let token_amount = token_amount.expect_scale(self.token.scale)?;
        let raw = mul_div_floor(
            token_amount.raw(),
            self.currency.scale.one(),
            self.token_units_per_currency()?,
        )?;
        Ok(self.currency.amount(raw))
    }
}

/// The two reserves backing conversions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservePool {
    pub currency_reserve: u128,
    pub token_reserve: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapKind {
    Buy,
    Sell,
}

/// Result of a confirmed buy or sell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapReceipt {
    pub kind: SwapKind,
    pub account: AccountId,
    pub currency_amount: u128,
    pub token_amount: u128,
    pub reserves_after: ReservePool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReserveWarning {
    /// Nothing to sell to buyers until the operator mints a token reserve
    NoTokenReserve,
    TokenReserveInsufficient { required: u128, available: u128 },
    CurrencyReserveInsufficient { required: u128, available: u128 },
}

/// Warnings for the amounts a user is about to buy or sell, against a reserve snapshot.
pub fn reserve_warnings(
    pool: &ReservePool,
    rate: &ExchangeRate,
    pending_buy: Option<FixedPointAmount>,
    pending_sell: Option<FixedPointAmount>,
) -> Vec<ReserveWarning> {
    let mut warnings = Vec::new();

    if pool.token_reserve == 0 {
        warnings.push(ReserveWarning::NoTokenReserve);
    }

    if pool.token_reserve > 0 {
        if let Some(Ok(tokens)) = pending_buy.map(|c| rate.quote_buy(c)) {
            if tokens.raw() > pool.token_reserve {
                warnings.push(ReserveWarning::TokenReserveInsufficient {
                    required: tokens.raw(),
                    available: pool.token_reserve,
                });
            }
        }
    }

    if pool.currency_reserve > 0 {
        if let Some(Ok(currency)) = pending_sell.map(|t| rate.quote_sell(t)) {
            if currency.raw() > pool.currency_reserve {
                warnings.push(ReserveWarning::CurrencyReserveInsufficient {
                    required: currency.raw(),
                    available: pool.currency_reserve,
                });
            }
        }
    }

    warnings
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveExchange {
    /// Spender identity users approve before selling
    pub exchange_id: AccountId,
    /// Only identity allowed to grow the reserves
    pub operator: AccountId,
    pub rate: ExchangeRate,
    pub pool: ReservePool,
}

impl ReserveExchange {
    pub fn new(exchange_id: AccountId, operator: AccountId, rate: ExchangeRate) -> Self {
        ReserveExchange {
            exchange_id,
            operator,
            rate,
            pool: ReservePool::default(),
        }
    }

    pub fn reserves(&self) -> ReservePool {
        self.pool
    }

    pub fn is_operator(&self, account: &AccountId) -> bool {
        &self.operator == account
    }

    fn authorize_operator(&self, caller: &AccountId) -> Result<(), LedgerError> {
        if !self.is_operator(caller) {
            return Err(LedgerError::Unauthorized(format!(
                "{} is not the reserve operator",
                caller
            )));
        }
        Ok(())
    }

    /// Pay `currency_amount`, receive `quote_buy(currency_amount)` tokens from the reserve.
    pub fn buy(
        &mut self,
        book: &mut BalanceBook,
        buyer: &AccountId,
        currency_amount: FixedPointAmount,
    ) -> Result<SwapReceipt, LedgerError> {
        let paid = currency_amount.expect_scale(self.rate.currency.scale)?.raw();
        if paid == 0 {
            return Err(LedgerError::Validation("buy amount must be positive".to_string()));
        }
        let tokens = self.rate.quote_buy(currency_amount)?.raw();
        if tokens == 0 {
            return Err(LedgerError::Validation(
                "buy amount is below the smallest token unit at this rate".to_string(),
            ));
        }

        if self.pool.token_reserve < tokens {
            return Err(LedgerError::ReserveInsufficient {
                asset: self.rate.token.id.clone(),
                required: tokens,
                available: self.pool.token_reserve,
            });
        }
        book.require(buyer, &self.rate.currency.id, paid)?;
        let currency_reserve = self
            .pool
            .currency_reserve
            .checked_add(paid)
            .ok_or(FixedPointError::Overflow)?;
        book.balance(buyer, &self.rate.token.id)
            .checked_add(tokens)
            .ok_or(FixedPointError::Overflow)?;

        book.debit(buyer, &self.rate.currency.id, paid)?;
        book.credit(buyer, &self.rate.token.id, tokens)?;
        self.pool.currency_reserve = currency_reserve;
        self.pool.token_reserve -= tokens;

        log::debug!("buy: {} paid {} for {} tokens", buyer, paid, tokens);
        Ok(SwapReceipt {
            kind: SwapKind::Buy,
            account: buyer.clone(),
            currency_amount: paid,
            token_amount: tokens,
            reserves_after: self.pool,
        })
    }

    /// Return `token_amount` to the reserve for `quote_sell(token_amount)` currency.
    ///
    /// Requires an allowance for the exchange unless the seller is the operator.
    pub fn sell(
        &mut self,
        book: &mut BalanceBook,
        allowances: &mut AllowanceLedger,
        seller: &AccountId,
        token_amount: FixedPointAmount,
    ) -> Result<SwapReceipt, LedgerError> {
        let sold = token_amount.expect_scale(self.rate.token.scale)?.raw();
        if sold == 0 {
            return Err(LedgerError::Validation("sell amount must be positive".to_string()));
        }
        let currency = self.rate.quote_sell(token_amount)?.raw();
        if currency == 0 {
            return Err(LedgerError::Validation(
                "sell amount is below the smallest currency unit at this rate".to_string(),
            ));
        }

        let token_id = self.rate.token.id.clone();
        book.require(seller, &token_id, sold)?;
        let needs_allowance = !self.is_operator(seller);
        if needs_allowance {
            allowances.require(seller, &self.exchange_id, &token_id, sold)?;
        }
        if self.pool.currency_reserve < currency {
            return Err(LedgerError::ReserveInsufficient {
                asset: self.rate.currency.id.clone(),
                required: currency,
                available: self.pool.currency_reserve,
            });
        }
        let token_reserve = self
            .pool
            .token_reserve
            .checked_add(sold)
            .ok_or(FixedPointError::Overflow)?;
        book.balance(seller, &self.rate.currency.id)
            .checked_add(currency)
            .ok_or(FixedPointError::Overflow)?;

        book.debit(seller, &token_id, sold)?;
        book.credit(seller, &self.rate.currency.id, currency)?;
        if needs_allowance {
            allowances.spend(seller, &self.exchange_id, &token_id, sold)?;
        }
        self.pool.token_reserve = token_reserve;
        self.pool.currency_reserve -= currency;

        log::debug!("sell: {} sold {} tokens for {}", seller, sold, currency);
        Ok(SwapReceipt {
            kind: SwapKind::Sell,
            account: seller.clone(),
            currency_amount: currency,
            token_amount: sold,
            reserves_after: self.pool,
        })
    }

    /// Operator only: mint new tokens straight into the token reserve
    pub fn mint_token_reserve(
        &mut self,
        book: &mut BalanceBook,
        caller: &AccountId,
        amount: FixedPointAmount,
    ) -> Result<ReservePool, LedgerError> {
        self.authorize_operator(caller)?;
        let amount = amount.expect_scale(self.rate.token.scale)?.raw();
        if amount == 0 {
            return Err(LedgerError::Validation("mint amount must be positive".to_string()));
        }
        let token_reserve = self
            .pool
            .token_reserve
            .checked_add(amount)
            .ok_or(FixedPointError::Overflow)?;

        book.issue(&self.rate.token.id, amount)?;
        self.pool.token_reserve = token_reserve;
        log::debug!("token reserve minted: +{} -> {}", amount, token_reserve);
        Ok(self.pool)
    }

    /// Operator only: move currency from the operator into the currency reserve
    pub fn add_currency_reserve(
        &mut self,
        book: &mut BalanceBook,
        caller: &AccountId,
        amount: FixedPointAmount,
    ) -> Result<ReservePool, LedgerError> {
        self.authorize_operator(caller)?;
        let amount = amount.expect_scale(self.rate.currency.scale)?.raw();
        if amount == 0 {
            return Err(LedgerError::Validation("reserve amount must be positive".to_string()));
        }
        let currency_reserve = self
            .pool
            .currency_reserve
            .checked_add(amount)
            .ok_or(FixedPointError::Overflow)?;

        book.debit(caller, &self.rate.currency.id, amount)?;
        self.pool.currency_reserve = currency_reserve;
        log::debug!("currency reserve funded: +{} -> {}", amount, currency_reserve);
        Ok(self.pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed_point::Scale;
    use crate::types::AssetId;

    fn rate() -> ExchangeRate {
        ExchangeRate::new(
            DEFAULT_TOKENS_PER_CURRENCY,
            AssetSpec::new("eth", "ETH", Scale::STANDARD),
            AssetSpec::new("yd", "YD", Scale::STANDARD),
        )
        .unwrap()
    }

    fn eth(units: u128) -> FixedPointAmount {
        FixedPointAmount::from_units(units, Scale::STANDARD).unwrap()
    }

    fn yd(units: u128) -> FixedPointAmount {
        FixedPointAmount::from_units(units, Scale::STANDARD).unwrap()
    }

    fn operator() -> AccountId {
        AccountId::new("operator")
    }

    fn alice() -> AccountId {
        AccountId::new("alice")
    }

    /// Exchange with reserves (10 ETH, 1,000,000 YD) and a funded buyer
    fn seeded() -> (ReserveExchange, BalanceBook, AllowanceLedger) {
        let mut exchange = ReserveExchange::new(AccountId::new("exchange"), operator(), rate());
        let mut book = BalanceBook::new();
        book.mint(&operator(), &AssetId::new("eth"), eth(10).raw()).unwrap();
        book.mint(&alice(), &AssetId::new("eth"), eth(500).raw()).unwrap();
        exchange.add_currency_reserve(&mut book, &operator(), eth(10)).unwrap();
        exchange.mint_token_reserve(&mut book, &operator(), yd(1_000_000)).unwrap();
        (exchange, book, AllowanceLedger::new())
    }

    #[test]
    fn test_round_trip_quote_at_reference_rate() {
        let rate = rate();
        assert_eq!(rate.quote_buy(eth(1)).unwrap(), yd(4000));
        assert_eq!(rate.quote_sell(yd(4000)).unwrap(), eth(1));
    }

    #[test]
    fn test_sell_quote_truncates_toward_pool() {
        let rate = rate();
        let just_under = FixedPointAmount::new(yd(4000).raw() - 1, Scale::STANDARD);
        assert!(rate.quote_sell(just_under).unwrap().raw() < eth(1).raw());
        assert_eq!(rate.quote_sell(FixedPointAmount::new(3999, Scale::STANDARD)).unwrap().raw(), 0);
    }

    #[test]
    fn test_quote_rejects_wrong_scale() {
        let rate = rate();
        let stable = FixedPointAmount::from_units(1, Scale::STABLE).unwrap();
        assert!(matches!(rate.quote_buy(stable), Err(LedgerError::Amount(_))));
    }

    #[test]
    fn test_buy_scenario_from_reference_reserves() {
        let (mut exchange, mut book, _) = seeded();

        let receipt = exchange.buy(&mut book, &alice(), eth(1)).unwrap();
        assert_eq!(receipt.reserves_after.token_reserve, yd(996_000).raw());
        assert_eq!(receipt.reserves_after.currency_reserve, eth(11).raw());

        exchange.buy(&mut book, &alice(), eth(100)).unwrap();
        assert_eq!(exchange.pool.token_reserve, yd(596_000).raw());

        let before = exchange.pool;
        let err = exchange.buy(&mut book, &alice(), eth(150)).unwrap_err();
        assert!(matches!(err, LedgerError::ReserveInsufficient { .. }));
        assert_eq!(exchange.pool, before);
    }

    #[test]
    fn test_buy_conservation() {
        let (mut exchange, mut book, _) = seeded();
        let before = exchange.pool;
        let quote = exchange.rate.quote_buy(eth(3)).unwrap().raw();

        exchange.buy(&mut book, &alice(), eth(3)).unwrap();

        assert_eq!(exchange.pool.currency_reserve, before.currency_reserve + eth(3).raw());
        assert_eq!(exchange.pool.token_reserve, before.token_reserve - quote);
        assert_eq!(book.balance(&alice(), &AssetId::new("yd")), quote);
    }

    #[test]
    fn test_sell_requires_allowance_then_conserves() {
        let (mut exchange, mut book, mut allowances) = seeded();
        exchange.buy(&mut book, &alice(), eth(1)).unwrap();

        let err = exchange.sell(&mut book, &mut allowances, &alice(), yd(2000)).unwrap_err();
        assert!(matches!(err, LedgerError::NeedsApproval { .. }));

        allowances.approve(&alice(), &exchange.exchange_id, &AssetId::new("yd"), yd(2000).raw());
        let before = exchange.pool;
        let receipt = exchange.sell(&mut book, &mut allowances, &alice(), yd(2000)).unwrap();

        assert_eq!(receipt.currency_amount, eth(1).raw() / 2);
        assert_eq!(exchange.pool.token_reserve, before.token_reserve + yd(2000).raw());
        assert_eq!(exchange.pool.currency_reserve, before.currency_reserve - eth(1).raw() / 2);
        assert_eq!(allowances.allowance(&alice(), &exchange.exchange_id, &AssetId::new("yd")), 0);
    }

    #[test]
    fn test_operator_sells_without_allowance() {
        let (mut exchange, mut book, mut allowances) = seeded();
        book.mint(&operator(), &AssetId::new("yd"), yd(4000).raw()).unwrap();
        exchange.sell(&mut book, &mut allowances, &operator(), yd(4000)).unwrap();
        assert_eq!(book.balance(&operator(), &AssetId::new("eth")), eth(1).raw());
    }

    #[test]
    fn test_sell_fails_on_empty_currency_reserve() {
        let mut exchange = ReserveExchange::new(AccountId::new("exchange"), operator(), rate());
        let mut book = BalanceBook::new();
        let mut allowances = AllowanceLedger::new();
        book.mint(&alice(), &AssetId::new("yd"), yd(4000).raw()).unwrap();
        allowances.approve(&alice(), &exchange.exchange_id, &AssetId::new("yd"), yd(4000).raw());

        let err = exchange.sell(&mut book, &mut allowances, &alice(), yd(4000)).unwrap_err();
        assert!(matches!(err, LedgerError::ReserveInsufficient { .. }));
        assert_eq!(book.balance(&alice(), &AssetId::new("yd")), yd(4000).raw());
    }

    #[test]
    fn test_dust_sell_rejected() {
        let (mut exchange, mut book, mut allowances) = seeded();
        book.mint(&alice(), &AssetId::new("yd"), 10).unwrap();
        let dust = FixedPointAmount::new(10, Scale::STANDARD);
        let err = exchange.sell(&mut book, &mut allowances, &alice(), dust).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn test_dust_buy_rejected_when_token_scale_is_coarser() {
        let coarse = ExchangeRate::new(
            DEFAULT_TOKENS_PER_CURRENCY,
            AssetSpec::new("eth", "ETH", Scale::STANDARD),
            AssetSpec::new("pts", "PTS", Scale::new(2).unwrap()),
        )
        .unwrap();
        let mut exchange = ReserveExchange::new(AccountId::new("exchange"), operator(), coarse);
        let mut book = BalanceBook::new();
        book.mint(&alice(), &AssetId::new("eth"), eth(1).raw()).unwrap();
        exchange
            .mint_token_reserve(&mut book, &operator(), FixedPointAmount::new(1_000_000, Scale::new(2).unwrap()))
            .unwrap();

        let dust = FixedPointAmount::new(1, Scale::STANDARD);
        let err = exchange.buy(&mut book, &alice(), dust).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(book.balance(&alice(), &AssetId::new("eth")), eth(1).raw());
        assert_eq!(exchange.pool.currency_reserve, 0);

        // 1 ETH is 4000.00 PTS
        let receipt = exchange.buy(&mut book, &alice(), eth(1)).unwrap();
        assert_eq!(receipt.token_amount, 400_000);
    }

    #[test]
    fn test_privileged_operations_reject_non_operator() {
        let (mut exchange, mut book, _) = seeded();
        let err = exchange.mint_token_reserve(&mut book, &alice(), yd(1)).unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized(_)));
        let err = exchange.add_currency_reserve(&mut book, &alice(), eth(1)).unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized(_)));
    }

    #[test]
    fn test_zero_amounts_are_validation_errors() {
        let (mut exchange, mut book, mut allowances) = seeded();
        let zero = FixedPointAmount::zero(Scale::STANDARD);
        assert!(matches!(exchange.buy(&mut book, &alice(), zero), Err(LedgerError::Validation(_))));
        assert!(matches!(
            exchange.sell(&mut book, &mut allowances, &alice(), zero),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_reserve_warnings() {
        let rate = rate();
        let empty = ReservePool::default();
        assert_eq!(reserve_warnings(&empty, &rate, Some(eth(1)), None), vec![ReserveWarning::NoTokenReserve]);

        let pool = ReservePool { currency_reserve: eth(1).raw(), token_reserve: yd(4000).raw() };
        let warnings = reserve_warnings(&pool, &rate, Some(eth(2)), Some(yd(8000)));
        assert_eq!(
            warnings,
            vec![
                ReserveWarning::TokenReserveInsufficient { required: yd(8000).raw(), available: yd(4000).raw() },
                ReserveWarning::CurrencyReserveInsufficient { required: eth(2).raw(), available: eth(1).raw() },
            ]
        );
        assert!(reserve_warnings(&pool, &rate, Some(eth(1)), Some(yd(4000))).is_empty());
    }
}
