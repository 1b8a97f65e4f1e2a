/// CAMPUS TOKEN ECONOMY: LEDGER STATE MACHINES
///
/// This crate is the authoritative rule set behind the campus economy:
/// - Quantities are exact fixed-point integers with a declared scale
/// - Third-party transfers are gated by owner-issued allowances
/// - The reserve exchange converts at a fixed rate and never overdraws a reserve
/// - Staking tracks share one generic pool with per-track scale and pause switch
/// - Course purchases are one-time, allowance-gated and never self-dealt
///
/// Every transition validates all preconditions before writing anything.

pub mod fixed_point;
pub mod types;
pub mod errors;
pub mod balances;
pub mod allowance;
pub mod reserve_exchange;
pub mod staking;
pub mod course_gate;
pub mod action;

// Re-export key types for easy access
pub use fixed_point::{mul_div_floor, FixedPointAmount, FixedPointError, Scale, MAX_DECIMALS};

pub use types::{AccountId, AssetId, AssetSpec, TrackId};

pub use errors::{ErrorKind, LedgerError};

pub use balances::BalanceBook;

pub use allowance::AllowanceLedger;

pub use reserve_exchange::{
    reserve_warnings, ExchangeRate, ReserveExchange, ReservePool, ReserveWarning, SwapKind,
    SwapReceipt, DEFAULT_TOKENS_PER_CURRENCY,
};

pub use staking::{StakeRecord, StakingPool, StakingPoolConfig, StakingPoolStats};

pub use course_gate::{generate_course_id, CourseCatalog, CourseId, CourseRecord, PaymentDestination};

pub use action::{ActionOutcome, LedgerAction};

/// Economic system integrator (combines all components over one balance book)
pub mod integration {
    use crate::*;
    use serde::{Deserialize, Serialize};
    use sha2::{Digest, Sha256};
    use std::collections::{BTreeMap, BTreeSet};

    /// Deployment parameters of one ledger instance
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct EconomicsConfig {
        pub operator: AccountId,
        pub exchange_id: AccountId,
        pub gate_id: AccountId,
        pub tokens_per_currency: u128,
        pub currency: AssetSpec,
        pub token: AssetSpec,
        pub tracks: Vec<StakingPoolConfig>,
        pub destination: PaymentDestination,
    }

    impl EconomicsConfig {
        /// Reference deployment: ETH/YD at 4000, USDT (6 decimals) and LINK (18 decimals) tracks
        pub fn reference() -> Self {
            EconomicsConfig {
                operator: AccountId::new("operator"),
                exchange_id: AccountId::new("exchange"),
                gate_id: AccountId::new("course-gate"),
                tokens_per_currency: DEFAULT_TOKENS_PER_CURRENCY,
                currency: AssetSpec::new("eth", "ETH", Scale::STANDARD),
                token: AssetSpec::new("yd", "YD", Scale::STANDARD),
                tracks: vec![
                    StakingPoolConfig {
                        track: TrackId::new("usdt"),
                        pool_id: AccountId::new("staking-usdt"),
                        asset: AssetSpec::new("usdt", "USDT", Scale::STABLE),
                        receipt_symbol: "aUSDT".to_string(),
                    },
                    StakingPoolConfig {
                        track: TrackId::new("link"),
                        pool_id: AccountId::new("staking-link"),
                        asset: AssetSpec::new("link", "LINK", Scale::STANDARD),
                        receipt_symbol: "aLINK".to_string(),
                    },
                ],
                destination: PaymentDestination::Creator,
            }
        }

        /// Every asset this deployment knows about, currency and token first
        pub fn assets(&self) -> Vec<&AssetSpec> {
            let mut assets = vec![&self.currency, &self.token];
            for track in &self.tracks {
                if !assets.iter().any(|known| known.id == track.asset.id) {
                    assets.push(&track.asset);
                }
            }
            assets
        }

        pub fn asset_spec(&self, asset: &AssetId) -> Option<&AssetSpec> {
            self.assets().into_iter().find(|spec| &spec.id == asset)
        }

        pub fn validate(&self) -> Result<(), EconomicError> {
            ExchangeRate::new(self.tokens_per_currency, self.currency.clone(), self.token.clone())?;

            let mut seen_tracks = BTreeSet::new();
            let mut seen_pools = BTreeSet::new();
            for track in &self.tracks {
                if !seen_tracks.insert(track.track.clone()) {
                    return Err(EconomicError::InvalidConfig(format!("duplicate staking track {}", track.track)));
                }
                if !seen_pools.insert(track.pool_id.clone()) {
                    return Err(EconomicError::InvalidConfig(format!("pool account {} used twice", track.pool_id)));
                }
                for known in [&self.currency, &self.token] {
                    if known.id == track.asset.id && known.scale != track.asset.scale {
                        return Err(EconomicError::InvalidConfig(format!(
                            "track {} declares {} with {} decimals, asset uses {}",
                            track.track,
                            track.asset.id,
                            track.asset.scale.decimals(),
                            known.scale.decimals()
                        )));
                    }
                }
            }
            Ok(())
        }
    }

    impl Default for EconomicsConfig {
        fn default() -> Self {
            EconomicsConfig::reference()
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CampusEconomics {
        pub config: EconomicsConfig,
        /// Every account balance, including pool custody accounts
        pub balances: BalanceBook,
        pub allowances: AllowanceLedger,
        pub exchange: ReserveExchange,
        pub pools: BTreeMap<TrackId, StakingPool>,
        pub catalog: CourseCatalog,
    }

    impl CampusEconomics {
        /// Initialize the reference deployment with empty reserves
        pub fn genesis() -> Self {
            let config = EconomicsConfig::reference();
            let rate = ExchangeRate {
                tokens_per_currency: config.tokens_per_currency,
                currency: config.currency.clone(),
                token: config.token.clone(),
            };
            Self::assemble(config, rate)
        }

        pub fn new(config: EconomicsConfig) -> Result<Self, EconomicError> {
            config.validate()?;
            let rate = ExchangeRate::new(config.tokens_per_currency, config.currency.clone(), config.token.clone())?;
            Ok(Self::assemble(config, rate))
        }

        fn assemble(config: EconomicsConfig, rate: ExchangeRate) -> Self {
            let exchange = ReserveExchange::new(config.exchange_id.clone(), config.operator.clone(), rate);
            let pools = config
                .tracks
                .iter()
                .map(|track| {
                    (
                        track.track.clone(),
                        StakingPool::new(track.clone(), config.operator.clone()),
                    )
                })
                .collect();
            let catalog = CourseCatalog::new(
                config.gate_id.clone(),
                config.operator.clone(),
                config.token.clone(),
                config.destination.clone(),
            );
            CampusEconomics {
                config,
                balances: BalanceBook::new(),
                allowances: AllowanceLedger::new(),
                exchange,
                pools,
                catalog,
            }
        }

        /// Seed `account` with newly issued `amount` of `asset` (genesis and test faucets)
        pub fn credit(&mut self, account: &AccountId, asset: &AssetId, amount: FixedPointAmount) -> Result<(), LedgerError> {
            let spec = self
                .config
                .asset_spec(asset)
                .ok_or_else(|| LedgerError::NotFound(format!("asset {}", asset)))?;
            let raw = amount.expect_scale(spec.scale)?.raw();
            self.balances.mint(account, asset, raw)
        }

        pub fn pool(&self, track: &TrackId) -> Result<&StakingPool, LedgerError> {
            self.pools
                .get(track)
                .ok_or_else(|| LedgerError::NotFound(format!("staking track {}", track)))
        }

        pub fn balance(&self, account: &AccountId, asset: &AssetId) -> u128 {
            self.balances.balance(account, asset)
        }

        pub fn allowance(&self, owner: &AccountId, spender: &AccountId, asset: &AssetId) -> u128 {
            self.allowances.allowance(owner, spender, asset)
        }

        pub fn reserves(&self) -> ReservePool {
            self.exchange.reserves()
        }

        /// Execute `action` on behalf of `actor` at unix time `now`.
        ///
        /// A failed action leaves the state untouched.
        pub fn apply(&mut self, actor: &AccountId, action: &LedgerAction, now: u64) -> Result<ActionOutcome, LedgerError> {
            let outcome = match action {
                LedgerAction::Approve { spender, asset, amount } => {
                    let spec = self
                        .config
                        .asset_spec(asset)
                        .ok_or_else(|| LedgerError::NotFound(format!("asset {}", asset)))?;
                    let raw = amount.expect_scale(spec.scale)?.raw();
                    self.allowances.approve(actor, spender, asset, raw);
                    ActionOutcome::Approved {
                        owner: actor.clone(),
                        spender: spender.clone(),
                        asset: asset.clone(),
                        amount: raw,
                    }
                }
                LedgerAction::Buy { currency_amount } => {
                    ActionOutcome::Swapped(self.exchange.buy(&mut self.balances, actor, *currency_amount)?)
                }
                LedgerAction::Sell { token_amount } => ActionOutcome::Swapped(self.exchange.sell(
                    &mut self.balances,
                    &mut self.allowances,
                    actor,
                    *token_amount,
                )?),
                LedgerAction::Stake { track, amount } => {
                    let record = pool_mut(&mut self.pools, track)?.stake(
                        &mut self.balances,
                        &mut self.allowances,
                        actor,
                        *amount,
                        now,
                    )?;
                    ActionOutcome::Staked { track: track.clone(), record }
                }
                LedgerAction::Withdraw { track, amount } => {
                    let record = pool_mut(&mut self.pools, track)?.withdraw(&mut self.balances, actor, *amount)?;
                    ActionOutcome::Withdrawn {
                        track: track.clone(),
                        amount: amount.raw(),
                        record,
                    }
                }
                LedgerAction::ClaimRewards { track } => {
                    let amount = pool_mut(&mut self.pools, track)?.claim_rewards(&mut self.balances, actor)?;
                    ActionOutcome::RewardsClaimed { track: track.clone(), amount }
                }
                LedgerAction::Purchase { course_id } => {
                    let course = self
                        .catalog
                        .purchase(&mut self.balances, &mut self.allowances, actor, course_id)?;
                    ActionOutcome::Purchased {
                        buyer: actor.clone(),
                        course_id: course.id,
                        price: course.price,
                    }
                }
                LedgerAction::CreateCourse { course_id, title, description, price } => ActionOutcome::CourseCreated(
                    self.catalog
                        .create_course(actor, course_id.clone(), title, description, *price, now)?,
                ),
                LedgerAction::MintTokenReserve { amount } => ActionOutcome::ReservesUpdated(
                    self.exchange.mint_token_reserve(&mut self.balances, actor, *amount)?,
                ),
                LedgerAction::AddCurrencyReserve { amount } => ActionOutcome::ReservesUpdated(
                    self.exchange.add_currency_reserve(&mut self.balances, actor, *amount)?,
                ),
                LedgerAction::SetPaused { track, paused } => {
                    pool_mut(&mut self.pools, track)?.set_paused(actor, *paused)?;
                    ActionOutcome::PauseChanged { track: track.clone(), paused: *paused }
                }
                LedgerAction::SetCourseActive { course_id, active } => {
                    self.catalog.set_course_active(actor, course_id, *active)?;
                    ActionOutcome::CourseActivationChanged {
                        course_id: course_id.clone(),
                        active: *active,
                    }
                }
                LedgerAction::AccrueYield { track, amount } => {
                    let distributed = pool_mut(&mut self.pools, track)?.accrue_yield(&mut self.balances, actor, *amount)?;
                    ActionOutcome::YieldAccrued { track: track.clone(), distributed }
                }
                LedgerAction::SetApy { track, apy_bps } => {
                    pool_mut(&mut self.pools, track)?.set_apy(actor, *apy_bps)?;
                    ActionOutcome::ApyUpdated { track: track.clone(), apy_bps: *apy_bps }
                }
            };
            log::info!("{} applied {}", actor, action.name());
            Ok(outcome)
        }

        /// Verify conservation and solvency across every component
        pub fn verify_invariants(&self) -> Result<(), EconomicError> {
            let reserves = self.exchange.reserves();
            let assets: BTreeSet<&AssetId> = self.balances.assets().collect();
            for asset in assets {
                let mut held = self.balances.holdings(asset);
                if asset == &self.config.currency.id {
                    held = held.saturating_add(reserves.currency_reserve);
                }
                if asset == &self.config.token.id {
                    held = held.saturating_add(reserves.token_reserve);
                }
                let supply = self.balances.supply(asset);
                if held != supply {
                    return Err(EconomicError::ConservationViolation {
                        asset: asset.clone(),
                        supply,
                        held,
                    });
                }
            }

            for (track, pool) in &self.pools {
                let custody = self.balances.balance(&pool.config.pool_id, &pool.config.asset.id);
                let stats = pool.stats();
                let owed = stats.total_receipt_tokens.saturating_add(pool.unallocated_yield());
                if custody < owed {
                    return Err(EconomicError::PoolInsolvent {
                        track: track.clone(),
                        custody,
                        owed,
                    });
                }
                if pool.records().any(|(_, record)| record.receipt_token_balance < record.staked_amount) {
                    return Err(EconomicError::ReceiptBelowStake(track.clone()));
                }
            }
            Ok(())
        }

        /// Compute hash commitment over the full ledger state
        pub fn compute_hash(&self) -> Result<Vec<u8>, EconomicError> {
            let encoded = self.encode()?;
            let mut hasher = Sha256::new();
            hasher.update(&encoded);
            Ok(hasher.finalize().to_vec())
        }

        pub fn state_hash(&self) -> Result<String, EconomicError> {
            Ok(hex::encode(self.compute_hash()?))
        }

        pub fn encode(&self) -> Result<Vec<u8>, EconomicError> {
            bincode::serialize(self).map_err(|e| EconomicError::Encoding(e.to_string()))
        }

        pub fn decode(bytes: &[u8]) -> Result<Self, EconomicError> {
            bincode::deserialize(bytes).map_err(|e| EconomicError::Encoding(e.to_string()))
        }
    }

    fn pool_mut<'a>(pools: &'a mut BTreeMap<TrackId, StakingPool>, track: &TrackId) -> Result<&'a mut StakingPool, LedgerError> {
        pools
            .get_mut(track)
            .ok_or_else(|| LedgerError::NotFound(format!("staking track {}", track)))
    }

    #[derive(Debug, thiserror::Error, Clone, PartialEq)]
    pub enum EconomicError {
        #[error("Ledger error: {0}")]
        Ledger(#[from] LedgerError),
        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),
        #[error("Conservation violated for {asset}: supply {supply}, held {held}")]
        ConservationViolation { asset: AssetId, supply: u128, held: u128 },
        #[error("Staking pool {track} holds {custody} but owes {owed}")]
        PoolInsolvent { track: TrackId, custody: u128, owed: u128 },
        #[error("Receipt balance below staked amount on track {0}")]
        ReceiptBelowStake(TrackId),
        #[error("State encoding failed: {0}")]
        Encoding(String),
    }
}
