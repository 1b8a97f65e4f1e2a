//! CAMPUS CLIENT
//!
//! Every mutating call runs the same pipeline:
//! 1. take the in-flight lock for the action (`ActionInFlight` if held)
//! 2. re-validate preconditions against fresh ledger reads, in the ledger's order
//! 3. submit and wait for a terminal status, bounded by the confirmation timeout
//! 4. on confirmation, schedule the delayed refresh of dependent state
//!
//! The client never edits cached balances or allowances itself.

use campus_economics::integration::EconomicsConfig;
use campus_economics::{
    generate_course_id, reserve_warnings, AccountId, ActionOutcome, AssetId, AssetSpec, CourseId, CourseRecord,
    ExchangeRate, FixedPointAmount, LedgerAction, LedgerError, ReservePool, ReserveWarning, StakeRecord,
    StakingPoolConfig, StakingPoolStats, TrackId,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::errors::{ActionFailure, ConfigError};
use crate::history::{ExchangeHistory, HistoryPage};
use crate::ledger_service::LedgerService;
use crate::lifecycle::ConfirmedAction;
use crate::refresh::RefreshScheduler;
use crate::session::{OperatorCapability, SessionContext};
use crate::snapshot::{Snapshot, StateKey};

/// What stands between the user and a spender-initiated action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStatus {
    pub needs_approval: bool,
    pub has_balance: bool,
    pub is_ready: bool,
    pub current_allowance: u128,
    pub current_balance: u128,
    /// Additional allowance required, zero when none is needed
    pub required_approval: u128,
}

impl ApprovalStatus {
    pub fn evaluate(amount: u128, allowance: u128, balance: u128) -> Self {
        let needs_approval = amount > 0 && amount > allowance;
        let has_balance = amount > 0 && amount <= balance;
        ApprovalStatus {
            needs_approval,
            has_balance,
            is_ready: has_balance && !needs_approval,
            current_allowance: allowance,
            current_balance: balance,
            required_approval: if needs_approval { amount - allowance } else { 0 },
        }
    }
}

pub struct CampusClient {
    ledger: Arc<dyn LedgerService>,
    session: Arc<SessionContext>,
    config: ClientConfig,
    economics: EconomicsConfig,
    rate: ExchangeRate,
    refresh: RefreshScheduler,
    history: ExchangeHistory,
}

fn mismatch(key: &StateKey) -> ActionFailure {
    ActionFailure::new(
        campus_economics::ErrorKind::LedgerRejected,
        format!("ledger returned an unexpected value for {:?}", key),
    )
}

fn positive(amount: FixedPointAmount, spec: &AssetSpec, what: &str) -> Result<u128, ActionFailure> {
    let raw = amount.expect_scale(spec.scale)?.raw();
    if raw == 0 {
        return Err(ActionFailure::validation(format!("{} amount must be positive", what)));
    }
    Ok(raw)
}

impl CampusClient {
    pub fn new(ledger: Arc<dyn LedgerService>, actor: AccountId, config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let economics = config.economics_config()?;
        let rate = config.exchange_rate()?;
        let session = Arc::new(SessionContext::new(actor, &economics.operator, config.staleness()));
        let refresh = RefreshScheduler::new(ledger.clone(), session.cache().clone(), config.refresh_grace());
        let history = ExchangeHistory::new(
            ledger.clone(),
            config.history.window_blocks,
            config.history.max_lookback_blocks,
        );
        Ok(CampusClient {
            ledger,
            session,
            config,
            economics,
            rate,
            refresh,
            history,
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn actor(&self) -> &AccountId {
        self.session.actor()
    }

    pub fn operator_capability(&self) -> Option<&OperatorCapability> {
        self.session.operator_capability()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn rate(&self) -> &ExchangeRate {
        &self.rate
    }

    pub fn refresh_scheduler(&self) -> &RefreshScheduler {
        &self.refresh
    }

    pub fn currency(&self) -> &AssetSpec {
        &self.economics.currency
    }

    pub fn token(&self) -> &AssetSpec {
        &self.economics.token
    }

    pub fn track(&self, track: &TrackId) -> Result<&StakingPoolConfig, ActionFailure> {
        self.economics
            .tracks
            .iter()
            .find(|t| &t.track == track)
            .ok_or_else(|| LedgerError::NotFound(format!("staking track {}", track)).into())
    }

    fn asset_spec(&self, asset: &AssetId) -> Result<&AssetSpec, ActionFailure> {
        self.economics
            .asset_spec(asset)
            .ok_or_else(|| LedgerError::NotFound(format!("asset {}", asset)).into())
    }

    // --- Quotes ---

    pub fn quote_buy(&self, currency_amount: FixedPointAmount) -> Result<FixedPointAmount, ActionFailure> {
        Ok(self.rate.quote_buy(currency_amount)?)
    }

    pub fn quote_sell(&self, token_amount: FixedPointAmount) -> Result<FixedPointAmount, ActionFailure> {
        Ok(self.rate.quote_sell(token_amount)?)
    }

    // --- Reads (served from the snapshot cache inside the staleness window) ---

    async fn load(&self, key: &StateKey, fresh: bool) -> Result<Snapshot, ActionFailure> {
        let cache = self.session.cache();
        let value = if fresh {
            cache.refetch(self.ledger.as_ref(), key).await?
        } else {
            cache.read(self.ledger.as_ref(), key).await?
        };
        Ok(value)
    }

    async fn amount(&self, key: StateKey, fresh: bool) -> Result<u128, ActionFailure> {
        self.load(&key, fresh).await?.amount().ok_or_else(|| mismatch(&key))
    }

    async fn reserves_at(&self, fresh: bool) -> Result<ReservePool, ActionFailure> {
        let key = StateKey::Reserves;
        self.load(&key, fresh).await?.reserves().ok_or_else(|| mismatch(&key))
    }

    async fn stake_at(&self, track: &TrackId, fresh: bool) -> Result<StakeRecord, ActionFailure> {
        let key = StateKey::StakeRecord {
            owner: self.actor().clone(),
            track: track.clone(),
        };
        self.load(&key, fresh).await?.stake().ok_or_else(|| mismatch(&key))
    }

    async fn paused_at(&self, track: &TrackId, fresh: bool) -> Result<bool, ActionFailure> {
        let key = StateKey::Paused(track.clone());
        self.load(&key, fresh).await?.flag().ok_or_else(|| mismatch(&key))
    }

    async fn purchased_at(&self, fresh: bool) -> Result<Vec<CourseId>, ActionFailure> {
        let key = StateKey::Purchases(self.actor().clone());
        self.load(&key, fresh).await?.courses().ok_or_else(|| mismatch(&key))
    }

    fn balance_key(&self, asset: &AssetId) -> StateKey {
        StateKey::Balance {
            owner: self.actor().clone(),
            asset: asset.clone(),
        }
    }

    fn allowance_key(&self, spender: &AccountId, asset: &AssetId) -> StateKey {
        StateKey::Allowance {
            owner: self.actor().clone(),
            spender: spender.clone(),
            asset: asset.clone(),
        }
    }

    pub async fn balance(&self, asset: &AssetId) -> Result<u128, ActionFailure> {
        self.amount(self.balance_key(asset), false).await
    }

    pub async fn allowance(&self, spender: &AccountId, asset: &AssetId) -> Result<u128, ActionFailure> {
        self.amount(self.allowance_key(spender, asset), false).await
    }

    pub async fn reserves(&self) -> Result<ReservePool, ActionFailure> {
        self.reserves_at(false).await
    }

    pub async fn stake_record(&self, track: &TrackId) -> Result<StakeRecord, ActionFailure> {
        self.stake_at(track, false).await
    }

    pub async fn pool_stats(&self, track: &TrackId) -> Result<StakingPoolStats, ActionFailure> {
        let key = StateKey::PoolStats(track.clone());
        self.load(&key, false).await?.stats().ok_or_else(|| mismatch(&key))
    }

    pub async fn is_paused(&self, track: &TrackId) -> Result<bool, ActionFailure> {
        self.paused_at(track, false).await
    }

    pub async fn course(&self, course_id: &CourseId) -> Result<Option<CourseRecord>, ActionFailure> {
        Ok(self.ledger.read_course(course_id).await?)
    }

    pub async fn all_course_ids(&self) -> Result<Vec<CourseId>, ActionFailure> {
        let key = StateKey::CourseIds;
        self.load(&key, false).await?.courses().ok_or_else(|| mismatch(&key))
    }

    pub async fn purchased_courses(&self) -> Result<Vec<CourseId>, ActionFailure> {
        self.purchased_at(false).await
    }

    pub async fn has_purchased(&self, course_id: &CourseId) -> Result<bool, ActionFailure> {
        Ok(self.purchased_at(false).await?.contains(course_id))
    }

    /// Reserve warnings for amounts the user is about to trade
    pub async fn reserve_warnings(
        &self,
        pending_buy: Option<FixedPointAmount>,
        pending_sell: Option<FixedPointAmount>,
    ) -> Result<Vec<ReserveWarning>, ActionFailure> {
        let pool = self.reserves().await?;
        Ok(reserve_warnings(&pool, &self.rate, pending_buy, pending_sell))
    }

    /// Fresh allowance and balance check for moving `amount` through `spender`
    pub async fn approval_status(
        &self,
        spender: &AccountId,
        asset: &AssetId,
        amount: FixedPointAmount,
    ) -> Result<ApprovalStatus, ActionFailure> {
        let spec = self.asset_spec(asset)?;
        let amount = amount.expect_scale(spec.scale)?.raw();
        let allowance = self.amount(self.allowance_key(spender, asset), true).await?;
        let balance = self.amount(self.balance_key(asset), true).await?;
        Ok(ApprovalStatus::evaluate(amount, allowance, balance))
    }

    pub async fn history(&self, cursor: Option<u64>) -> Result<HistoryPage, ActionFailure> {
        Ok(self.history.page(self.actor(), cursor).await?)
    }

    // --- Precondition helpers (always fresh) ---

    async fn require_balance(&self, asset: &AssetId, required: u128) -> Result<(), ActionFailure> {
        let available = self.amount(self.balance_key(asset), true).await?;
        if available < required {
            return Err(LedgerError::InsufficientBalance {
                account: self.actor().clone(),
                asset: asset.clone(),
                required,
                available,
            }
            .into());
        }
        Ok(())
    }

    async fn require_allowance(&self, spender: &AccountId, asset: &AssetId, required: u128) -> Result<(), ActionFailure> {
        let approved = self.amount(self.allowance_key(spender, asset), true).await?;
        if required > 0 && approved < required {
            return Err(LedgerError::NeedsApproval {
                owner: self.actor().clone(),
                spender: spender.clone(),
                asset: asset.clone(),
                required,
                approved,
            }
            .into());
        }
        Ok(())
    }

    async fn require_active(&self, track: &TrackId) -> Result<(), ActionFailure> {
        if self.paused_at(track, true).await? {
            return Err(LedgerError::PoolPaused(track.clone()).into());
        }
        Ok(())
    }

    fn require_operator(&self, capability: &OperatorCapability) -> Result<(), ActionFailure> {
        if capability.operator() != self.actor() {
            return Err(LedgerError::Unauthorized(format!(
                "capability for {} does not belong to {}",
                capability.operator(),
                self.actor()
            ))
            .into());
        }
        Ok(())
    }

    /// Lock, validate, submit, await, refresh
    async fn run<G>(&self, action: LedgerAction, gates: G) -> Result<ConfirmedAction, ActionFailure>
    where
        G: Future<Output = Result<Vec<StateKey>, ActionFailure>>,
    {
        let _guard = self.session.begin(&action)?;
        let actor = self.actor().clone();

        let refresh = match gates.await {
            Ok(keys) => keys,
            Err(failure) => {
                debug!(actor = %actor, action = action.name(), kind = ?failure.kind, reason = %failure.reason, "precondition failed");
                return Err(failure);
            }
        };

        let mut handle = match self.ledger.submit(&actor, action.clone()).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(actor = %actor, action = action.name(), error = %e, "submission failed");
                return Err(e.into());
            }
        };
        info!(actor = %actor, action = action.name(), id = %handle.id, "action submitted");

        match handle.wait_terminal(self.config.confirmation_timeout()).await {
            Ok(confirmed) => {
                info!(actor = %actor, action = action.name(), tx_ref = %confirmed.tx_ref, block = confirmed.block, "action confirmed");
                if let ActionOutcome::Purchased { course_id, .. } = &confirmed.outcome {
                    self.session.record_purchase(course_id);
                }
                self.refresh.schedule(refresh);
                Ok(confirmed)
            }
            Err(failure) => {
                warn!(actor = %actor, action = action.name(), kind = ?failure.kind, reason = %failure.reason, "action failed");
                Err(failure)
            }
        }
    }

    // --- Mutations ---

    /// Set the allowance for `spender`; replaces any earlier approval. Zero revokes.
    pub async fn approve(
        &self,
        spender: &AccountId,
        asset: &AssetId,
        amount: FixedPointAmount,
    ) -> Result<ConfirmedAction, ActionFailure> {
        let action = LedgerAction::Approve {
            spender: spender.clone(),
            asset: asset.clone(),
            amount,
        };
        let gates = async {
            let spec = self.asset_spec(asset)?;
            amount.expect_scale(spec.scale)?;
            Ok(vec![self.allowance_key(spender, asset)])
        };
        self.run(action, gates).await
    }

    pub async fn buy(&self, currency_amount: FixedPointAmount) -> Result<ConfirmedAction, ActionFailure> {
        let action = LedgerAction::Buy { currency_amount };
        let gates = async {
            let currency = self.currency().clone();
            let token = self.token().clone();
            let paid = positive(currency_amount, &currency, "buy")?;
            let tokens = self.rate.quote_buy(currency_amount)?.raw();
            if tokens == 0 {
                return Err(ActionFailure::validation(
                    "buy amount is below the smallest token unit at this rate",
                ));
            }
            self.require_balance(&currency.id, paid).await?;

            let pool = self.reserves_at(true).await?;
            if pool.token_reserve < tokens {
                return Err(LedgerError::ReserveInsufficient {
                    asset: token.id.clone(),
                    required: tokens,
                    available: pool.token_reserve,
                }
                .into());
            }
            Ok(vec![
                self.balance_key(&currency.id),
                self.balance_key(&token.id),
                StateKey::Reserves,
            ])
        };
        self.run(action, gates).await
    }

    /// Sell tokens back to the reserve. The operator sells without an allowance.
    pub async fn sell(&self, token_amount: FixedPointAmount) -> Result<ConfirmedAction, ActionFailure> {
        let action = LedgerAction::Sell { token_amount };
        let gates = async {
            let currency = self.currency().clone();
            let token = self.token().clone();
            let exchange = self.economics.exchange_id.clone();
            let sold = positive(token_amount, &token, "sell")?;
            let proceeds = self.rate.quote_sell(token_amount)?.raw();
            if proceeds == 0 {
                return Err(ActionFailure::validation(
                    "sell amount is below the smallest currency unit at this rate",
                ));
            }
            self.require_balance(&token.id, sold).await?;
            if self.operator_capability().is_none() {
                self.require_allowance(&exchange, &token.id, sold).await?;
            }

            let pool = self.reserves_at(true).await?;
            if pool.currency_reserve < proceeds {
                return Err(LedgerError::ReserveInsufficient {
                    asset: currency.id.clone(),
                    required: proceeds,
                    available: pool.currency_reserve,
                }
                .into());
            }
            Ok(vec![
                self.balance_key(&currency.id),
                self.balance_key(&token.id),
                self.allowance_key(&exchange, &token.id),
                StateKey::Reserves,
            ])
        };
        self.run(action, gates).await
    }

    fn staking_refresh(&self, track: &StakingPoolConfig) -> Vec<StateKey> {
        vec![
            self.balance_key(&track.asset.id),
            StateKey::StakeRecord {
                owner: self.actor().clone(),
                track: track.track.clone(),
            },
            StateKey::PoolStats(track.track.clone()),
        ]
    }

    /// Checks run in order: paused, amount, balance, allowance.
    pub async fn stake(&self, track: &TrackId, amount: FixedPointAmount) -> Result<ConfirmedAction, ActionFailure> {
        let action = LedgerAction::Stake {
            track: track.clone(),
            amount,
        };
        let gates = async {
            let pool = self.track(track)?.clone();
            self.require_active(track).await?;
            let raw = positive(amount, &pool.asset, "stake")?;
            self.require_balance(&pool.asset.id, raw).await?;
            self.require_allowance(&pool.pool_id, &pool.asset.id, raw).await?;

            let mut refresh = self.staking_refresh(&pool);
            refresh.push(self.allowance_key(&pool.pool_id, &pool.asset.id));
            Ok(refresh)
        };
        self.run(action, gates).await
    }

    pub async fn withdraw(&self, track: &TrackId, amount: FixedPointAmount) -> Result<ConfirmedAction, ActionFailure> {
        let action = LedgerAction::Withdraw {
            track: track.clone(),
            amount,
        };
        let gates = async {
            let pool = self.track(track)?.clone();
            self.require_active(track).await?;
            let raw = positive(amount, &pool.asset, "withdraw")?;
            let record = self.stake_at(track, true).await?;
            if raw > record.staked_amount {
                return Err(LedgerError::InsufficientBalance {
                    account: self.actor().clone(),
                    asset: pool.asset.id.clone(),
                    required: raw,
                    available: record.staked_amount,
                }
                .into());
            }
            Ok(self.staking_refresh(&pool))
        };
        self.run(action, gates).await
    }

    pub async fn claim_rewards(&self, track: &TrackId) -> Result<ConfirmedAction, ActionFailure> {
        let action = LedgerAction::ClaimRewards { track: track.clone() };
        let gates = async {
            let pool = self.track(track)?.clone();
            self.require_active(track).await?;
            let record = self.stake_at(track, true).await?;
            if record.available_rewards() == 0 {
                return Err(LedgerError::NoRewardsAvailable(track.clone()).into());
            }
            Ok(self.staking_refresh(&pool))
        };
        self.run(action, gates).await
    }

    /// Checks run in order: exists, not the creator, active, not owned, allowance, balance.
    pub async fn purchase(&self, course_id: &CourseId) -> Result<ConfirmedAction, ActionFailure> {
        let action = LedgerAction::Purchase {
            course_id: course_id.clone(),
        };
        let gates = async {
            let course = self
                .ledger
                .read_course(course_id)
                .await?
                .ok_or_else(|| ActionFailure::from(LedgerError::NotFound(format!("course {}", course_id))))?;
            if &course.creator == self.actor() {
                return Err(LedgerError::Unauthorized(format!(
                    "creator {} cannot purchase their own course",
                    self.actor()
                ))
                .into());
            }
            if !course.is_active {
                return Err(ActionFailure::validation(format!("course {} is not active", course_id)));
            }
            if self.purchased_at(true).await?.contains(course_id) {
                return Err(LedgerError::AlreadyPurchased {
                    course_id: course_id.to_string(),
                    buyer: self.actor().clone(),
                }
                .into());
            }
            let gate = self.economics.gate_id.clone();
            let token = self.token().id.clone();
            self.require_allowance(&gate, &token, course.price).await?;
            self.require_balance(&token, course.price).await?;
            Ok(vec![
                self.balance_key(&token),
                self.allowance_key(&gate, &token),
                StateKey::Purchases(self.actor().clone()),
            ])
        };
        self.run(action, gates).await
    }

    /// Publish a course. The id is derived from the creator, the clock and a random component.
    pub async fn create_course(
        &self,
        title: &str,
        description: &str,
        price: FixedPointAmount,
    ) -> Result<ConfirmedAction, ActionFailure> {
        let course_id = {
            let mut rng = rand::thread_rng();
            let now_millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
            generate_course_id(self.actor(), now_millis, &mut rng)
        };
        let action = LedgerAction::CreateCourse {
            course_id,
            title: title.trim().to_string(),
            description: description.trim().to_string(),
            price,
        };
        let gates = async {
            if title.trim().is_empty() {
                return Err(ActionFailure::validation("course title is required"));
            }
            if description.trim().is_empty() {
                return Err(ActionFailure::validation("course description is required"));
            }
            positive(price, self.token(), "price")?;
            Ok(vec![StateKey::CourseIds])
        };
        self.run(action, gates).await
    }

    /// Allowed for the course creator or the operator
    pub async fn set_course_active(&self, course_id: &CourseId, active: bool) -> Result<ConfirmedAction, ActionFailure> {
        let action = LedgerAction::SetCourseActive {
            course_id: course_id.clone(),
            active,
        };
        let gates = async {
            let course = self
                .ledger
                .read_course(course_id)
                .await?
                .ok_or_else(|| ActionFailure::from(LedgerError::NotFound(format!("course {}", course_id))))?;
            if &course.creator != self.actor() && self.operator_capability().is_none() {
                return Err(LedgerError::Unauthorized(format!(
                    "{} cannot change course {}",
                    self.actor(),
                    course_id
                ))
                .into());
            }
            Ok(Vec::new())
        };
        self.run(action, gates).await
    }

    // --- Operator actions ---

    pub async fn mint_token_reserve(
        &self,
        capability: &OperatorCapability,
        amount: FixedPointAmount,
    ) -> Result<ConfirmedAction, ActionFailure> {
        let action = LedgerAction::MintTokenReserve { amount };
        let gates = async {
            self.require_operator(capability)?;
            positive(amount, self.token(), "mint")?;
            Ok(vec![StateKey::Reserves])
        };
        self.run(action, gates).await
    }

    pub async fn add_currency_reserve(
        &self,
        capability: &OperatorCapability,
        amount: FixedPointAmount,
    ) -> Result<ConfirmedAction, ActionFailure> {
        let action = LedgerAction::AddCurrencyReserve { amount };
        let gates = async {
            self.require_operator(capability)?;
            let currency = self.currency().id.clone();
            let raw = positive(amount, self.currency(), "reserve")?;
            self.require_balance(&currency, raw).await?;
            Ok(vec![StateKey::Reserves, self.balance_key(&currency)])
        };
        self.run(action, gates).await
    }

    pub async fn set_paused(
        &self,
        capability: &OperatorCapability,
        track: &TrackId,
        paused: bool,
    ) -> Result<ConfirmedAction, ActionFailure> {
        let action = LedgerAction::SetPaused {
            track: track.clone(),
            paused,
        };
        let gates = async {
            self.require_operator(capability)?;
            self.track(track)?;
            Ok(vec![StateKey::Paused(track.clone())])
        };
        self.run(action, gates).await
    }

    /// Report yield from the external source into `track`
    pub async fn accrue_yield(
        &self,
        capability: &OperatorCapability,
        track: &TrackId,
        amount: FixedPointAmount,
    ) -> Result<ConfirmedAction, ActionFailure> {
        let action = LedgerAction::AccrueYield {
            track: track.clone(),
            amount,
        };
        let gates = async {
            self.require_operator(capability)?;
            let pool = self.track(track)?;
            positive(amount, &pool.asset, "yield")?;
            Ok(vec![StateKey::PoolStats(track.clone())])
        };
        self.run(action, gates).await
    }

    pub async fn set_apy(
        &self,
        capability: &OperatorCapability,
        track: &TrackId,
        apy_bps: u32,
    ) -> Result<ConfirmedAction, ActionFailure> {
        let action = LedgerAction::SetApy {
            track: track.clone(),
            apy_bps,
        };
        let gates = async {
            self.require_operator(capability)?;
            self.track(track)?;
            Ok(vec![StateKey::PoolStats(track.clone())])
        };
        self.run(action, gates).await
    }
}
