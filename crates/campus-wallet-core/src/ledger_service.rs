//! The external ledger of record, seen from the client.
//!
//! Reads may lag writes; a submitted action resolves asynchronously through
//! its [`ActionHandle`].

use async_trait::async_trait;
use campus_economics::{
    AccountId, AssetId, CourseId, CourseRecord, LedgerAction, ReservePool, StakeRecord, StakingPoolStats, TrackId,
};

#[cfg(test)]
use mockall::automock;

use crate::errors::LedgerServiceError;
use crate::history::{BlockRange, ExchangeEvent, ExchangeEventKind};
use crate::lifecycle::ActionHandle;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerService: Send + Sync {
    async fn read_balance(&self, owner: &AccountId, asset: &AssetId) -> Result<u128, LedgerServiceError>;

    async fn read_allowance(
        &self,
        owner: &AccountId,
        spender: &AccountId,
        asset: &AssetId,
    ) -> Result<u128, LedgerServiceError>;

    async fn read_reserves(&self) -> Result<ReservePool, LedgerServiceError>;

    async fn read_stake_record(&self, owner: &AccountId, track: &TrackId) -> Result<StakeRecord, LedgerServiceError>;

    async fn read_pool_stats(&self, track: &TrackId) -> Result<StakingPoolStats, LedgerServiceError>;

    async fn read_paused(&self, track: &TrackId) -> Result<bool, LedgerServiceError>;

    async fn read_course(&self, course_id: &CourseId) -> Result<Option<CourseRecord>, LedgerServiceError>;

    async fn read_course_ids(&self) -> Result<Vec<CourseId>, LedgerServiceError>;

    async fn read_purchased_courses(&self, user: &AccountId) -> Result<Vec<CourseId>, LedgerServiceError>;

    async fn latest_block(&self) -> Result<u64, LedgerServiceError>;

    /// Hand `action` to the ledger on behalf of `actor`
    async fn submit(&self, actor: &AccountId, action: LedgerAction) -> Result<ActionHandle, LedgerServiceError>;

    async fn query_history(
        &self,
        owner: &AccountId,
        kinds: &[ExchangeEventKind],
        range: BlockRange,
    ) -> Result<Vec<ExchangeEvent>, LedgerServiceError>;
}
