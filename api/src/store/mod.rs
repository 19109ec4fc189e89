//! Storage seam for the sync pipeline.
//!
//! The pipeline only talks to these traits. `PgStore` backs them with the
//! executor-generic queries in `crate::domain`; tests use the in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    Account, AccountId, CreditTransaction, FeedbackItem, FeedbackKey, FeedbackStatus,
    LedgerEntry, NewFeedbackItem, RecommendationHint, TenantId, TransactionKind,
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("invalid ledger amount {0}; amounts must be positive")]
    InvalidAmount(i64),
}

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn feedback_exists(&self, key: &FeedbackKey) -> Result<bool, StoreError>;

    /// Inserts a new item. Returns `None` when the dedup key already exists.
    async fn insert_feedback(&self, item: &NewFeedbackItem) -> Result<Option<i64>, StoreError>;

    async fn get_feedback(
        &self,
        tenant_id: TenantId,
        id: i64,
    ) -> Result<Option<FeedbackItem>, StoreError>;

    async fn list_feedback(
        &self,
        tenant_id: TenantId,
        status: Option<FeedbackStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FeedbackItem>, StoreError>;

    /// Pending items that already carry a draft, oldest first
    async fn list_retry_candidates(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<FeedbackItem>, StoreError>;

    /// Records a published response and drops the publish lease. Sets
    /// `draft_text` too, so a manual edit is kept as the current draft.
    async fn mark_published(
        &self,
        id: i64,
        status: FeedbackStatus,
        text: &str,
        is_edited: bool,
    ) -> Result<(), StoreError>;

    /// Publish lease on a stored item. Returns false when the item is not in
    /// one of `allowed` or another publisher holds a lease that has not expired.
    async fn claim_for_publish(
        &self,
        id: i64,
        allowed: &[FeedbackStatus],
        until: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn release_claim(&self, id: i64) -> Result<(), StoreError>;

    /// Moves a still-pending item to `answered_externally`. Returns false when
    /// the item is unknown or no longer pending.
    async fn mark_answered_externally(
        &self,
        key: &FeedbackKey,
        answer: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Archives `auto`/`sent` items last updated before `cutoff`
    async fn archive_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn accounts_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<Account>, StoreError>;

    async fn get_account(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Result<Option<Account>, StoreError>;

    async fn set_credential(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        credential: &str,
    ) -> Result<bool, StoreError>;

    /// Tenants with at least one account holding a credential
    async fn credentialed_tenants(&self) -> Result<Vec<TenantId>, StoreError>;

    async fn touch_last_sync(&self, tenant_id: TenantId, at: DateTime<Utc>)
    -> Result<(), StoreError>;

    async fn recommendation_hints(
        &self,
        account_id: AccountId,
        product_id: &str,
    ) -> Result<Vec<RecommendationHint>, StoreError>;
}

#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn balance(&self, tenant_id: TenantId) -> Result<i64, StoreError>;

    /// Atomic conditional decrement plus its transaction row. Returns the new
    /// balance, or `None` without any mutation when the balance is too low.
    async fn spend(&self, entry: &LedgerEntry) -> Result<Option<i64>, StoreError>;

    /// Increment plus its transaction row (top-ups and refunds)
    async fn deposit(&self, entry: &LedgerEntry) -> Result<i64, StoreError>;

    async fn transactions(
        &self,
        tenant_id: TenantId,
        kind: Option<TransactionKind>,
    ) -> Result<Vec<CreditTransaction>, StoreError>;
}

/// Durable short-lived handshake state, keyed by scope and state name
#[async_trait]
pub trait PendingStateStore: Send + Sync {
    async fn put_state(
        &self,
        scope: &str,
        state: &str,
        payload: serde_json::Value,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Removes and returns the record if it exists and has not expired
    async fn take_state(
        &self,
        scope: &str,
        state: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<serde_json::Value>, StoreError>;

    async fn purge_expired_states(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

pub trait Store: FeedbackStore + AccountStore + CreditLedger + PendingStateStore {}

impl<T> Store for T where T: FeedbackStore + AccountStore + CreditLedger + PendingStateStore {}
