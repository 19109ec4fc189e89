use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{AccountStore, CreditLedger, FeedbackStore, PendingStateStore, StoreError};
use crate::domain::{accounts, credits, feedback, pending_states, recommendations};
use crate::models::{
    Account, AccountId, CreditTransaction, FeedbackItem, FeedbackKey, FeedbackStatus,
    LedgerEntry, NewFeedbackItem, RecommendationHint, TenantId, TransactionKind,
};

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FeedbackStore for PgStore {
    async fn feedback_exists(&self, key: &FeedbackKey) -> Result<bool, StoreError> {
        Ok(feedback::feedback_exists(&self.db, key).await?)
    }

    async fn insert_feedback(&self, item: &NewFeedbackItem) -> Result<Option<i64>, StoreError> {
        Ok(feedback::insert_feedback(&self.db, item).await?)
    }

    async fn get_feedback(
        &self,
        tenant_id: TenantId,
        id: i64,
    ) -> Result<Option<FeedbackItem>, StoreError> {
        feedback::get_feedback(&self.db, tenant_id, id).await
    }

    async fn list_feedback(
        &self,
        tenant_id: TenantId,
        status: Option<FeedbackStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FeedbackItem>, StoreError> {
        feedback::list_feedback(&self.db, tenant_id, status, limit, offset).await
    }

    async fn list_retry_candidates(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<FeedbackItem>, StoreError> {
        feedback::list_retry_candidates(&self.db, tenant_id).await
    }

    async fn mark_published(
        &self,
        id: i64,
        status: FeedbackStatus,
        text: &str,
        is_edited: bool,
    ) -> Result<(), StoreError> {
        Ok(feedback::mark_published(&self.db, id, status, text, is_edited).await?)
    }

    async fn claim_for_publish(
        &self,
        id: i64,
        allowed: &[FeedbackStatus],
        until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(feedback::claim_for_publish(&self.db, id, allowed, until).await?)
    }

    async fn release_claim(&self, id: i64) -> Result<(), StoreError> {
        Ok(feedback::release_claim(&self.db, id).await?)
    }

    async fn mark_answered_externally(
        &self,
        key: &FeedbackKey,
        answer: Option<&str>,
    ) -> Result<bool, StoreError> {
        Ok(feedback::mark_answered_externally(&self.db, key, answer).await?)
    }

    async fn archive_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(feedback::archive_stale(&self.db, cutoff).await?)
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn accounts_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<Account>, StoreError> {
        Ok(accounts::list_tenant_accounts(&self.db, tenant_id).await?)
    }

    async fn get_account(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        Ok(accounts::get_account(&self.db, tenant_id, account_id).await?)
    }

    async fn set_credential(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        credential: &str,
    ) -> Result<bool, StoreError> {
        Ok(accounts::set_credential(&self.db, tenant_id, account_id, credential).await?)
    }

    async fn credentialed_tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        Ok(accounts::list_credentialed_tenants(&self.db).await?)
    }

    async fn touch_last_sync(
        &self,
        tenant_id: TenantId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Ok(accounts::touch_last_sync(&self.db, tenant_id, at).await?)
    }

    async fn recommendation_hints(
        &self,
        account_id: AccountId,
        product_id: &str,
    ) -> Result<Vec<RecommendationHint>, StoreError> {
        Ok(recommendations::hints_for_product(&self.db, account_id, product_id).await?)
    }
}

#[async_trait]
impl CreditLedger for PgStore {
    async fn balance(&self, tenant_id: TenantId) -> Result<i64, StoreError> {
        Ok(credits::get_balance(&self.db, tenant_id).await?)
    }

    async fn spend(&self, entry: &LedgerEntry) -> Result<Option<i64>, StoreError> {
        credits::spend(&self.db, entry).await
    }

    async fn deposit(&self, entry: &LedgerEntry) -> Result<i64, StoreError> {
        credits::deposit(&self.db, entry).await
    }

    async fn transactions(
        &self,
        tenant_id: TenantId,
        kind: Option<TransactionKind>,
    ) -> Result<Vec<CreditTransaction>, StoreError> {
        credits::list_transactions(&self.db, tenant_id, kind).await
    }
}

#[async_trait]
impl PendingStateStore for PgStore {
    async fn put_state(
        &self,
        scope: &str,
        state: &str,
        payload: serde_json::Value,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Ok(pending_states::put_state(&self.db, scope, state, payload, expires_at).await?)
    }

    async fn take_state(
        &self,
        scope: &str,
        state: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(pending_states::take_state(&self.db, scope, state, now).await?)
    }

    async fn purge_expired_states(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(pending_states::purge_expired(&self.db, now).await?)
    }
}
