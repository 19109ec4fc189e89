//! In-memory store for tests. Every operation runs under one lock, which
//! gives the same atomicity the Postgres statements provide.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{AccountStore, CreditLedger, FeedbackStore, PendingStateStore, StoreError};
use crate::models::{
    Account, AccountId, CreditTransaction, FeedbackItem, FeedbackKey, FeedbackStatus,
    LedgerEntry, NewFeedbackItem, RecommendationHint, TenantId, TransactionKind,
};

impl FeedbackItem {
    fn key(&self) -> FeedbackKey {
        FeedbackKey {
            external_id: self.external_id.clone(),
            tenant_id: self.tenant_id,
            account_id: self.account_id,
        }
    }
}

impl NewFeedbackItem {
    fn key(&self) -> FeedbackKey {
        FeedbackKey {
            external_id: self.external_id.clone(),
            tenant_id: self.tenant_id,
            account_id: self.account_id,
        }
    }
}

#[derive(Default)]
struct Inner {
    accounts: Vec<Account>,
    last_sync: HashMap<TenantId, DateTime<Utc>>,
    feedback: Vec<FeedbackItem>,
    balances: HashMap<TenantId, i64>,
    transactions: Vec<CreditTransaction>,
    hints: HashMap<(AccountId, String), Vec<RecommendationHint>>,
    states: HashMap<(String, String), (serde_json::Value, DateTime<Utc>)>,
    claims: HashMap<i64, DateTime<Utc>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_account(&self, account: Account) {
        self.lock().accounts.push(account);
    }

    pub fn add_hint(&self, account_id: AccountId, product_id: &str, hint: RecommendationHint) {
        self.lock()
            .hints
            .entry((account_id, product_id.to_string()))
            .or_default()
            .push(hint);
    }

    pub fn all_feedback(&self, tenant_id: TenantId) -> Vec<FeedbackItem> {
        self.lock()
            .feedback
            .iter()
            .filter(|f| f.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    pub fn find_feedback(&self, tenant_id: TenantId, external_id: &str) -> Option<FeedbackItem> {
        self.lock()
            .feedback
            .iter()
            .find(|f| f.tenant_id == tenant_id && f.external_id == external_id)
            .cloned()
    }

    pub fn last_sync(&self, tenant_id: TenantId) -> Option<DateTime<Utc>> {
        self.lock().last_sync.get(&tenant_id).copied()
    }

    pub fn set_updated_at(&self, id: i64, at: DateTime<Utc>) {
        if let Some(item) = self.lock().feedback.iter_mut().find(|f| f.id == id) {
            item.updated_at = at;
        }
    }

    /// Sum of all transaction amounts; equals the balance when the ledger is consistent
    pub fn transaction_sum(&self, tenant_id: TenantId) -> i64 {
        self.lock()
            .transactions
            .iter()
            .filter(|t| t.tenant_id == tenant_id)
            .map(|t| t.amount)
            .sum()
    }

    fn record(inner: &mut Inner, entry: &LedgerEntry, signed_amount: i64) {
        let id = inner.transactions.len() as i64 + 1;
        inner.transactions.push(CreditTransaction {
            id,
            tenant_id: entry.tenant_id,
            amount: signed_amount,
            kind: entry.kind,
            description: entry.description.clone(),
            feedback_id: entry.feedback_id,
            created_at: Utc::now(),
        });
    }
}

#[async_trait]
impl FeedbackStore for MemoryStore {
    async fn feedback_exists(&self, key: &FeedbackKey) -> Result<bool, StoreError> {
        Ok(self.lock().feedback.iter().any(|f| &f.key() == key))
    }

    async fn insert_feedback(&self, item: &NewFeedbackItem) -> Result<Option<i64>, StoreError> {
        let mut inner = self.lock();
        let key = item.key();
        if inner.feedback.iter().any(|f| f.key() == key) {
            return Ok(None);
        }

        let id = inner.feedback.len() as i64 + 1;
        inner.feedback.push(FeedbackItem {
            id,
            external_id: item.external_id.clone(),
            tenant_id: item.tenant_id,
            account_id: item.account_id,
            rating: item.rating,
            author_name: item.author_name.clone(),
            body_text: item.body_text.clone(),
            pros_text: item.pros_text.clone(),
            cons_text: item.cons_text.clone(),
            attachments: item.attachments.clone(),
            brand_name: item.brand_name.clone(),
            product_id: item.product_id.clone(),
            product_name: item.product_name.clone(),
            status: item.status,
            draft_text: item.draft_text.clone(),
            published_text: item.published_text.clone(),
            is_edited: false,
            created_at: item.created_at,
            fetched_at: item.fetched_at,
            updated_at: Utc::now(),
        });
        Ok(Some(id))
    }

    async fn get_feedback(
        &self,
        tenant_id: TenantId,
        id: i64,
    ) -> Result<Option<FeedbackItem>, StoreError> {
        Ok(self
            .lock()
            .feedback
            .iter()
            .find(|f| f.id == id && f.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_feedback(
        &self,
        tenant_id: TenantId,
        status: Option<FeedbackStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FeedbackItem>, StoreError> {
        let mut items: Vec<FeedbackItem> = self
            .lock()
            .feedback
            .iter()
            .filter(|f| f.tenant_id == tenant_id && status.is_none_or(|s| f.status == s))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(items
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_retry_candidates(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<FeedbackItem>, StoreError> {
        let mut items: Vec<FeedbackItem> = self
            .lock()
            .feedback
            .iter()
            .filter(|f| {
                f.tenant_id == tenant_id
                    && f.status == FeedbackStatus::Pending
                    && f.draft_text.is_some()
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn claim_for_publish(
        &self,
        id: i64,
        allowed: &[FeedbackStatus],
        until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let claimable = inner
            .feedback
            .iter()
            .any(|f| f.id == id && allowed.contains(&f.status));
        let held = inner.claims.get(&id).is_some_and(|t| *t >= Utc::now());
        if !claimable || held {
            return Ok(false);
        }
        inner.claims.insert(id, until);
        Ok(true)
    }

    async fn release_claim(&self, id: i64) -> Result<(), StoreError> {
        self.lock().claims.remove(&id);
        Ok(())
    }

    async fn mark_published(
        &self,
        id: i64,
        status: FeedbackStatus,
        text: &str,
        is_edited: bool,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.claims.remove(&id);
        if let Some(item) = inner.feedback.iter_mut().find(|f| f.id == id) {
            item.status = status;
            item.published_text = Some(text.to_string());
            item.draft_text = Some(text.to_string());
            item.is_edited |= is_edited;
            item.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_answered_externally(
        &self,
        key: &FeedbackKey,
        answer: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(item) = inner
            .feedback
            .iter_mut()
            .find(|f| &f.key() == key && f.status == FeedbackStatus::Pending)
        else {
            return Ok(false);
        };

        item.status = FeedbackStatus::AnsweredExternally;
        if let Some(answer) = answer {
            item.published_text = Some(answer.to_string());
        }
        item.updated_at = Utc::now();
        Ok(true)
    }

    async fn archive_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut archived = 0;
        for item in self.lock().feedback.iter_mut() {
            if matches!(item.status, FeedbackStatus::Auto | FeedbackStatus::Sent)
                && item.updated_at < cutoff
            {
                item.status = FeedbackStatus::Archived;
                item.updated_at = Utc::now();
                archived += 1;
            }
        }
        Ok(archived)
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn accounts_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<Account>, StoreError> {
        Ok(self
            .lock()
            .accounts
            .iter()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn get_account(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self
            .lock()
            .accounts
            .iter()
            .find(|a| a.id == account_id && a.tenant_id == tenant_id)
            .cloned())
    }

    async fn set_credential(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        credential: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        match inner
            .accounts
            .iter_mut()
            .find(|a| a.id == account_id && a.tenant_id == tenant_id)
        {
            Some(account) => {
                account.credential = Some(credential.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn credentialed_tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        let mut tenants: Vec<TenantId> = self
            .lock()
            .accounts
            .iter()
            .filter(|a| a.active_credential().is_some())
            .map(|a| a.tenant_id)
            .collect();
        tenants.sort_unstable();
        tenants.dedup();
        Ok(tenants)
    }

    async fn touch_last_sync(
        &self,
        tenant_id: TenantId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.lock().last_sync.insert(tenant_id, at);
        Ok(())
    }

    async fn recommendation_hints(
        &self,
        account_id: AccountId,
        product_id: &str,
    ) -> Result<Vec<RecommendationHint>, StoreError> {
        Ok(self
            .lock()
            .hints
            .get(&(account_id, product_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl CreditLedger for MemoryStore {
    async fn balance(&self, tenant_id: TenantId) -> Result<i64, StoreError> {
        Ok(self.lock().balances.get(&tenant_id).copied().unwrap_or(0))
    }

    async fn spend(&self, entry: &LedgerEntry) -> Result<Option<i64>, StoreError> {
        if entry.amount <= 0 {
            return Err(StoreError::InvalidAmount(entry.amount));
        }

        let mut inner = self.lock();
        let balance = inner.balances.get(&entry.tenant_id).copied().unwrap_or(0);
        if balance < entry.amount {
            return Ok(None);
        }

        let new_balance = balance - entry.amount;
        inner.balances.insert(entry.tenant_id, new_balance);
        Self::record(&mut inner, entry, -entry.amount);
        Ok(Some(new_balance))
    }

    async fn deposit(&self, entry: &LedgerEntry) -> Result<i64, StoreError> {
        if entry.amount <= 0 {
            return Err(StoreError::InvalidAmount(entry.amount));
        }

        let mut inner = self.lock();
        let new_balance = inner.balances.get(&entry.tenant_id).copied().unwrap_or(0) + entry.amount;
        inner.balances.insert(entry.tenant_id, new_balance);
        Self::record(&mut inner, entry, entry.amount);
        Ok(new_balance)
    }

    async fn transactions(
        &self,
        tenant_id: TenantId,
        kind: Option<TransactionKind>,
    ) -> Result<Vec<CreditTransaction>, StoreError> {
        Ok(self
            .lock()
            .transactions
            .iter()
            .rev()
            .filter(|t| t.tenant_id == tenant_id && kind.is_none_or(|k| t.kind == k))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PendingStateStore for MemoryStore {
    async fn put_state(
        &self,
        scope: &str,
        state: &str,
        payload: serde_json::Value,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.lock()
            .states
            .insert((scope.to_string(), state.to_string()), (payload, expires_at));
        Ok(())
    }

    async fn take_state(
        &self,
        scope: &str,
        state: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let mut inner = self.lock();
        let key = (scope.to_string(), state.to_string());
        match inner.states.get(&key) {
            Some((_, expires_at)) if *expires_at > now => {
                Ok(inner.states.remove(&key).map(|(payload, _)| payload))
            }
            _ => Ok(None),
        }
    }

    async fn purge_expired_states(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let before = inner.states.len();
        inner.states.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - inner.states.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn entry(tenant_id: TenantId, amount: i64, kind: TransactionKind) -> LedgerEntry {
        LedgerEntry {
            tenant_id,
            amount,
            kind,
            description: "test".to_string(),
            feedback_id: None,
        }
    }

    #[tokio::test]
    async fn test_spend_refuses_without_mutation_when_balance_short() {
        let store = MemoryStore::new();
        store.deposit(&entry(1, 1, TransactionKind::TopUp)).await.unwrap();

        let result = store.spend(&entry(1, 2, TransactionKind::AutoReply)).await.unwrap();
        assert_eq!(result, None);
        assert_eq!(store.balance(1).await.unwrap(), 1);
        assert_eq!(store.transactions(1, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ledger_sum_matches_balance_after_mixed_operations() {
        let store = MemoryStore::new();
        store.deposit(&entry(7, 5, TransactionKind::TopUp)).await.unwrap();
        for _ in 0..3 {
            store.spend(&entry(7, 1, TransactionKind::AutoReply)).await.unwrap();
        }
        store.deposit(&entry(7, 1, TransactionKind::Refund)).await.unwrap();
        for _ in 0..5 {
            store.spend(&entry(7, 1, TransactionKind::ManualReply)).await.unwrap();
        }

        let balance = store.balance(7).await.unwrap();
        assert_eq!(balance, 0);
        assert_eq!(store.transaction_sum(7), balance);

        let refunds = store.transactions(7, Some(TransactionKind::Refund)).await.unwrap();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].amount, 1);
    }

    #[tokio::test]
    async fn test_non_positive_amounts_are_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.spend(&entry(1, 0, TransactionKind::AutoReply)).await,
            Err(StoreError::InvalidAmount(0))
        ));
        assert!(matches!(
            store.deposit(&entry(1, -3, TransactionKind::TopUp)).await,
            Err(StoreError::InvalidAmount(-3))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_spends_against_single_credit_succeed_once() {
        let store = Arc::new(MemoryStore::new());
        store.deposit(&entry(3, 1, TransactionKind::TopUp)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.spend(&entry(3, 1, TransactionKind::AutoReply)).await.unwrap()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                successes += 1;
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(store.balance(3).await.unwrap(), 0);
        assert_eq!(store.transaction_sum(3), 0);
    }

    #[tokio::test]
    async fn test_blank_credential_does_not_enlist_tenant() {
        use crate::pipeline::testing::{account, modes};

        let store = MemoryStore::new();
        store.add_account(account(1, 1, Some("   "), modes(&[])));
        store.add_account(account(2, 2, Some("cred-2"), modes(&[])));
        store.add_account(account(3, 3, None, modes(&[])));

        assert_eq!(store.credentialed_tenants().await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_take_state_consumes_once_and_honours_expiry() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .put_state("account:1", "awaiting_credential", serde_json::json!({"t": 1}), now + Duration::minutes(5))
            .await
            .unwrap();
        store
            .put_state("account:2", "awaiting_credential", serde_json::json!({}), now - Duration::minutes(1))
            .await
            .unwrap();

        let first = store.take_state("account:1", "awaiting_credential", now).await.unwrap();
        assert_eq!(first, Some(serde_json::json!({"t": 1})));
        let second = store.take_state("account:1", "awaiting_credential", now).await.unwrap();
        assert_eq!(second, None);

        assert_eq!(store.take_state("account:2", "awaiting_credential", now).await.unwrap(), None);
        assert_eq!(store.purge_expired_states(now).await.unwrap(), 1);
    }
}
