//! One tenant's sync pass.
//!
//! Walk each credentialed account's unanswered feed, skip items already stored,
//! draft a reply for each new item, publish it when the account's policy says
//! auto and the tenant has credit, persist, then retry pending items that
//! already carry a draft. Item failures are collected into the summary and
//! never abort the pass.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use super::draft::DraftGenerator;
use super::policy::decide;
use super::prompt::DraftRequest;
use super::publish::{PublishOutcome, PublishTarget, claim_deadline, spend_and_submit};
use super::refusal::{KeywordRefusalDetector, RefusalDetector, review_text};
use crate::constants::{FEED_PAGE_DELAY_MS, FEED_PAGE_SIZE};
use crate::models::{
    Account, AccountId, AttachmentKind, FeedbackKey, FeedbackStatus, NewFeedbackItem,
    ReplyMode, SyncSummary, TenantId, TransactionKind,
};
use crate::services::feed::{FeedEntry, FeedFilter, FeedbackFeed, fetch_all};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("feed unavailable: {0}")]
    Feed(String),
    #[error("a sync pass is already running for tenant {0}")]
    InProgress(TenantId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub page_size: usize,
    pub page_delay: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: FEED_PAGE_SIZE,
            page_delay: Duration::from_millis(FEED_PAGE_DELAY_MS),
        }
    }
}

pub struct SyncRunner {
    store: Arc<dyn Store>,
    feed: Arc<dyn FeedbackFeed>,
    /// `None` when no generation key is configured
    drafts: Option<DraftGenerator>,
    refusal: Arc<dyn RefusalDetector>,
    settings: SyncSettings,
    /// Tenants with a pass in flight
    active: Mutex<HashSet<TenantId>>,
}

/// Marks a tenant's pass as running until dropped
struct PassGuard<'a> {
    active: &'a Mutex<HashSet<TenantId>>,
    tenant_id: TenantId,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.tenant_id);
    }
}

/// What happened to one new item before it was persisted
struct Resolution {
    status: FeedbackStatus,
    draft: Option<String>,
    published: Option<String>,
    publish_attempted: bool,
}

impl SyncRunner {
    pub fn new(
        store: Arc<dyn Store>,
        feed: Arc<dyn FeedbackFeed>,
        drafts: Option<DraftGenerator>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            feed,
            drafts,
            refusal: Arc::new(KeywordRefusalDetector::default()),
            settings,
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_refusal_detector(mut self, refusal: Arc<dyn RefusalDetector>) -> Self {
        self.refusal = refusal;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn feed(&self) -> &Arc<dyn FeedbackFeed> {
        &self.feed
    }

    pub fn settings(&self) -> SyncSettings {
        self.settings
    }

    fn begin_pass(&self, tenant_id: TenantId) -> Option<PassGuard<'_>> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(tenant_id) {
            return None;
        }
        Some(PassGuard {
            active: &self.active,
            tenant_id,
        })
    }

    /// One pass per tenant at a time; an overlapping call fails with `InProgress`.
    pub async fn run_tenant(&self, tenant_id: TenantId) -> Result<SyncSummary, SyncError> {
        let Some(_guard) = self.begin_pass(tenant_id) else {
            tracing::info!(tenant_id, "Sync pass already running, skipping");
            return Err(SyncError::InProgress(tenant_id));
        };

        let accounts: Vec<Account> = self
            .store
            .accounts_for_tenant(tenant_id)
            .await?
            .into_iter()
            .filter(|a| a.active_credential().is_some())
            .collect();

        if accounts.is_empty() {
            return Err(SyncError::NotConfigured(
                "no upstream credential".to_string(),
            ));
        }
        let Some(drafts) = self.drafts.as_ref() else {
            return Err(SyncError::NotConfigured(
                "generation key missing".to_string(),
            ));
        };

        tracing::info!(tenant_id, accounts = accounts.len(), "Starting tenant sync");

        let mut summary = SyncSummary::default();
        let mut attempted: HashSet<i64> = HashSet::new();
        let mut dead_walks = 0;

        for account in &accounts {
            let Some(credential) = account.active_credential() else {
                continue;
            };

            let walk = fetch_all(
                self.feed.as_ref(),
                credential,
                FeedFilter::Unanswered,
                self.settings.page_size,
                self.settings.page_delay,
            )
            .await;

            summary.fetched += walk.entries.len();
            if let Some(err) = &walk.error {
                tracing::warn!(
                    tenant_id,
                    account_id = account.id,
                    pages = walk.pages,
                    error = %err,
                    "Feed walk stopped early"
                );
                summary
                    .errors
                    .push(format!("account {}: feed fetch failed: {err}", account.id));
                if walk.entries.is_empty() {
                    dead_walks += 1;
                }
            }

            for entry in &walk.entries {
                self.process_entry(drafts, account, credential, entry, &mut summary, &mut attempted)
                    .await;
            }
        }

        if dead_walks == accounts.len() {
            return Err(SyncError::Feed(summary.errors.join("; ")));
        }

        self.retry_sweep(tenant_id, &accounts, &attempted, &mut summary)
            .await;

        if let Err(e) = self.store.touch_last_sync(tenant_id, Utc::now()).await {
            tracing::error!(tenant_id, error = %e, "Failed to record sync timestamp");
            summary.errors.push(format!("sync timestamp: {e}"));
        }

        tracing::info!(
            tenant_id,
            fetched = summary.fetched,
            new = summary.new_count,
            auto_sent = summary.auto_sent,
            errors = summary.errors.len(),
            "Tenant sync complete"
        );

        Ok(summary)
    }

    async fn process_entry(
        &self,
        drafts: &DraftGenerator,
        account: &Account,
        credential: &str,
        entry: &FeedEntry,
        summary: &mut SyncSummary,
        attempted: &mut HashSet<i64>,
    ) {
        if !(1..=5).contains(&entry.product_valuation) {
            tracing::warn!(
                tenant_id = account.tenant_id,
                external_id = %entry.id,
                rating = entry.product_valuation,
                "Skipping feedback with out-of-range rating"
            );
            summary.errors.push(format!(
                "feedback {}: rating {} out of range",
                entry.id, entry.product_valuation
            ));
            return;
        }

        let key = FeedbackKey {
            external_id: entry.id.clone(),
            tenant_id: account.tenant_id,
            account_id: account.id,
        };

        match self.store.feedback_exists(&key).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(external_id = %entry.id, error = %e, "Dedup check failed");
                summary
                    .errors
                    .push(format!("feedback {}: dedup check failed: {e}", entry.id));
                return;
            }
        }

        let request = self.draft_request(account, entry).await;
        let resolution = self
            .resolve(drafts, account, credential, entry, &request, summary)
            .await;

        let now = Utc::now();
        let item = NewFeedbackItem {
            external_id: entry.id.clone(),
            tenant_id: account.tenant_id,
            account_id: account.id,
            rating: entry.product_valuation,
            author_name: entry.user_name.clone().unwrap_or_default(),
            body_text: entry.text.clone().unwrap_or_default(),
            pros_text: entry.pros.clone().unwrap_or_default(),
            cons_text: entry.cons.clone().unwrap_or_default(),
            attachments: entry.attachments(),
            brand_name: request.brand_name.clone(),
            product_id: entry.product_id(),
            product_name: request.product_name.clone(),
            status: resolution.status,
            draft_text: resolution.draft,
            published_text: resolution.published,
            created_at: entry.created_date,
            fetched_at: now,
        };

        match self.store.insert_feedback(&item).await {
            Ok(Some(id)) => {
                summary.new_count += 1;
                if resolution.publish_attempted {
                    attempted.insert(id);
                }
            }
            Ok(None) => {
                tracing::debug!(external_id = %entry.id, "Item inserted concurrently, skipping");
            }
            Err(e) => {
                // Published items that fail to persist are re-fetched next run only if
                // the platform still lists them as unanswered.
                tracing::error!(
                    tenant_id = account.tenant_id,
                    external_id = %entry.id,
                    status = item.status.as_str(),
                    error = %e,
                    "Failed to persist feedback"
                );
                summary
                    .errors
                    .push(format!("feedback {}: persist failed: {e}", entry.id));
            }
        }
    }

    async fn draft_request(&self, account: &Account, entry: &FeedEntry) -> DraftRequest {
        let body = entry.text.as_deref().unwrap_or_default();
        let pros = entry.pros.as_deref().unwrap_or_default();
        let cons = entry.cons.as_deref().unwrap_or_default();
        let is_empty = [body, pros, cons].iter().all(|s| s.trim().is_empty());

        let mut content = body.trim().to_string();
        for (label, part) in [("Pros", pros), ("Cons", cons)] {
            if !part.trim().is_empty() {
                if !content.is_empty() {
                    content.push('\n');
                }
                content.push_str(&format!("{label}: {}", part.trim()));
            }
        }

        let attachments = entry.attachments();
        let details = entry.product_details.as_ref();
        let brand_name = details
            .and_then(|d| d.brand_name.clone())
            .filter(|b| !b.trim().is_empty())
            .or_else(|| account.default_brand.clone());

        let recommendations = match entry.product_id() {
            Some(product_id) => self
                .store
                .recommendation_hints(account.id, &product_id)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(
                        account_id = account.id,
                        product_id = %product_id,
                        error = %e,
                        "Recommendation lookup failed, drafting without hints"
                    );
                    Vec::new()
                }),
            None => Vec::new(),
        };

        DraftRequest {
            prompt_template: account.prompt_template.clone(),
            body_text: content,
            rating: entry.product_valuation,
            product_name: details.and_then(|d| d.product_name.clone()),
            attachment_count: attachments.len(),
            has_video: attachments.iter().any(|a| a.kind == AttachmentKind::Video),
            author_name: entry.user_name.clone().unwrap_or_default(),
            is_empty,
            recommendations,
            is_refusal: self.refusal.is_refusal(&review_text(body, pros, cons)),
            brand_name,
        }
    }

    async fn resolve(
        &self,
        drafts: &DraftGenerator,
        account: &Account,
        credential: &str,
        entry: &FeedEntry,
        request: &DraftRequest,
        summary: &mut SyncSummary,
    ) -> Resolution {
        let mut resolution = Resolution {
            status: FeedbackStatus::Pending,
            draft: None,
            published: None,
            publish_attempted: false,
        };

        let draft = match drafts.generate(request, &account.system_prompt).await {
            Ok(draft) => draft,
            Err(e) => {
                tracing::warn!(
                    tenant_id = account.tenant_id,
                    account_id = account.id,
                    external_id = %entry.id,
                    error = %e,
                    "Draft generation failed"
                );
                summary
                    .errors
                    .push(format!("feedback {}: draft generation failed: {e}", entry.id));
                return resolution;
            }
        };

        if decide(entry.product_valuation, &account.reply_modes) == ReplyMode::Auto {
            resolution.publish_attempted = true;
            let target = PublishTarget {
                tenant_id: account.tenant_id,
                feedback_id: None,
                external_id: &entry.id,
                credential,
                text: &draft,
                kind: TransactionKind::AutoReply,
            };

            match spend_and_submit(self.store.as_ref(), self.feed.as_ref(), target).await {
                Ok(PublishOutcome::Published { balance }) => {
                    tracing::info!(
                        tenant_id = account.tenant_id,
                        external_id = %entry.id,
                        balance,
                        "Auto-reply published"
                    );
                    resolution.status = FeedbackStatus::Auto;
                    resolution.published = Some(draft.clone());
                    summary.auto_sent += 1;
                }
                Ok(PublishOutcome::InsufficientCredit) => {
                    tracing::info!(
                        tenant_id = account.tenant_id,
                        external_id = %entry.id,
                        "Auto-reply blocked: insufficient credit"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        tenant_id = account.tenant_id,
                        external_id = %entry.id,
                        error = %e,
                        "Auto-reply publish failed"
                    );
                    summary
                        .errors
                        .push(format!("feedback {}: publish failed: {e}", entry.id));
                }
            }
        }

        resolution.draft = Some(draft);
        resolution
    }

    /// Re-attempts pending items with a draft whose rating now maps to auto.
    /// Items whose publish was already attempted in this pass are skipped.
    async fn retry_sweep(
        &self,
        tenant_id: TenantId,
        accounts: &[Account],
        attempted: &HashSet<i64>,
        summary: &mut SyncSummary,
    ) {
        let candidates = match self.store.list_retry_candidates(tenant_id).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(tenant_id, error = %e, "Failed to load retry candidates");
                summary.errors.push(format!("retry sweep: {e}"));
                return;
            }
        };

        let by_id: HashMap<AccountId, &Account> = accounts.iter().map(|a| (a.id, a)).collect();
        let mut recovered = 0;

        for item in candidates {
            if attempted.contains(&item.id) {
                continue;
            }
            let Some(account) = by_id.get(&item.account_id) else {
                continue;
            };
            let (Some(credential), Some(draft)) =
                (account.active_credential(), item.draft_text.as_deref())
            else {
                continue;
            };
            if decide(item.rating, &account.reply_modes) != ReplyMode::Auto {
                continue;
            }

            match self
                .store
                .claim_for_publish(item.id, &[FeedbackStatus::Pending], claim_deadline())
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(tenant_id, feedback_id = item.id, "Item claimed by another publisher");
                    continue;
                }
                Err(e) => {
                    summary
                        .errors
                        .push(format!("feedback {}: claim failed: {e}", item.external_id));
                    continue;
                }
            }

            let target = PublishTarget {
                tenant_id,
                feedback_id: Some(item.id),
                external_id: &item.external_id,
                credential,
                text: draft,
                kind: TransactionKind::AutoReply,
            };

            match spend_and_submit(self.store.as_ref(), self.feed.as_ref(), target).await {
                Ok(PublishOutcome::Published { .. }) => {
                    summary.auto_sent += 1;
                    recovered += 1;
                    if let Err(e) = self
                        .store
                        .mark_published(item.id, FeedbackStatus::Auto, draft, false)
                        .await
                    {
                        tracing::error!(
                            tenant_id,
                            feedback_id = item.id,
                            error = %e,
                            "Published retry but failed to record it"
                        );
                        summary
                            .errors
                            .push(format!("feedback {}: persist failed: {e}", item.external_id));
                    }
                }
                Ok(PublishOutcome::InsufficientCredit) => {
                    tracing::debug!(tenant_id, feedback_id = item.id, "Retry still blocked on credit");
                    self.release_claim(item.id).await;
                }
                Err(e) => {
                    summary
                        .errors
                        .push(format!("feedback {}: retry publish failed: {e}", item.external_id));
                    self.release_claim(item.id).await;
                }
            }
        }

        if recovered > 0 {
            tracing::info!(tenant_id, recovered, "Retry sweep published blocked items");
        }
    }

    async fn release_claim(&self, feedback_id: i64) {
        if let Err(e) = self.store.release_claim(feedback_id).await {
            tracing::warn!(feedback_id, error = %e, "Failed to release publish claim");
        }
    }
}
