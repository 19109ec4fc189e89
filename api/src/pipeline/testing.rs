//! Scripted collaborators shared by the pipeline tests

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::draft::DraftGenerator;
use super::orchestrator::{SyncRunner, SyncSettings};
use crate::models::{
    Account, AccountId, LedgerEntry, ReplyMode, ReplyModeMap, TenantId, TransactionKind,
};
use crate::services::feed::{FeedAnswer, FeedEntry, FeedFilter, FeedbackFeed, ProductDetails, UpstreamError};
use crate::services::generation::{CompletionProvider, GenerationError, ModelRoute};
use crate::store::CreditLedger;
use crate::store::memory::MemoryStore;

#[derive(Default)]
struct FeedScript {
    entries: HashMap<(String, FeedFilter), Vec<FeedEntry>>,
    failing_credentials: HashSet<String>,
    failing_submits: HashSet<String>,
    submitted: Vec<(String, String)>,
}

/// In-memory upstream feed. Pages are sliced out of the configured entries.
#[derive(Default)]
pub struct ScriptedFeed {
    script: Mutex<FeedScript>,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(self, credential: &str, filter: FeedFilter, entries: Vec<FeedEntry>) -> Self {
        self.script
            .lock()
            .unwrap()
            .entries
            .insert((credential.to_string(), filter), entries);
        self
    }

    pub fn fail_fetch(self, credential: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .failing_credentials
            .insert(credential.to_string());
        self
    }

    pub fn fail_submit(self, external_id: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .failing_submits
            .insert(external_id.to_string());
        self
    }

    pub fn clear_submit_failures(&self) {
        self.script.lock().unwrap().failing_submits.clear();
    }

    /// (external id, text) pairs accepted by the feed, in order
    pub fn submitted(&self) -> Vec<(String, String)> {
        self.script.lock().unwrap().submitted.clone()
    }
}

#[async_trait]
impl FeedbackFeed for ScriptedFeed {
    async fn fetch_page(
        &self,
        credential: &str,
        filter: FeedFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<FeedEntry>, UpstreamError> {
        let script = self.script.lock().unwrap();
        if script.failing_credentials.contains(credential) {
            return Err(UpstreamError::Status {
                status_code: 503,
                body: "unavailable".to_string(),
            });
        }

        let entries = script
            .entries
            .get(&(credential.to_string(), filter))
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(entries.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn submit_response(
        &self,
        _credential: &str,
        external_id: &str,
        text: &str,
    ) -> Result<(), UpstreamError> {
        let mut script = self.script.lock().unwrap();
        if script.failing_submits.contains(external_id) {
            return Err(UpstreamError::Status {
                status_code: 500,
                body: "publish rejected".to_string(),
            });
        }
        script
            .submitted
            .push((external_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Hands control back to the executor before every upstream call, so two
/// concurrent passes interleave at each feed request
pub struct YieldingFeed(pub Arc<ScriptedFeed>);

#[async_trait]
impl FeedbackFeed for YieldingFeed {
    async fn fetch_page(
        &self,
        credential: &str,
        filter: FeedFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<FeedEntry>, UpstreamError> {
        tokio::task::yield_now().await;
        self.0.fetch_page(credential, filter, offset, limit).await
    }

    async fn submit_response(
        &self,
        credential: &str,
        external_id: &str,
        text: &str,
    ) -> Result<(), UpstreamError> {
        tokio::task::yield_now().await;
        self.0.submit_response(credential, external_id, text).await
    }
}

/// Replies with a fixed draft; fails when the prompt mentions "boom"
pub struct ScriptedProvider;

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(
        &self,
        _system_prompt: &str,
        user_message: &str,
        _route: ModelRoute,
    ) -> Result<String, GenerationError> {
        if user_message.contains("boom") {
            return Err(GenerationError::Provider("model overloaded".to_string()));
        }
        Ok("Thank you for your feedback!".to_string())
    }
}

pub fn entry(id: &str, rating: i32, text: &str) -> FeedEntry {
    FeedEntry {
        id: id.to_string(),
        text: Some(text.to_string()),
        pros: None,
        cons: None,
        product_valuation: rating,
        created_date: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
        user_name: Some("Anna".to_string()),
        photo_links: None,
        video: None,
        product_details: Some(ProductDetails {
            nm_id: 1234,
            product_name: Some("Linen shirt".to_string()),
            brand_name: None,
        }),
        answer: None,
    }
}

pub fn answered(id: &str, rating: i32, answer: &str) -> FeedEntry {
    FeedEntry {
        answer: Some(FeedAnswer {
            text: answer.to_string(),
        }),
        ..entry(id, rating, "")
    }
}

pub fn modes(pairs: &[(i32, ReplyMode)]) -> ReplyModeMap {
    pairs
        .iter()
        .map(|(rating, mode)| (rating.to_string(), *mode))
        .collect()
}

pub fn account(id: AccountId, tenant_id: TenantId, credential: Option<&str>, reply_modes: ReplyModeMap) -> Account {
    Account {
        id,
        tenant_id,
        name: format!("account-{id}"),
        credential: credential.map(str::to_string),
        reply_modes,
        default_brand: Some("Northwind".to_string()),
        system_prompt: "You answer marketplace reviews politely.".to_string(),
        prompt_template: "Write a reply to a review of {product}.".to_string(),
    }
}

pub async fn top_up(store: &MemoryStore, tenant_id: TenantId, amount: i64) {
    store
        .deposit(&LedgerEntry {
            tenant_id,
            amount,
            kind: TransactionKind::TopUp,
            description: "test top-up".to_string(),
            feedback_id: None,
        })
        .await
        .unwrap();
}

pub fn settings() -> SyncSettings {
    SyncSettings {
        page_size: 50,
        page_delay: Duration::ZERO,
    }
}

pub fn runner(store: Arc<MemoryStore>, feed: Arc<ScriptedFeed>) -> SyncRunner {
    runner_with_feed(store, feed)
}

pub fn runner_with_feed(store: Arc<MemoryStore>, feed: Arc<dyn FeedbackFeed>) -> SyncRunner {
    SyncRunner::new(
        store,
        feed,
        Some(DraftGenerator::new(Arc::new(ScriptedProvider))),
        settings(),
    )
}
