//! Housekeeping: time-based archiving and reconciliation with the answered feed

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::orchestrator::{SyncError, SyncSettings};
use crate::models::{FeedbackKey, TenantId};
use crate::services::feed::{FeedFilter, FeedbackFeed, fetch_all};
use crate::store::{FeedbackStore, Store, StoreError};

/// Moves `auto`/`sent` items untouched for `days` days to `archived`
pub async fn archive_stale<S>(store: &S, days: i64, now: DateTime<Utc>) -> Result<u64, StoreError>
where
    S: FeedbackStore + ?Sized,
{
    let cutoff = now - Duration::days(days);
    let archived = store.archive_stale(cutoff).await?;
    if archived > 0 {
        tracing::info!(archived, days, "Archived stale feedback");
    }
    Ok(archived)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub scanned: usize,
    pub marked: usize,
}

/// Walks the answered feed of each credentialed account and marks items still
/// pending locally as answered externally. Items not stored locally are ignored.
pub async fn import_answered<S>(
    store: &S,
    feed: &dyn FeedbackFeed,
    tenant_id: TenantId,
    settings: SyncSettings,
) -> Result<ImportSummary, SyncError>
where
    S: Store + ?Sized,
{
    let accounts = store.accounts_for_tenant(tenant_id).await?;
    let mut summary = ImportSummary::default();

    for account in &accounts {
        let Some(credential) = account.active_credential() else {
            continue;
        };

        let walk = fetch_all(
            feed,
            credential,
            FeedFilter::Answered,
            settings.page_size,
            settings.page_delay,
        )
        .await;
        if let Some(err) = &walk.error {
            tracing::warn!(tenant_id, account_id = account.id, error = %err, "Answered feed walk stopped early");
        }

        summary.scanned += walk.entries.len();
        for entry in &walk.entries {
            let key = FeedbackKey {
                external_id: entry.id.clone(),
                tenant_id,
                account_id: account.id,
            };
            let answer = entry.answer.as_ref().map(|a| a.text.as_str());
            if store.mark_answered_externally(&key, answer).await? {
                summary.marked += 1;
            }
        }
    }

    if summary.marked > 0 {
        tracing::info!(tenant_id, marked = summary.marked, "Imported external answers");
    }
    Ok(summary)
}
