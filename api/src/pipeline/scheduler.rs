//! Batch runs over tenants, isolating failures per tenant

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::orchestrator::SyncRunner;
use crate::models::{SyncSummary, TenantId};
use crate::store::StoreError;

/// Per-tenant outcome of a batch run: the summary, or the tenant-level error
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSyncReport {
    pub tenant_id: TenantId,
    #[serde(flatten)]
    pub summary: Option<SyncSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Syncs one tenant, or every tenant with a credentialed account. Tenants run
/// through a pool of `concurrency` workers; results keep tenant order. Tenants
/// not yet started when the token is cancelled are left out of the result.
pub async fn run_sync(
    runner: &SyncRunner,
    tenant_id: Option<TenantId>,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<Vec<TenantSyncReport>, StoreError> {
    let tenants = match tenant_id {
        Some(id) => vec![id],
        None => runner.store().credentialed_tenants().await?,
    };

    tracing::info!(tenants = tenants.len(), concurrency, "Starting sync batch");

    let reports: Vec<TenantSyncReport> = stream::iter(tenants)
        .map(|tenant_id| async move {
            if cancel.is_cancelled() {
                tracing::info!(tenant_id, "Sync batch cancelled, skipping tenant");
                return None;
            }

            let report = match runner.run_tenant(tenant_id).await {
                Ok(summary) => TenantSyncReport {
                    tenant_id,
                    summary: Some(summary),
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(tenant_id, error = %e, "Tenant sync failed");
                    TenantSyncReport {
                        tenant_id,
                        summary: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            Some(report)
        })
        .buffered(concurrency.max(1))
        .filter_map(|report| async move { report })
        .collect()
        .await;

    let failed = reports.iter().filter(|r| r.error.is_some()).count();
    tracing::info!(
        tenants = reports.len(),
        failed,
        cancelled = cancel.is_cancelled(),
        "Sync batch complete"
    );

    Ok(reports)
}
