//! Periodic sync sweep as an apalis cron job
//!
//! Each tick syncs every credentialed tenant, reconciles the answered feed for
//! the tenants that synced cleanly, archives stale items and drops expired
//! pending states.

use apalis::prelude::*;
use apalis_cron::{CronStream, Schedule};
use apalis_sql::postgres::PostgresStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::pipeline::archive::{archive_stale, import_answered};
use crate::pipeline::{SyncRunner, run_sync};

/// Job input, one per cron tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub scheduled_at: DateTime<Utc>,
}

impl From<DateTime<Utc>> for SyncJob {
    fn from(dt: DateTime<Utc>) -> Self {
        SyncJob { scheduled_at: dt }
    }
}

#[derive(Clone)]
pub struct SyncContext {
    pub runner: Arc<SyncRunner>,
    pub concurrency: usize,
    pub archive_after_days: i64,
    pub cancel: CancellationToken,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("invalid sync schedule {0:?}: {1}")]
    Schedule(String, String),
    #[error("failed to set up job storage: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("sync worker monitor failed: {0}")]
    Monitor(#[from] std::io::Error),
}

/// Always returns Ok: the background sweep only logs failures
async fn process_sync_job(job: SyncJob, ctx: Data<SyncContext>) -> Result<(), Error> {
    tracing::info!(scheduled_at = %job.scheduled_at, "Sync sweep starting");
    run_sweep(&ctx).await;
    Ok(())
}

async fn run_sweep(ctx: &SyncContext) {
    let runner = ctx.runner.as_ref();
    let store = runner.store().as_ref();

    match run_sync(runner, None, ctx.concurrency, &ctx.cancel).await {
        Ok(reports) => {
            for report in reports.iter().filter(|r| r.summary.is_some()) {
                if ctx.cancel.is_cancelled() {
                    break;
                }
                if let Err(e) =
                    import_answered(store, runner.feed().as_ref(), report.tenant_id, runner.settings())
                        .await
                {
                    tracing::warn!(tenant_id = report.tenant_id, error = %e, "Answered feed import failed");
                }
            }
        }
        Err(e) => tracing::error!(error = %e, "Could not list tenants for sync sweep"),
    }

    let now = Utc::now();
    if let Err(e) = archive_stale(store, ctx.archive_after_days, now).await {
        tracing::error!(error = %e, "Archiver failed");
    }
    match store.purge_expired_states(now).await {
        Ok(0) => {}
        Ok(purged) => tracing::debug!(purged, "Purged expired pending states"),
        Err(e) => tracing::warn!(error = %e, "Failed to purge expired pending states"),
    }
}

/// Runs until the monitor stops
pub async fn run_sync_worker(
    pool: PgPool,
    ctx: SyncContext,
    cron: &str,
) -> Result<(), WorkerError> {
    let schedule =
        Schedule::from_str(cron).map_err(|e| WorkerError::Schedule(cron.to_string(), e.to_string()))?;

    PostgresStorage::setup(&pool).await?;

    let storage: PostgresStorage<SyncJob> = PostgresStorage::new(pool);
    let backend = CronStream::new(schedule).pipe_to_storage(storage);

    tracing::info!(cron, concurrency = ctx.concurrency, "Sync worker starting");

    let cancel = ctx.cancel.clone();
    let worker = WorkerBuilder::new("feedback-sync")
        .data(ctx)
        .backend(backend)
        .build_fn(process_sync_job);

    Monitor::new()
        .register(worker)
        .run_with_signal(async move {
            cancel.cancelled().await;
            tracing::info!("Sync worker stopping");
            Ok(())
        })
        .await?;
    Ok(())
}
