//! Foreground sync trigger (/sync)

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use std::sync::Arc;

use super::tenant::Tenant;
use crate::AppState;
use crate::models::SyncSummary;
use crate::pipeline::SyncError;
use crate::services::{error::LogErr, rate_limit::SYNC_RATE_LIMITER};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/sync", post(sync_tenant))
}

/// POST /sync - Run one sync pass for the calling tenant and return its summary
async fn sync_tenant(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
) -> Result<Json<SyncSummary>, StatusCode> {
    if !SYNC_RATE_LIMITER.check(tenant_id) {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    let result = state.runner.run_tenant(tenant_id).await;
    let status = match &result {
        Err(SyncError::NotConfigured(_) | SyncError::InProgress(_)) => StatusCode::CONFLICT,
        Err(SyncError::Feed(_)) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let summary = result.log_status("Foreground sync failed", status)?;
    Ok(Json(summary))
}
