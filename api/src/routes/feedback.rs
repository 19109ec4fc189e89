//! Stored feedback listing and manual send (/feedback/*)

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;

use super::tenant::Tenant;
use crate::AppState;
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::models::{FeedbackItem, FeedbackStatus};
use crate::pipeline::manual::{ManualSendError, send_manual};
use crate::pipeline::publish::PublishError;
use crate::services::error::LogErr;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/feedback", get(list_feedback))
        .route("/feedback/{id}/send", post(send_feedback))
}

#[derive(Deserialize)]
struct ListQuery {
    status: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

/// GET /feedback?status=pending&limit=50&offset=0 - Newest first
async fn list_feedback(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<FeedbackItem>>, StatusCode> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => Some(FeedbackStatus::parse(s).ok_or(StatusCode::BAD_REQUEST)?),
        None => None,
    };
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let items = state
        .store
        .list_feedback(tenant_id, status, limit, offset)
        .await
        .log_500("List feedback error")?;

    Ok(Json(items))
}

#[derive(Deserialize)]
struct SendRequest {
    text: String,
}

/// POST /feedback/{id}/send - Publish reviewer-edited text, consuming one credit
async fn send_feedback(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Path(feedback_id): Path<i64>,
    Json(req): Json<SendRequest>,
) -> Result<Json<FeedbackItem>, StatusCode> {
    let result = send_manual(
        state.store.as_ref(),
        state.feed.as_ref(),
        tenant_id,
        feedback_id,
        &req.text,
    )
    .await;

    let status = match &result {
        Err(ManualSendError::NotFound(_)) => StatusCode::NOT_FOUND,
        Err(ManualSendError::EmptyText) => StatusCode::BAD_REQUEST,
        Err(ManualSendError::InsufficientCredit) => StatusCode::PAYMENT_REQUIRED,
        Err(
            ManualSendError::NotConfigured
            | ManualSendError::InvalidState(_)
            | ManualSendError::Busy(_),
        ) => {
            StatusCode::CONFLICT
        }
        Err(ManualSendError::Publish(PublishError::Upstream(_))) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let item = result.log_status("Manual send failed", status)?;
    Ok(Json(item))
}
