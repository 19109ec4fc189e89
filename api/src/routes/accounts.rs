//! Upstream credential setup (/accounts/{id}/credential*)
//!
//! Setup is a two-step handshake: `start` opens an `awaiting_credential` record
//! for the account, and submitting the credential consumes it. The credential is
//! checked against the unanswered feed before it is stored.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::tenant::Tenant;
use crate::AppState;
use crate::constants::CREDENTIAL_SETUP_TTL_SECS;
use crate::models::{AccountId, TenantId};
use crate::services::error::LogErr;
use crate::services::feed::{FeedFilter, FeedbackFeed};

const AWAITING_CREDENTIAL: &str = "awaiting_credential";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/accounts/{id}/credential/start", post(start_credential_setup))
        .route("/accounts/{id}/credential", post(submit_credential))
}

fn setup_scope(account_id: AccountId) -> String {
    format!("account:{account_id}")
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetupState {
    tenant_id: TenantId,
    expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    expires_at: DateTime<Utc>,
}

/// POST /accounts/{id}/credential/start
async fn start_credential_setup(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Path(account_id): Path<AccountId>,
) -> Result<Json<StartResponse>, StatusCode> {
    state
        .store
        .get_account(tenant_id, account_id)
        .await
        .log_500("Get account error")?
        .ok_or(StatusCode::NOT_FOUND)?;

    let expires_at = Utc::now() + Duration::seconds(CREDENTIAL_SETUP_TTL_SECS);
    let payload = serde_json::to_value(SetupState {
        tenant_id,
        expires_at,
    })
    .log_500("Encode setup state error")?;

    state
        .store
        .put_state(&setup_scope(account_id), AWAITING_CREDENTIAL, payload, expires_at)
        .await
        .log_500("Save setup state error")?;

    Ok(Json(StartResponse { expires_at }))
}

#[derive(Deserialize)]
struct CredentialRequest {
    credential: String,
}

/// Fetches a single unanswered item. Any error other than an explicit rejection
/// means the platform could not be asked, not that the credential is bad.
async fn validate_credential(feed: &dyn FeedbackFeed, credential: &str) -> Result<(), StatusCode> {
    match feed.fetch_page(credential, FeedFilter::Unanswered, 0, 1).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_unauthorized() => {
            tracing::info!(error = %e, "Upstream rejected submitted credential");
            Err(StatusCode::UNPROCESSABLE_ENTITY)
        }
        Err(e) => Err::<(), _>(e).log_status("Credential validation error", StatusCode::BAD_GATEWAY),
    }
}

/// POST /accounts/{id}/credential
async fn submit_credential(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Path(account_id): Path<AccountId>,
    Json(req): Json<CredentialRequest>,
) -> Result<StatusCode, StatusCode> {
    let credential = req.credential.trim();
    if credential.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let scope = setup_scope(account_id);
    let payload = state
        .store
        .take_state(&scope, AWAITING_CREDENTIAL, Utc::now())
        .await
        .log_500("Load setup state error")?
        .ok_or(StatusCode::CONFLICT)?;
    let setup: SetupState = serde_json::from_value(payload.clone()).log_500("Decode setup state error")?;
    let check = if setup.tenant_id != tenant_id {
        Err(StatusCode::NOT_FOUND)
    } else {
        validate_credential(state.feed.as_ref(), credential).await
    };

    if let Err(status) = check {
        // Reopen the handshake so it can be retried before it expires
        state
            .store
            .put_state(&scope, AWAITING_CREDENTIAL, payload, setup.expires_at)
            .await
            .log_500("Restore setup state error")?;
        return Err(status);
    }

    let updated = state
        .store
        .set_credential(tenant_id, account_id, credential)
        .await
        .log_500("Save credential error")?;
    if !updated {
        return Err(StatusCode::NOT_FOUND);
    }

    tracing::info!(tenant_id, account_id, "Upstream credential configured");
    Ok(StatusCode::NO_CONTENT)
}
