//! Credit balance and history (/credits/*)

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::tenant::Tenant;
use crate::AppState;
use crate::models::{CreditTransaction, LedgerEntry, TransactionKind};
use crate::services::error::LogErr;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/credits", get(get_balance))
        .route("/credits/transactions", get(list_transactions))
        .route("/credits/top-up", post(top_up))
}

#[derive(Serialize)]
struct BalanceResponse {
    balance: i64,
}

async fn get_balance(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
) -> Result<Json<BalanceResponse>, StatusCode> {
    let balance = state
        .store
        .balance(tenant_id)
        .await
        .log_500("Get balance error")?;

    Ok(Json(BalanceResponse { balance }))
}

#[derive(Deserialize)]
struct TransactionsQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// GET /credits/transactions?type=auto_reply - Newest first
async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<Vec<CreditTransaction>>, StatusCode> {
    let kind = match query.kind.as_deref().filter(|k| !k.is_empty()) {
        Some(k) => Some(TransactionKind::parse(k).ok_or(StatusCode::BAD_REQUEST)?),
        None => None,
    };

    let transactions = state
        .store
        .transactions(tenant_id, kind)
        .await
        .log_500("List transactions error")?;

    Ok(Json(transactions))
}

#[derive(Deserialize)]
struct TopUpRequest {
    amount: i64,
    description: Option<String>,
}

/// POST /credits/top-up - Billing hook; credits the calling tenant
async fn top_up(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Json(req): Json<TopUpRequest>,
) -> Result<Json<BalanceResponse>, StatusCode> {
    if req.amount <= 0 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let entry = LedgerEntry {
        tenant_id,
        amount: req.amount,
        kind: TransactionKind::TopUp,
        description: req
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("Top-up of {} credits", req.amount)),
        feedback_id: None,
    };

    let balance = state.store.deposit(&entry).await.log_500("Top-up error")?;
    tracing::info!(tenant_id, amount = req.amount, balance, "Credits topped up");

    Ok(Json(BalanceResponse { balance }))
}
