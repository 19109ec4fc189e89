pub mod accounts;
pub mod credits;
pub mod feedback;
pub mod sync;
pub mod tenant;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .merge(accounts::routes())
        .merge(credits::routes())
        .merge(feedback::routes())
        .merge(sync::routes())
}

async fn health() -> &'static str {
    "ok"
}
