mod config;
mod constants;
mod domain;
mod logging;
mod models;
mod pipeline;
mod routes;
mod services;
mod store;
mod sync_worker;

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use config::AppConfig;
use constants::FEED_PAGE_SIZE;
use pipeline::draft::DraftGenerator;
use pipeline::refusal::KeywordRefusalDetector;
use pipeline::{SyncRunner, SyncSettings};
use services::feed::{FeedClient, FeedbackFeed};
use services::generation::GeminiProvider;
use store::{PgStore, Store};
use sync_worker::{SyncContext, run_sync_worker};

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub feed: Arc<dyn FeedbackFeed>,
    pub runner: Arc<SyncRunner>,
}

async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown requested, cancelling sync batch");
    cancel.cancel();
}

#[tokio::main]
async fn main() {
    logging::init();
    let config = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    let drafts = match config.require_gemini_key() {
        Ok(key) => Some(DraftGenerator::new(Arc::new(GeminiProvider::new(key)))),
        Err(e) => {
            tracing::warn!(error = %e, "Draft generation disabled; sync passes will fail as not configured");
            None
        }
    };

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));
    let feed: Arc<dyn FeedbackFeed> = Arc::new(FeedClient::new(&config.feed_base_url));
    let settings = SyncSettings {
        page_size: FEED_PAGE_SIZE,
        page_delay: config.feed_page_delay,
    };

    let mut runner = SyncRunner::new(store.clone(), feed.clone(), drafts, settings);
    if let Some(keywords) = config.refusal_keywords.clone() {
        runner = runner.with_refusal_detector(Arc::new(KeywordRefusalDetector::new(keywords)));
    }
    let runner = Arc::new(runner);

    let cancel = CancellationToken::new();
    let ctx = SyncContext {
        runner: runner.clone(),
        concurrency: config.tenant_concurrency,
        archive_after_days: config.archive_after_days,
        cancel: cancel.clone(),
    };
    let cron = config.sync_cron.clone();
    tokio::spawn(async move {
        if let Err(e) = run_sync_worker(pool, ctx, &cron).await {
            tracing::error!(error = %e, "Sync worker stopped");
        }
    });

    let state = Arc::new(AppState {
        store,
        feed,
        runner,
    });

    let app = routes::build_routes()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {}: {}", addr, e));

    tracing::info!(%addr, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .expect("Server failed");
}
