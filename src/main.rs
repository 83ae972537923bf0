// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Garmin-Cache API Server
//!
//! Keeps a local sqlite cache of Garmin Connect activities fresh through
//! incremental sync, and serves gated read-only SQL queries against it.

use garmin_cache::{
    config::Config,
    db::ActivityStore,
    services::{ActivityProvider, GarminClient, QueryGateway, SyncService},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Garmin-Cache API");

    // Create the cache file and table up front. Failing here aborts
    // startup, which keeps "schema creation failed" distinguishable from
    // sync failures reported later over HTTP.
    let store =
        ActivityStore::open(config.database_path.clone()).expect("Failed to open activity store");
    tracing::info!(path = %config.database_path.display(), "Activity store ready");

    // The Garmin client exists only if credentials are configured; queries
    // against an existing cache work without them.
    let provider: Option<Arc<dyn ActivityProvider>> = match config.garmin.clone() {
        Some(credentials) => Some(Arc::new(GarminClient::new(credentials))),
        None => {
            tracing::warn!("GARMIN_EMAIL / GARMIN_PASSWORD not set, sync is disabled");
            None
        }
    };

    let sync = SyncService::new(provider, store.clone(), config.page_size);
    let gateway = QueryGateway::new(store.clone(), config.query_max_len);

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        sync,
        gateway,
    });

    // Build router
    let app = garmin_cache::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("garmin_cache=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
