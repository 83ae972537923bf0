// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes: sync trigger, schema introspection, gated queries, status.

use crate::db::TableInfo;
use crate::error::Result;
use crate::services::sync::SyncResult;
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sync", post(trigger_sync))
        .route("/api/schema", get(get_schema))
        .route("/api/query", post(run_query))
        .route("/api/status", get(get_status))
}

// ─── Sync ────────────────────────────────────────────────────

/// Run one incremental sync pass against Garmin Connect.
///
/// Reports how many activities were new plus the refreshed totals. Provider
/// failures come back as 502, store failures as 500.
async fn trigger_sync(State(state): State<Arc<AppState>>) -> Result<Json<SyncResult>> {
    let result = state.sync.sync().await?;
    Ok(Json(result))
}

// ─── Schema ──────────────────────────────────────────────────

/// Table definitions of the cache, straight from sqlite_master.
async fn get_schema(State(state): State<Arc<AppState>>) -> Result<Json<Vec<TableInfo>>> {
    let store = state.store.clone();
    let tables = tokio::task::spawn_blocking(move || store.table_definitions())
        .await
        .map_err(anyhow::Error::from)??;
    Ok(Json(tables))
}

// ─── Query ───────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

/// Gated query response.
#[derive(Serialize)]
pub struct QueryResponse {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
}

/// Run one read-only SQL query against the cache.
///
/// Gateway rejections come back as 400 with the specific reason; SQL that
/// passes validation but does not compile (unknown column, bad syntax) is
/// also a 400 so the caller can fix the query.
async fn run_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    let gateway = state.gateway.clone();
    let output = tokio::task::spawn_blocking(move || gateway.run_query(&request.query))
        .await
        .map_err(anyhow::Error::from)??;
    Ok(Json(QueryResponse {
        row_count: output.row_count(),
        columns: output.columns,
        rows: output.rows,
    }))
}

// ─── Status ──────────────────────────────────────────────────

/// Cache status response.
#[derive(Serialize)]
pub struct StatusResponse {
    pub total_activities: i64,
    pub latest_start_time: Option<String>,
    /// Whether Garmin credentials are configured, i.e. whether /api/sync
    /// can do anything.
    pub sync_configured: bool,
}

/// Cheap introspection: row total and the current watermark.
async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>> {
    let store = state.store.clone();
    let (total_activities, latest_start_time) = tokio::task::spawn_blocking(
        move || -> std::result::Result<_, crate::db::StoreError> {
            Ok((store.row_count()?, store.latest_watermark()?))
        },
    )
    .await
    .map_err(anyhow::Error::from)??;

    Ok(Json(StatusResponse {
        total_activities,
        latest_start_time,
        sync_configured: state.config.garmin.is_some(),
    }))
}
