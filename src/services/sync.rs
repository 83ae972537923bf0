// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Incremental activity sync from Garmin Connect.
//!
//! Handles the core workflow:
//! 1. Capture the store's watermark (newest cached start time)
//! 2. Fetch activity pages newest-first from the provider
//! 3. Buffer records strictly newer than the watermark
//! 4. Stop at the first record that is not newer, or on an empty page
//! 5. Commit the buffer in one transaction and report totals

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::db::{ActivityStore, StoreError};
use crate::schema::{self, ActivityRow};
use crate::services::garmin::{ActivityProvider, ProviderError};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("{0}")]
    MissingCredentials(&'static str),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("sync task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub new_activities: usize,
    pub total_activities: i64,
    pub latest_start_time: Option<String>,
}

/// Pulls new activities from the provider into the local store.
#[derive(Clone)]
pub struct SyncService {
    provider: Option<Arc<dyn ActivityProvider>>,
    store: ActivityStore,
    page_size: usize,
    /// Two runs racing the same watermark would buffer overlapping batches.
    sync_lock: Arc<Mutex<()>>,
}

impl SyncService {
    /// `provider` is `None` when no Garmin credentials are configured; sync
    /// then fails fast without touching the network.
    pub fn new(
        provider: Option<Arc<dyn ActivityProvider>>,
        store: ActivityStore,
        page_size: usize,
    ) -> Self {
        Self {
            provider,
            store,
            page_size,
            sync_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Run one incremental sync pass.
    ///
    /// The watermark is captured once at the start; every record in the run
    /// is classified against that snapshot. Pagination relies on the
    /// provider returning newest-first: the first record at or below the
    /// watermark ends the whole loop, not just the current page. Nothing is
    /// written until the loop finishes, so a fetch failure mid-run discards
    /// the buffer and leaves the store untouched.
    pub async fn sync(&self) -> Result<SyncResult, SyncError> {
        let _guard = self.sync_lock.lock().await;

        let provider = self
            .provider
            .as_ref()
            .ok_or(SyncError::MissingCredentials(
                "GARMIN_EMAIL and GARMIN_PASSWORD must be set",
            ))?
            .clone();

        provider.login().await?;

        let watermark = self.latest_watermark().await?;
        tracing::info!(watermark = ?watermark, "Starting activity sync");

        let mut pending: Vec<ActivityRow> = Vec::new();
        let mut skipped = 0usize;
        let mut start = 0usize;

        'pages: loop {
            let page = provider.fetch_page(start, self.page_size).await?;
            if page.is_empty() {
                break;
            }
            let fetched = page.len();
            tracing::debug!(start, fetched, "Fetched activity page");

            for record in &page {
                // On first backfill (no watermark) everything is new.
                if let Some(mark) = watermark.as_deref() {
                    match schema::start_time_local(record) {
                        // Strictly newer counts as new
                        Some(started) if started > mark => {}
                        // Equal or older: everything behind it is cached
                        Some(_) => break 'pages,
                        // Cannot be proven newer; stop rather than guess
                        None => {
                            tracing::warn!("Record without startTimeLocal, stopping pagination");
                            break 'pages;
                        }
                    }
                }
                match schema::map_record(record) {
                    Some(row) => pending.push(row),
                    None => {
                        skipped += 1;
                        tracing::warn!("Record without activityId, skipped");
                    }
                }
            }

            start += fetched;
        }

        if skipped > 0 {
            tracing::warn!(skipped, "Skipped records missing an activity id");
        }

        let new_activities = self.commit(pending).await?;
        let total_activities = self.row_count().await?;
        let latest_start_time = self.latest_watermark().await?;

        tracing::info!(
            new_activities,
            total_activities,
            latest = ?latest_start_time,
            "Sync finished"
        );

        Ok(SyncResult {
            new_activities,
            total_activities,
            latest_start_time,
        })
    }

    async fn latest_watermark(&self) -> Result<Option<String>, SyncError> {
        let store = self.store.clone();
        let watermark = tokio::task::spawn_blocking(move || store.latest_watermark()).await??;
        Ok(watermark)
    }

    async fn row_count(&self) -> Result<i64, SyncError> {
        let store = self.store.clone();
        let count = tokio::task::spawn_blocking(move || store.row_count()).await??;
        Ok(count)
    }

    async fn commit(&self, rows: Vec<ActivityRow>) -> Result<usize, SyncError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let store = self.store.clone();
        let written = tokio::task::spawn_blocking(move || store.upsert_batch(&rows)).await??;
        Ok(written)
    }
}
