// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use garmin_cache::config::Config;
use garmin_cache::db::ActivityStore;
use garmin_cache::routes::create_router;
use garmin_cache::services::garmin::{ActivityProvider, ProviderError};
use garmin_cache::services::{QueryGateway, SyncService};
use garmin_cache::AppState;
use serde_json::{json, Value as JsonValue};
use tempfile::TempDir;

/// Build a Garmin-shaped activity record.
#[allow(dead_code)]
pub fn activity(id: i64, start_time_local: &str) -> JsonValue {
    json!({
        "activityId": id,
        "activityName": format!("Activity {id}"),
        "activityType": { "typeKey": "running" },
        "startTimeLocal": start_time_local,
        "startTimeGMT": start_time_local,
        "distance": 5000.0 + id as f64,
        "duration": 1800.0,
        "calories": 400.0,
        "averageHR": 140,
    })
}

/// Same record with an explicit calories value, for upsert and staleness
/// assertions.
#[allow(dead_code)]
pub fn activity_with_calories(id: i64, start_time_local: &str, calories: f64) -> JsonValue {
    let mut record = activity(id, start_time_local);
    record["calories"] = json!(calories);
    record
}

/// One scripted `fetch_page` outcome.
#[allow(dead_code)]
pub enum FakePage {
    Records(Vec<JsonValue>),
    Error(String),
}

/// Scripted stand-in for Garmin Connect.
///
/// Pages are served in script order; an exhausted script serves empty
/// pages. The fetch counter lets tests assert how far pagination actually
/// went.
pub struct FakeProvider {
    script: Mutex<VecDeque<FakePage>>,
    login_failure: Option<String>,
    pages_fetched: AtomicUsize,
}

#[allow(dead_code)]
impl FakeProvider {
    pub fn new(pages: Vec<Vec<JsonValue>>) -> Arc<Self> {
        Self::with_script(pages.into_iter().map(FakePage::Records).collect())
    }

    pub fn with_script(script: Vec<FakePage>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            login_failure: None,
            pages_fetched: AtomicUsize::new(0),
        })
    }

    pub fn with_failing_login(message: &str) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            login_failure: Some(message.to_string()),
            pages_fetched: AtomicUsize::new(0),
        })
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActivityProvider for FakeProvider {
    async fn login(&self) -> Result<(), ProviderError> {
        match &self.login_failure {
            Some(message) => Err(ProviderError::Auth(message.clone())),
            None => Ok(()),
        }
    }

    async fn fetch_page(
        &self,
        _start: usize,
        _limit: usize,
    ) -> Result<Vec<JsonValue>, ProviderError> {
        self.pages_fetched.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(FakePage::Records(records)) => Ok(records),
            Some(FakePage::Error(message)) => Err(ProviderError::Fetch(message)),
            None => Ok(Vec::new()),
        }
    }
}

/// Scratch store in a temp directory. Keep the TempDir alive for the test.
#[allow(dead_code)]
pub fn scratch_store() -> (TempDir, ActivityStore) {
    let dir = TempDir::new().expect("tempdir");
    let store = ActivityStore::open(dir.path().join("activities.db")).expect("open store");
    (dir, store)
}

/// Test app over a scratch store and the given provider.
/// Returns the router, the shared state, and the temp dir keeping the
/// store's file alive.
#[allow(dead_code)]
pub fn create_test_app(
    provider: Option<Arc<dyn ActivityProvider>>,
) -> (axum::Router, Arc<AppState>, TempDir) {
    let (dir, store) = scratch_store();
    let mut config = Config::default();
    if provider.is_none() {
        config.garmin = None;
    }
    let sync = SyncService::new(provider, store.clone(), config.page_size);
    let gateway = QueryGateway::new(store.clone(), config.query_max_len);

    let state = Arc::new(AppState {
        config,
        store,
        sync,
        gateway,
    });

    (create_router(state.clone()), state, dir)
}
