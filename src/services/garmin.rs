// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Garmin Connect API client for listing activities.
//!
//! Handles:
//! - Session login with in-memory caching
//! - Paginated activity listing (newest first)
//! - Auth and rate-limit triage

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;

use crate::config::GarminCredentials;

/// Errors from the remote activity provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Fetch(String),
}

/// The remote source of activity records.
///
/// `fetch_page` must return records newest first; the sync engine's stop
/// rule depends on that order. Records are opaque JSON objects; only the
/// fields named in the schema registry are read from them.
#[async_trait]
pub trait ActivityProvider: Send + Sync {
    /// Establish a session with the provider.
    async fn login(&self) -> Result<(), ProviderError>;

    /// Fetch one page of activities at `start`, at most `limit` records.
    async fn fetch_page(&self, start: usize, limit: usize)
        -> Result<Vec<JsonValue>, ProviderError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// GarminClient - HTTP client with session management
// ─────────────────────────────────────────────────────────────────────────────

/// Margin before session expiration when we proactively re-login (5 minutes).
const SESSION_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Cached session token with expiry information.
#[derive(Clone)]
struct CachedSession {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Garmin Connect client.
///
/// The session token is cached in memory and shared across clones; re-login
/// happens behind a write lock so concurrent callers do not race duplicate
/// login requests.
#[derive(Clone)]
pub struct GarminClient {
    http: reqwest::Client,
    base_url: String,
    credentials: GarminCredentials,
    session: Arc<RwLock<Option<CachedSession>>>,
}

impl GarminClient {
    /// Create a new Garmin client with login credentials.
    pub fn new(credentials: GarminCredentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://connectapi.garmin.com".to_string(),
            credentials,
            session: Arc::new(RwLock::new(None)),
        }
    }

    /// Get a valid session token, logging in if none is cached or the
    /// cached one is expiring.
    async fn valid_token(&self) -> Result<String, ProviderError> {
        let now = Utc::now();
        let margin = Duration::seconds(SESSION_REFRESH_MARGIN_SECS);

        // Fast path - no login round-trip
        {
            let session = self.session.read().await;
            if let Some(cached) = session.as_ref() {
                if now + margin < cached.expires_at {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let mut session = self.session.write().await;
        // Re-check after acquiring the lock; another task may have logged in
        if let Some(cached) = session.as_ref() {
            if now + margin < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        let fresh = self.authenticate().await?;
        let token = fresh.access_token.clone();
        *session = Some(fresh);
        Ok(token)
    }

    /// Log in with the configured credentials and build a session.
    async fn authenticate(&self) -> Result<CachedSession, ProviderError> {
        let url = format!("{}/auth/login", self.base_url);
        let body = serde_json::json!({
            "username": self.credentials.email,
            "password": self.credentials.password,
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Fetch(format!("Login request failed: {}", e)))?;

        let session: SessionResponse = self.check_response_json(response).await?;

        tracing::info!("Garmin session established");
        Ok(CachedSession {
            access_token: session.access_token,
            expires_at: Utc::now() + Duration::seconds(session.expires_in),
        })
    }

    /// List activities, newest first, starting at `start`.
    async fn list_activities(
        &self,
        access_token: &str,
        start: usize,
        limit: usize,
    ) -> Result<Vec<JsonValue>, ProviderError> {
        let url = format!(
            "{}/activitylist-service/activities/search/activities",
            self.base_url
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("start", start.to_string()), ("limit", limit.to_string())])
            .send()
            .await
            .map_err(|e| ProviderError::Fetch(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Check response status and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            // Credential mismatch vs provider-side block: callers get told which
            if status.as_u16() == 401 {
                return Err(ProviderError::Auth(
                    "Garmin rejected the login (check GARMIN_EMAIL / GARMIN_PASSWORD)".to_string(),
                ));
            }
            if status.as_u16() == 403 {
                return Err(ProviderError::Auth(
                    "Garmin refused the request (account locked or blocked by the provider)"
                        .to_string(),
                ));
            }
            if status.as_u16() == 429 {
                tracing::warn!("Garmin rate limit hit (429)");
                return Err(ProviderError::Fetch(
                    "Garmin rate limit exceeded, retry later".to_string(),
                ));
            }

            return Err(ProviderError::Fetch(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Fetch(format!("JSON parse error: {}", e)))
    }
}

#[async_trait]
impl ActivityProvider for GarminClient {
    async fn login(&self) -> Result<(), ProviderError> {
        self.valid_token().await.map(|_| ())
    }

    async fn fetch_page(
        &self,
        start: usize,
        limit: usize,
    ) -> Result<Vec<JsonValue>, ProviderError> {
        let access_token = self.valid_token().await?;
        self.list_activities(&access_token, start, limit).await
    }
}

/// Session response from Garmin login.
#[derive(Debug, Clone, Deserialize)]
struct SessionResponse {
    access_token: String,
    expires_in: i64,
}
