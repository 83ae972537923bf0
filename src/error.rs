// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::db::StoreError;
use crate::services::garmin::ProviderError;
use crate::services::query::{QueryError, QueryRejected};
use crate::services::sync::SyncError;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Garmin authentication failed: {0}")]
    Auth(String),

    #[error("Garmin fetch failed: {0}")]
    Fetch(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Query rejected: {0}")]
    Query(#[from] QueryRejected),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::MissingCredentials(msg) => AppError::Config(msg.to_string()),
            SyncError::Provider(ProviderError::Auth(msg)) => AppError::Auth(msg),
            SyncError::Provider(ProviderError::Fetch(msg)) => AppError::Fetch(msg),
            SyncError::Store(err) => AppError::Store(err),
            SyncError::Join(err) => AppError::Internal(anyhow::anyhow!(err)),
        }
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Rejected(reason) => AppError::Query(reason),
            QueryError::BadSql(msg) => AppError::BadRequest(msg),
            QueryError::Store(err) => AppError::Store(err),
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                Some(msg.clone()),
            ),
            AppError::Auth(msg) => (
                StatusCode::BAD_GATEWAY,
                "garmin_auth_failed",
                Some(msg.clone()),
            ),
            AppError::Fetch(msg) => (
                StatusCode::BAD_GATEWAY,
                "garmin_fetch_failed",
                Some(msg.clone()),
            ),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Query(reason) => (
                StatusCode::BAD_REQUEST,
                "query_rejected",
                Some(reason.to_string()),
            ),
            AppError::Store(err) => {
                tracing::error!(error = %err, "Store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
