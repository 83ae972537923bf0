//! Application configuration loaded from environment variables.
//!
//! Garmin credentials are optional at startup: the query side of the API
//! works against an existing cache without them, and the sync side reports
//! a configuration error when they are needed but absent.

use std::env;
use std::path::PathBuf;

/// Garmin Connect login pair.
#[derive(Debug, Clone)]
pub struct GarminCredentials {
    pub email: String,
    pub password: String,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the sqlite activity cache
    pub database_path: PathBuf,
    /// Server port
    pub port: u16,
    /// Maximum accepted query length, in characters
    pub query_max_len: usize,
    /// Activities requested per page during sync
    pub page_size: usize,
    /// Garmin Connect credentials, if configured
    pub garmin: Option<GarminCredentials>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("garmin_activities.db"),
            port: 8080,
            query_max_len: 10_000,
            page_size: 100,
            garmin: Some(GarminCredentials {
                email: "athlete@example.com".to_string(),
                password: "test_password".to_string(),
            }),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Setting exactly one of GARMIN_EMAIL / GARMIN_PASSWORD is treated as a
    /// configuration mistake rather than "no credentials".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let garmin = match (env::var("GARMIN_EMAIL"), env::var("GARMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some(GarminCredentials {
                email: email.trim().to_string(),
                password: password.trim().to_string(),
            }),
            (Err(_), Err(_)) => None,
            (Ok(_), Err(_)) => return Err(ConfigError::Missing("GARMIN_PASSWORD")),
            (Err(_), Ok(_)) => return Err(ConfigError::Missing("GARMIN_EMAIL")),
        };

        Ok(Self {
            database_path: env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("garmin_activities.db")),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            query_max_len: env::var("QUERY_MAX_LEN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000),
            page_size: env::var("SYNC_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            garmin,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
