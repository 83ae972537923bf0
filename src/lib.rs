// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Garmin-Cache: a local, queryable cache of Garmin Connect activities.
//!
//! This crate provides the backend API for incrementally syncing Garmin
//! activities into a local sqlite cache and running read-only SQL against
//! that cache through a gated query interface.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod schema;
pub mod services;

use config::Config;
use db::ActivityStore;
use services::{QueryGateway, SyncService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: ActivityStore,
    pub sync: SyncService,
    pub gateway: QueryGateway,
}
