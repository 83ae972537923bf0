// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod garmin;
pub mod query;
pub mod sync;

pub use garmin::{ActivityProvider, GarminClient};
pub use query::{QueryGateway, QueryRejected};
pub use sync::{SyncResult, SyncService};
