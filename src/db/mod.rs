// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (local sqlite cache).

pub mod store;

pub use store::{ActivityStore, QueryOutput, StoreError, TableInfo};
