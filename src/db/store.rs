// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local sqlite cache of Garmin activities.
//!
//! The store owns the on-disk file and the two access modes: read-write
//! connections for the sync engine and strictly read-only connections for
//! the query gateway. Connections are opened per operation; the handle kept
//! on [`ActivityStore`] is just the path.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::schema::{self, ActivityRow};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to initialize store at {path}: {source}")]
    Init {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("batch upsert of {attempted} activities failed: {source}")]
    Write {
        attempted: usize,
        #[source]
        source: rusqlite::Error,
    },

    #[error("store read failed: {0}")]
    Read(#[from] rusqlite::Error),

    /// The engine compiled the statement as something other than a pure
    /// data read. Raised before a single row is touched.
    #[error("statement is not read-only")]
    NotReadOnly,
}

/// Result rows of one gated query, already mapped to JSON scalars.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
}

impl QueryOutput {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// One entry of the store's table introspection.
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub definition: String,
}

/// Handle to the on-disk cache. Cloning is cheap; connections are opened
/// per operation.
#[derive(Debug, Clone)]
pub struct ActivityStore {
    path: PathBuf,
}

impl ActivityStore {
    /// Open the store, creating the database file and the activities table
    /// if they do not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { path: path.into() };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Idempotent table creation from the schema registry.
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        let init = |path: &Path| -> rusqlite::Result<()> {
            let conn = Connection::open(path)?;
            conn.execute_batch(&format!(
                "PRAGMA journal_mode=WAL;\nPRAGMA synchronous=NORMAL;\n{};",
                schema::create_table_sql()
            ))
        };
        init(&self.path).map_err(|source| StoreError::Init {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Newest `start_time_local` in the cache, or `None` when empty.
    /// Timestamps sort lexicographically, so MAX is the newest.
    pub fn latest_watermark(&self) -> Result<Option<String>, StoreError> {
        let conn = self.read_connection()?;
        let watermark = conn.query_row(
            &format!(
                "SELECT MAX(start_time_local) FROM {}",
                schema::ACTIVITIES_TABLE
            ),
            [],
            |row| row.get::<_, Option<String>>(0),
        )?;
        Ok(watermark)
    }

    pub fn row_count(&self) -> Result<i64, StoreError> {
        let conn = self.read_connection()?;
        let count = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", schema::ACTIVITIES_TABLE),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Write a batch of mapped rows in one transaction. Either every row
    /// commits or none do; a failure mid-batch rolls back the whole run.
    pub fn upsert_batch(&self, rows: &[ActivityRow]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut conn = self.write_connection().map_err(|source| StoreError::Write {
            attempted: rows.len(),
            source,
        })?;
        let write_all = |conn: &mut Connection| -> rusqlite::Result<()> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            {
                let mut stmt = tx.prepare(&schema::insert_sql())?;
                for row in rows {
                    stmt.execute(rusqlite::params_from_iter(row.values.iter()))?;
                }
            }
            tx.commit()
        };
        write_all(&mut conn).map_err(|source| StoreError::Write {
            attempted: rows.len(),
            source,
        })?;
        Ok(rows.len())
    }

    /// Table names and their CREATE statements, for schema introspection.
    pub fn table_definitions(&self) -> Result<Vec<TableInfo>, StoreError> {
        let conn = self.read_connection()?;
        let mut stmt = conn.prepare(
            "SELECT name, sql FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let tables = stmt
            .query_map([], |row| {
                Ok(TableInfo {
                    name: row.get(0)?,
                    definition: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tables)
    }

    /// Run one statement on a fresh read-only connection and collect the
    /// rows. The connection is dropped on every exit path.
    ///
    /// Two layers of enforcement: the sqlite handle itself is opened
    /// read-only, and the compiled statement must report itself as a pure
    /// data read before it is stepped.
    pub fn execute_readonly(&self, sql: &str) -> Result<QueryOutput, StoreError> {
        let conn = self.read_connection()?;
        let mut stmt = conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(StoreError::NotReadOnly);
        }
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut out = Vec::new();
        let mut rows = stmt.query([]).map_err(readonly_or_read)?;
        while let Some(row) = rows.next().map_err(readonly_or_read)? {
            let mut object = serde_json::Map::new();
            for (i, name) in columns.iter().enumerate() {
                object.insert(name.clone(), to_json(row.get_ref(i)?));
            }
            out.push(object);
        }
        Ok(QueryOutput { columns, rows: out })
    }

    fn write_connection(&self) -> rusqlite::Result<Connection> {
        Connection::open(&self.path)
    }

    fn read_connection(&self) -> rusqlite::Result<Connection> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
    }
}

/// A write slipping past the statement check still hits the read-only file
/// handle; report that as the same rejection instead of a generic failure.
fn readonly_or_read(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(cause, _)
            if cause.code == rusqlite::ErrorCode::ReadOnly =>
        {
            StoreError::NotReadOnly
        }
        _ => StoreError::Read(err),
    }
}

fn to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(t) => JsonValue::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => JsonValue::String(BASE64.encode(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::types::Value as SqlValue;
    use serde_json::json;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, ActivityStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = ActivityStore::open(dir.path().join("activities.db")).expect("open store");
        (dir, store)
    }

    fn record(id: i64, start: &str, calories: f64) -> serde_json::Value {
        json!({
            "activityId": id,
            "activityName": format!("activity {id}"),
            "startTimeLocal": start,
            "calories": calories,
        })
    }

    fn row(id: i64, start: &str, calories: f64) -> ActivityRow {
        schema::map_record(&record(id, start, calories)).expect("mappable record")
    }

    #[test]
    fn test_open_is_idempotent() {
        let (dir, store) = temp_store();
        assert_eq!(store.row_count().unwrap(), 0);
        assert_eq!(store.latest_watermark().unwrap(), None);

        // Reopening the same file must not disturb existing data
        store
            .upsert_batch(&[row(1, "2026-01-02 07:00:00", 100.0)])
            .unwrap();
        let reopened = ActivityStore::open(dir.path().join("activities.db")).unwrap();
        assert_eq!(reopened.row_count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_batch_is_idempotent() {
        let (_dir, store) = temp_store();
        let batch = vec![
            row(1, "2026-01-02 07:00:00", 100.0),
            row(2, "2026-01-03 07:00:00", 200.0),
        ];
        assert_eq!(store.upsert_batch(&batch).unwrap(), 2);
        assert_eq!(store.upsert_batch(&batch).unwrap(), 2);
        assert_eq!(store.row_count().unwrap(), 2);
        assert_eq!(
            store.latest_watermark().unwrap().as_deref(),
            Some("2026-01-03 07:00:00")
        );
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let (_dir, store) = temp_store();
        store
            .upsert_batch(&[row(42, "2026-01-02 07:00:00", 300.0)])
            .unwrap();
        store
            .upsert_batch(&[row(42, "2026-01-02 07:00:00", 310.0)])
            .unwrap();
        assert_eq!(store.row_count().unwrap(), 1);

        let out = store
            .execute_readonly("SELECT calories FROM activities WHERE activity_id = 42")
            .unwrap();
        assert_eq!(out.rows[0]["calories"], json!(310.0));
    }

    #[test]
    fn test_failed_batch_rolls_back_completely() {
        let (_dir, store) = temp_store();
        // Text in the INTEGER PRIMARY KEY column fails the datatype check,
        // after the first row of the batch already executed.
        let mut bad = row(7, "2026-01-05 07:00:00", 50.0);
        bad.values[0] = SqlValue::Text("not-an-id".into());
        let batch = vec![row(6, "2026-01-04 07:00:00", 40.0), bad];

        let err = store.upsert_batch(&batch).unwrap_err();
        match err {
            StoreError::Write { attempted, .. } => assert_eq!(attempted, 2),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.row_count().unwrap(), 0);
        assert_eq!(store.latest_watermark().unwrap(), None);
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let (_dir, store) = temp_store();
        assert_eq!(store.upsert_batch(&[]).unwrap(), 0);
        assert_eq!(store.row_count().unwrap(), 0);
    }

    #[test]
    fn test_execute_readonly_returns_rows() {
        let (_dir, store) = temp_store();
        store
            .upsert_batch(&[
                row(1, "2026-01-02 07:00:00", 100.0),
                row(2, "2026-01-03 07:00:00", 200.0),
            ])
            .unwrap();

        let out = store
            .execute_readonly(
                "SELECT activity_id, activity_name FROM activities ORDER BY activity_id",
            )
            .unwrap();
        assert_eq!(out.columns, vec!["activity_id", "activity_name"]);
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.rows[0]["activity_id"], json!(1));
        assert_eq!(out.rows[1]["activity_name"], json!("activity 2"));
    }

    #[test]
    fn test_execute_readonly_rejects_writes() {
        let (_dir, store) = temp_store();
        store
            .upsert_batch(&[row(1, "2026-01-02 07:00:00", 100.0)])
            .unwrap();

        let err = store.execute_readonly("DELETE FROM activities").unwrap_err();
        assert!(matches!(err, StoreError::NotReadOnly));
        assert_eq!(store.row_count().unwrap(), 1);
    }

    #[test]
    fn test_table_definitions_lists_activities() {
        let (_dir, store) = temp_store();
        let tables = store.table_definitions().unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "activities");
        assert!(tables[0].definition.contains("activity_id INTEGER PRIMARY KEY"));
    }
}
