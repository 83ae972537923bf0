// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Schema registry mapping Garmin Connect activity records to table rows.
//!
//! One ordered list of column entries drives everything: the CREATE TABLE
//! statement, the upsert column list, and the per-record value extraction.
//! Tracking a new metric means appending one entry here.

use rusqlite::types::Value as SqlValue;
use serde_json::Value as JsonValue;

/// Table holding the cached activities.
pub const ACTIVITIES_TABLE: &str = "activities";

/// Column type in the local table, also the coercion rule for remote values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
}

impl SqlType {
    fn ddl(self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
        }
    }
}

/// One registry entry: local column name, its type, and the path of the
/// source value inside a remote activity record. Paths are stored pre-split
/// so nothing is re-parsed per record.
#[derive(Debug, Clone, Copy)]
pub struct SchemaColumn {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub path: &'static [&'static str],
    pub primary_key: bool,
}

impl SchemaColumn {
    /// Pluck this column's value out of a remote record. Absent segments
    /// yield `None`; absence is not an error.
    pub fn extract<'a>(&self, record: &'a JsonValue) -> Option<&'a JsonValue> {
        extract_path(record, self.path)
    }
}

const fn col(
    name: &'static str,
    sql_type: SqlType,
    path: &'static [&'static str],
) -> SchemaColumn {
    SchemaColumn {
        name,
        sql_type,
        path,
        primary_key: false,
    }
}

const fn pk(
    name: &'static str,
    sql_type: SqlType,
    path: &'static [&'static str],
) -> SchemaColumn {
    SchemaColumn {
        name,
        sql_type,
        path,
        primary_key: true,
    }
}

// Paths also used by the sync engine's classifier.
const ACTIVITY_ID_PATH: &[&str] = &["activityId"];
const START_TIME_LOCAL_PATH: &[&str] = &["startTimeLocal"];

/// The registry. `activity_id` stays first and is the only primary key;
/// `start_time_local` is the sync watermark.
pub const COLUMNS: &[SchemaColumn] = &[
    pk("activity_id", SqlType::Integer, ACTIVITY_ID_PATH),
    col("activity_name", SqlType::Text, &["activityName"]),
    col("activity_type", SqlType::Text, &["activityType", "typeKey"]),
    col("event_type", SqlType::Text, &["eventType", "typeKey"]),
    col("start_time_local", SqlType::Text, START_TIME_LOCAL_PATH),
    col("start_time_gmt", SqlType::Text, &["startTimeGMT"]),
    col("distance", SqlType::Real, &["distance"]),
    col("duration", SqlType::Real, &["duration"]),
    col("elapsed_duration", SqlType::Real, &["elapsedDuration"]),
    col("moving_duration", SqlType::Real, &["movingDuration"]),
    col("average_speed", SqlType::Real, &["averageSpeed"]),
    col("max_speed", SqlType::Real, &["maxSpeed"]),
    col("calories", SqlType::Real, &["calories"]),
    col("average_hr", SqlType::Real, &["averageHR"]),
    col("max_hr", SqlType::Real, &["maxHR"]),
    col(
        "average_running_cadence",
        SqlType::Real,
        &["averageRunningCadenceInStepsPerMinute"],
    ),
    col(
        "max_running_cadence",
        SqlType::Real,
        &["maxRunningCadenceInStepsPerMinute"],
    ),
    col("steps", SqlType::Integer, &["steps"]),
    col("avg_power", SqlType::Real, &["avgPower"]),
    col("max_power", SqlType::Real, &["maxPower"]),
    col(
        "aerobic_training_effect",
        SqlType::Real,
        &["aerobicTrainingEffect"],
    ),
    col(
        "anaerobic_training_effect",
        SqlType::Real,
        &["anaerobicTrainingEffect"],
    ),
    col("elevation_gain", SqlType::Real, &["elevationGain"]),
    col("elevation_loss", SqlType::Real, &["elevationLoss"]),
    col("vo2max_value", SqlType::Real, &["vO2MaxValue"]),
    col("location_name", SqlType::Text, &["locationName"]),
    col("device_id", SqlType::Integer, &["deviceId"]),
];

/// One activity mapped to SQL values, positionally matching [`COLUMNS`].
#[derive(Debug, Clone)]
pub struct ActivityRow {
    pub values: Vec<SqlValue>,
}

/// Build the idempotent table DDL from the registry.
pub fn create_table_sql() -> String {
    let columns: Vec<String> = COLUMNS
        .iter()
        .map(|c| {
            if c.primary_key {
                format!("{} {} PRIMARY KEY", c.name, c.sql_type.ddl())
            } else {
                format!("{} {}", c.name, c.sql_type.ddl())
            }
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        ACTIVITIES_TABLE,
        columns.join(", ")
    )
}

/// Build the upsert statement (insert-or-replace by primary key).
pub fn insert_sql() -> String {
    let names: Vec<&str> = COLUMNS.iter().map(|c| c.name).collect();
    let placeholders: Vec<String> = (1..=COLUMNS.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        ACTIVITIES_TABLE,
        names.join(", "),
        placeholders.join(", ")
    )
}

/// Walk a pre-split path through nested objects.
fn extract_path<'a>(record: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut current = record;
    for segment in path {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Remote activity id, if the record carries a usable one.
pub fn activity_id(record: &JsonValue) -> Option<i64> {
    extract_path(record, ACTIVITY_ID_PATH)?.as_i64()
}

/// Remote start time (local), the watermark field.
pub fn start_time_local(record: &JsonValue) -> Option<&str> {
    extract_path(record, START_TIME_LOCAL_PATH)?.as_str()
}

/// Map a remote record to a positional row.
///
/// Returns `None` when the record has no usable activity id: a NULL INTEGER
/// PRIMARY KEY would make sqlite invent a rowid, and ids must come from the
/// remote source.
pub fn map_record(record: &JsonValue) -> Option<ActivityRow> {
    activity_id(record)?;
    let values = COLUMNS
        .iter()
        .map(|c| coerce(c.extract(record), c.sql_type))
        .collect();
    Some(ActivityRow { values })
}

/// Coerce a remote JSON value into the column's SQL type. Missing values,
/// JSON nulls, and type mismatches all map to NULL.
fn coerce(value: Option<&JsonValue>, ty: SqlType) -> SqlValue {
    let Some(value) = value else {
        return SqlValue::Null;
    };
    match ty {
        SqlType::Integer => value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f as i64))
            .map(SqlValue::Integer)
            .unwrap_or(SqlValue::Null),
        SqlType::Real => value
            .as_f64()
            .map(SqlValue::Real)
            .unwrap_or(SqlValue::Null),
        SqlType::Text => value
            .as_str()
            .map(|s| SqlValue::Text(s.to_string()))
            .unwrap_or(SqlValue::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record() -> JsonValue {
        json!({
            "activityId": 42,
            "activityName": "Morning Run",
            "activityType": { "typeKey": "running" },
            "startTimeLocal": "2026-05-01 06:30:00",
            "distance": 10512.3,
            "steps": 11873.0,
            "averageHR": 148
        })
    }

    #[test]
    fn test_extract_nested_path() {
        let record = sample_record();
        let column = COLUMNS
            .iter()
            .find(|c| c.name == "activity_type")
            .expect("activity_type column");
        assert_eq!(
            column.extract(&record).and_then(|v| v.as_str()),
            Some("running")
        );
    }

    #[test]
    fn test_extract_missing_path_is_none() {
        let record = sample_record();
        let column = COLUMNS
            .iter()
            .find(|c| c.name == "vo2max_value")
            .expect("vo2max_value column");
        assert!(column.extract(&record).is_none());
    }

    #[test]
    fn test_map_record_covers_all_columns() {
        let row = map_record(&sample_record()).expect("record should map");
        assert_eq!(row.values.len(), COLUMNS.len());
        assert_eq!(row.values[0], SqlValue::Integer(42));
        // Missing metrics become NULL, not errors
        let vo2_index = COLUMNS
            .iter()
            .position(|c| c.name == "vo2max_value")
            .unwrap();
        assert_eq!(row.values[vo2_index], SqlValue::Null);
    }

    #[test]
    fn test_map_record_without_id_is_none() {
        let record = json!({ "activityName": "orphan", "startTimeLocal": "2026-05-01 06:30:00" });
        assert!(map_record(&record).is_none());
    }

    #[test]
    fn test_coercion_rules() {
        let record = sample_record();
        let row = map_record(&record).unwrap();

        // Fractional step counts (Garmin reports them as floats) truncate
        let steps_index = COLUMNS.iter().position(|c| c.name == "steps").unwrap();
        assert_eq!(row.values[steps_index], SqlValue::Integer(11873));

        // Integral heart rates land in REAL columns as floats
        let hr_index = COLUMNS.iter().position(|c| c.name == "average_hr").unwrap();
        assert_eq!(row.values[hr_index], SqlValue::Real(148.0));
    }

    #[test]
    fn test_classifier_accessors() {
        let record = sample_record();
        assert_eq!(activity_id(&record), Some(42));
        assert_eq!(start_time_local(&record), Some("2026-05-01 06:30:00"));
        assert_eq!(activity_id(&json!({})), None);
        assert_eq!(start_time_local(&json!({ "startTimeLocal": 7 })), None);
    }

    #[test]
    fn test_create_table_sql_shape() {
        let sql = create_table_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS activities ("));
        assert_eq!(sql.matches("PRIMARY KEY").count(), 1);
        assert!(sql.contains("activity_id INTEGER PRIMARY KEY"));
        assert!(sql.contains("start_time_local TEXT"));
    }

    #[test]
    fn test_insert_sql_placeholder_count() {
        let sql = insert_sql();
        assert!(sql.starts_with("INSERT OR REPLACE INTO activities ("));
        assert_eq!(sql.matches('?').count(), COLUMNS.len());
    }

    #[test]
    fn test_registry_names_unique() {
        let mut seen = std::collections::HashSet::new();
        for column in COLUMNS {
            assert!(seen.insert(column.name), "duplicate column: {}", column.name);
        }
    }
}
