//! Core Data API Traits
//!
//! The remote endpoint is reached one statement at a time. These traits describe
//! that round trip so the connection manager, state store and migrator never
//! depend on a concrete driver.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};

/// A client that sends single statements to the remote SQL endpoint
#[async_trait]
pub trait DataApiClient: Send + Sync {
    /// Execute a statement and return the affected row count
    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64>;

    /// Execute a statement and return every result row
    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<DatabaseRow>>;
}

/// Builds a [`DataApiClient`] from configuration
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &DatabaseConfig) -> OrmResult<Arc<dyn DataApiClient>>;
}

/// Statement parameter and column value
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Json(JsonValue),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int64(i) => JsonValue::Number((*i).into()),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            DatabaseValue::Json(j) => j.clone(),
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int64(value as i64)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<DateTime<Utc>> for DatabaseValue {
    fn from(value: DateTime<Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<JsonValue> for DatabaseValue {
    fn from(value: JsonValue) -> Self {
        DatabaseValue::Json(value)
    }
}

impl<T: Into<DatabaseValue>> From<Option<T>> for DatabaseValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(DatabaseValue::Null)
    }
}

/// A single result row, columns kept in select order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseRow {
    columns: Vec<(String, DatabaseValue)>,
}

impl DatabaseRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, builder style
    pub fn with(mut self, name: impl Into<String>, value: impl Into<DatabaseValue>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<DatabaseValue>) {
        self.columns.push((name.into(), value.into()));
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Get a column value by name
    pub fn get(&self, name: &str) -> OrmResult<&DatabaseValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
            .ok_or_else(|| OrmError::Query(format!("Column '{}' not found", name)))
    }

    pub fn get_string(&self, name: &str) -> OrmResult<String> {
        match self.get(name)? {
            DatabaseValue::String(s) => Ok(s.clone()),
            other => Err(type_mismatch(name, "string", other)),
        }
    }

    /// Timestamps arrive either typed or as RFC 3339 text depending on the column type
    pub fn get_datetime(&self, name: &str) -> OrmResult<DateTime<Utc>> {
        match self.get(name)? {
            DatabaseValue::DateTime(dt) => Ok(*dt),
            DatabaseValue::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| OrmError::Query(format!("Column '{}' is not a timestamp: {}", name, e))),
            other => Err(type_mismatch(name, "timestamp", other)),
        }
    }

    /// Convert row to a JSON object
    pub fn to_json(&self) -> JsonValue {
        let map = self
            .columns
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        JsonValue::Object(map)
    }
}

fn type_mismatch(column: &str, expected: &str, found: &DatabaseValue) -> OrmError {
    OrmError::Query(format!(
        "Column '{}' expected {}, found {:?}",
        column, expected, found
    ))
}
