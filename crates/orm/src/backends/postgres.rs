//! PostgreSQL Data API Implementation
//!
//! Sends statements over a small sqlx pool. `statement_timeout` is set on every
//! session so a slow statement comes back as SQLSTATE 57014, which the retry
//! layer treats as a timeout.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row, TypeInfo, ValueRef};

use super::core::*;
use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};

/// Builds [`PostgresClient`]s
#[derive(Debug, Default)]
pub struct PostgresConnector;

impl PostgresConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn connect(&self, config: &DatabaseConfig) -> OrmResult<Arc<dyn DataApiClient>> {
        let options = PgConnectOptions::from_str(&config.database_url)
            .map_err(|e| OrmError::ConnectionInit(format!("Invalid database URL: {}", e)))?
            .options([("statement_timeout", config.statement_timeout_ms.to_string())]);

        tracing::debug!(
            "Creating PostgreSQL pool: max_connections={}, statement_timeout={}ms",
            config.max_connections,
            config.statement_timeout_ms
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.statement_timeout_ms))
            .connect_with(options)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create PostgreSQL pool: {}", e);
                OrmError::ConnectionInit(format!("Failed to create PostgreSQL pool: {}", e))
            })?;

        Ok(Arc::new(PostgresClient::new(pool)))
    }
}

/// PostgreSQL client
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DataApiClient for PostgresClient {
    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_database_value(query, param);
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<DatabaseRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_database_value(query, param);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(postgres_row_to_database_row).collect()
    }
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &DatabaseValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::DateTime(dt) => query.bind(*dt),
        DatabaseValue::Json(j) => query.bind(j.clone()),
    }
}

fn postgres_row_to_database_row(row: &PgRow) -> OrmResult<DatabaseRow> {
    let mut converted = DatabaseRow::new();
    for (index, column) in row.columns().iter().enumerate() {
        converted.push(column.name(), postgres_value(row, index)?);
    }
    Ok(converted)
}

/// Convert a PostgreSQL column value to DatabaseValue
fn postgres_value(row: &PgRow, index: usize) -> OrmResult<DatabaseValue> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();

    let value = match type_name.as_str() {
        "BOOL" => DatabaseValue::Bool(row.try_get(index)?),
        "INT2" => DatabaseValue::Int64(row.try_get::<i16, _>(index)? as i64),
        "INT4" => DatabaseValue::Int64(row.try_get::<i32, _>(index)? as i64),
        "INT8" => DatabaseValue::Int64(row.try_get(index)?),
        "FLOAT4" => DatabaseValue::Float64(row.try_get::<f32, _>(index)? as f64),
        "FLOAT8" => DatabaseValue::Float64(row.try_get(index)?),
        "TIMESTAMPTZ" => DatabaseValue::DateTime(row.try_get::<DateTime<Utc>, _>(index)?),
        "TIMESTAMP" => {
            let naive: NaiveDateTime = row.try_get(index)?;
            DatabaseValue::DateTime(DateTime::from_naive_utc_and_offset(naive, Utc))
        }
        "JSON" | "JSONB" => DatabaseValue::Json(row.try_get::<JsonValue, _>(index)?),
        _ => {
            let value: String = row.try_get(index).map_err(|e| {
                OrmError::Query(format!(
                    "Failed to read column of type '{}' as text: {}",
                    type_name, e
                ))
            })?;
            DatabaseValue::String(value)
        }
    };

    Ok(value)
}
