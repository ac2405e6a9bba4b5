//! Tracking table access
//!
//! One row per applied migration. Every query runs under the store's retry
//! policy, which defaults to the connection handle's.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use super::definitions::MigrationRecord;
use crate::backends::DatabaseValue;
use crate::config::validate_table_name;
use crate::connection::ConnectionHandle;
use crate::error::OrmResult;
use crate::retry::{RetryExecutor, RetryPolicy};

/// Persists which migrations have been applied
#[derive(Debug, Clone)]
pub struct MigrationStateStore {
    handle: Arc<ConnectionHandle>,
    table: String,
    retry: RetryExecutor,
}

impl MigrationStateStore {
    /// Fails with a configuration error unless `table` is a plain SQL identifier
    pub fn new(handle: Arc<ConnectionHandle>, table: impl Into<String>) -> OrmResult<Self> {
        let table = table.into();
        validate_table_name(&table)?;

        let retry = RetryExecutor::new(*handle.retry_policy());
        Ok(Self {
            handle,
            table,
            retry,
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryExecutor::new(policy);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the tracking table if it does not exist
    pub async fn ensure_table(&self) -> OrmResult<()> {
        let sql = self.create_table_sql();
        self.retry
            .run(|| self.handle.execute(&sql, &[]))
            .await?;
        Ok(())
    }

    /// Executed migrations, ascending by name
    pub async fn list_executed(&self) -> OrmResult<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT name, executed_at FROM {} ORDER BY name ASC",
            self.table
        );
        let rows = self
            .retry
            .run(|| self.handle.fetch_all(&sql, &[]))
            .await?;

        let mut records = rows
            .iter()
            .map(|row| {
                Ok(MigrationRecord {
                    name: row.get_string("name")?,
                    executed_at: row.get_datetime("executed_at")?,
                })
            })
            .collect::<OrmResult<Vec<_>>>()?;

        // Server collation may not order names bytewise
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    /// Insert the record for a migration whose up step just succeeded
    pub async fn record_applied(&self, name: &str) -> OrmResult<MigrationRecord> {
        let record = MigrationRecord {
            name: name.to_string(),
            executed_at: Utc::now(),
        };
        let sql = format!(
            "INSERT INTO {} (name, executed_at) VALUES ($1, $2)",
            self.table
        );
        let params = [
            DatabaseValue::from(record.name.as_str()),
            DatabaseValue::from(record.executed_at),
        ];

        self.retry
            .run(|| self.handle.execute(&sql, &params))
            .await?;

        debug!(migration = name, "Recorded migration as applied");
        Ok(record)
    }

    /// Delete the record for a migration whose down step just succeeded
    pub async fn record_reverted(&self, name: &str) -> OrmResult<()> {
        let sql = format!("DELETE FROM {} WHERE name = $1", self.table);
        let params = [DatabaseValue::from(name)];

        self.retry
            .run(|| self.handle.execute(&sql, &params))
            .await?;

        debug!(migration = name, "Recorded migration as reverted");
        Ok(())
    }

    fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                name VARCHAR(255) NOT NULL PRIMARY KEY,\n    \
                executed_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP\n\
            )",
            self.table
        )
    }
}
