//! Shared query handle

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::backends::{DataApiClient, DatabaseRow, DatabaseValue};
use crate::error::OrmResult;
use crate::id;
use crate::retry::{RetryExecutor, RetryPolicy};

/// Remote client bundled with its query context.
///
/// Immutable once built and shared through `Arc`.
pub struct ConnectionHandle {
    client: Arc<dyn DataApiClient>,
    database: String,
    retry: RetryExecutor,
}

impl ConnectionHandle {
    pub fn new(client: Arc<dyn DataApiClient>, database: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            client,
            database: database.into(),
            retry: RetryExecutor::new(policy),
        }
    }

    /// Raw transport client, without retry
    pub fn client(&self) -> Arc<dyn DataApiClient> {
        self.client.clone()
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.retry.policy()
    }

    /// Fresh identifier for a row about to be inserted
    pub fn generate_id(&self) -> String {
        id::generate_id()
    }

    /// Execute once, without retry
    pub async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        debug!(database = %self.database, "Executing: {}", sql);
        self.client.execute(sql, params).await
    }

    /// Fetch once, without retry
    pub async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<DatabaseRow>> {
        debug!(database = %self.database, "Fetching: {}", sql);
        self.client.fetch_all(sql, params).await
    }

    pub async fn execute_with_retry(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        self.retry.run(|| self.execute(sql, params)).await
    }

    pub async fn fetch_all_with_retry(
        &self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> OrmResult<Vec<DatabaseRow>> {
        self.retry.run(|| self.fetch_all(sql, params)).await
    }

    /// Run arbitrary query code under this handle's retry policy
    pub async fn run_with_retry<T, F, Fut>(&self, operation: F) -> OrmResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = OrmResult<T>>,
    {
        self.retry.run(operation).await
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("database", &self.database)
            .field("retry", self.retry.policy())
            .finish_non_exhaustive()
    }
}
