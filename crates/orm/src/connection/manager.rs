//! Lazily-initialized connection handle

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{error, info};

use super::handle::ConnectionHandle;
use crate::backends::{Connector, DataApiClient, PostgresConnector};
use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};

/// Owns the single [`ConnectionHandle`] for the process lifetime.
///
/// The handle is built on the first call to [`ConnectionManager::get_handle`].
/// Concurrent first callers wait for the in-flight construction instead of
/// starting their own. A failed construction is not cached, so the next call
/// tries again. There is no teardown.
pub struct ConnectionManager {
    config: DatabaseConfig,
    connector: Arc<dyn Connector>,
    handle: OnceCell<Arc<ConnectionHandle>>,
}

impl ConnectionManager {
    /// Manager backed by PostgreSQL
    pub fn new(config: DatabaseConfig) -> Self {
        Self::with_connector(config, Arc::new(PostgresConnector::new()))
    }

    pub fn with_connector(config: DatabaseConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            handle: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.handle.initialized()
    }

    /// Shared handle, constructing it on first use
    pub async fn get_handle(&self) -> OrmResult<Arc<ConnectionHandle>> {
        let handle = self
            .handle
            .get_or_try_init(|| self.build_handle())
            .await?;
        Ok(handle.clone())
    }

    /// Raw transport client without the query context
    pub async fn get_client(&self) -> OrmResult<Arc<dyn DataApiClient>> {
        Ok(self.get_handle().await?.client())
    }

    async fn build_handle(&self) -> OrmResult<Arc<ConnectionHandle>> {
        let database = self.config.database_name()?;

        let client = self.connector.connect(&self.config).await.map_err(|e| {
            error!(database = %database, "Failed to initialize connection handle: {}", e);
            match e {
                OrmError::ConnectionInit(_) => e,
                other => OrmError::ConnectionInit(other.to_string()),
            }
        })?;

        info!(database = %database, "Connection handle initialized");
        Ok(Arc::new(ConnectionHandle::new(
            client,
            database,
            self.config.retry_policy(),
        )))
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("initialized", &self.is_initialized())
            .field("migrations_table", &self.config.migrations_table)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{test_config, FakeClient, FakeConnector};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_first_use_builds_once() {
        let connector = Arc::new(FakeConnector::new(FakeClient::new()).with_delay(Duration::from_millis(50)));
        let manager = ConnectionManager::with_connector(test_config(), connector.clone());

        let (a, b, c) = tokio::join!(manager.get_handle(), manager.get_handle(), manager.get_handle());
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(connector.connects(), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
        assert_eq!(a.database(), "hookdb_test");
    }

    #[tokio::test]
    async fn test_handle_reused_across_calls() {
        let connector = Arc::new(FakeConnector::new(FakeClient::new()));
        let manager = ConnectionManager::with_connector(test_config(), connector.clone());
        assert!(!manager.is_initialized());

        let first = manager.get_handle().await.unwrap();
        let second = manager.get_handle().await.unwrap();
        manager.get_client().await.unwrap();

        assert!(manager.is_initialized());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn test_failed_init_is_not_cached() {
        let connector = Arc::new(FakeConnector::new(FakeClient::new()).failing_first(1));
        let manager = ConnectionManager::with_connector(test_config(), connector.clone());

        let err = manager.get_handle().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionInit);
        assert!(!manager.is_initialized());

        manager.get_handle().await.unwrap();
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_before_connecting() {
        let connector = Arc::new(FakeConnector::new(FakeClient::new()));
        let manager = ConnectionManager::with_connector(
            DatabaseConfig::new("postgres://localhost"),
            connector.clone(),
        );

        let err = manager.get_handle().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(connector.connects(), 0);
    }
}
