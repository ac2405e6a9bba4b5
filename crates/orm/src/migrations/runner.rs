//! Migration Runner - Plans and executes migration steps
//!
//! The migrator diffs the catalog against the tracking table, derives an
//! ordered list of [`MigrationStep`]s and runs them one at a time. A failing
//! step halts the run; steps that already succeeded stay recorded.

use std::sync::Arc;

use tracing::{error, info};

use super::definitions::*;
use super::provider::MigrationProvider;
use super::state::MigrationStateStore;
use crate::config::validate_table_name;
use crate::connection::{ConnectionHandle, ConnectionManager};
use crate::error::{OrmError, OrmResult};

/// Desired schema state for a migrator run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationTarget {
    /// Apply the lowest-named pending migration
    Up,
    /// Revert the highest-named executed migration
    Down,
    /// Apply every pending migration
    Latest,
    /// Move forward or backward until the named migration is the last executed one
    Named(String),
}

impl std::fmt::Display for MigrationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationTarget::Up => write!(f, "up"),
            MigrationTarget::Down => write!(f, "down"),
            MigrationTarget::Latest => write!(f, "latest"),
            MigrationTarget::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Runs migrations from a [`MigrationProvider`] against the managed connection
pub struct Migrator {
    connections: Arc<ConnectionManager>,
    provider: Arc<dyn MigrationProvider>,
    table: String,
}

impl Migrator {
    pub fn new(connections: Arc<ConnectionManager>, provider: Arc<dyn MigrationProvider>) -> Self {
        let table = connections.config().migrations_table.clone();
        Self {
            connections,
            provider,
            table,
        }
    }

    /// Use a tracking table other than the configured one
    pub fn with_table(mut self, table: impl Into<String>) -> OrmResult<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        self.table = table;
        Ok(self)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Catalog entries in name order, annotated with when each was executed
    pub async fn list(&self) -> OrmResult<Vec<MigrationInfo>> {
        let catalog = self.provider.get_migrations().await?;
        let (_, store) = self.open_store().await?;
        let executed = store.list_executed().await?;

        Ok(catalog
            .into_iter()
            .map(|migration| {
                let executed_at = executed
                    .iter()
                    .find(|record| record.name == migration.name)
                    .map(|record| record.executed_at);
                MigrationInfo {
                    name: migration.name,
                    executed_at,
                }
            })
            .collect())
    }

    pub async fn migrate_up(&self) -> MigrationResultSet {
        self.migrate(MigrationTarget::Up).await
    }

    pub async fn migrate_down(&self) -> MigrationResultSet {
        self.migrate(MigrationTarget::Down).await
    }

    pub async fn migrate_to_latest(&self) -> MigrationResultSet {
        self.migrate(MigrationTarget::Latest).await
    }

    pub async fn migrate_to(&self, target: &str) -> MigrationResultSet {
        self.migrate(MigrationTarget::Named(target.to_string())).await
    }

    /// Bring the schema to `target`.
    ///
    /// Failures before the first step (loading, connecting, planning) produce an
    /// empty result list with the error set.
    pub async fn migrate(&self, target: MigrationTarget) -> MigrationResultSet {
        let mut result_set = MigrationResultSet::default();

        let prepared = self.prepare(&target).await;
        let (handle, store, steps) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(migration_target = %target, "Migration run aborted: {}", e);
                result_set.error = Some(e);
                return result_set;
            }
        };

        if steps.is_empty() {
            info!(migration_target = %target, "No migrations to run");
            return result_set;
        }

        for step in steps {
            match self.run_step(&handle, &store, &step).await {
                Ok(()) => {
                    match step.direction() {
                        MigrationDirection::Up => info!(migration = step.name(), "Applied migration"),
                        MigrationDirection::Down => info!(migration = step.name(), "Reverted migration"),
                    }
                    result_set.results.push(MigrationResult {
                        name: step.name().to_string(),
                        direction: step.direction(),
                        status: MigrationStatus::Success,
                        error: None,
                    });
                }
                Err(e) => {
                    error!(
                        migration = step.name(),
                        direction = %step.direction(),
                        "Migration failed, halting run: {}",
                        e
                    );
                    result_set.results.push(MigrationResult {
                        name: step.name().to_string(),
                        direction: step.direction(),
                        status: MigrationStatus::Error,
                        error: Some(e.to_string()),
                    });
                    result_set.error = Some(e);
                    break;
                }
            }
        }

        result_set
    }

    async fn prepare(
        &self,
        target: &MigrationTarget,
    ) -> OrmResult<(Arc<ConnectionHandle>, MigrationStateStore, Vec<MigrationStep>)> {
        let catalog = self.provider.get_migrations().await?;

        // Unknown targets fail before touching the database
        if let MigrationTarget::Named(name) = target {
            if !catalog.iter().any(|m| &m.name == name) {
                return Err(OrmError::MigrationNotFound(name.clone()));
            }
        }

        let (handle, store) = self.open_store().await?;
        let executed = store.list_executed().await?;
        verify_prefix(&catalog, &executed)?;

        let steps = plan_steps(&catalog, executed.len(), target)?;
        Ok((handle, store, steps))
    }

    async fn open_store(&self) -> OrmResult<(Arc<ConnectionHandle>, MigrationStateStore)> {
        let handle = self.connections.get_handle().await?;
        let store = MigrationStateStore::new(handle.clone(), self.table.clone())?;
        store.ensure_table().await?;
        Ok((handle, store))
    }

    async fn run_step(
        &self,
        handle: &ConnectionHandle,
        store: &MigrationStateStore,
        step: &MigrationStep,
    ) -> OrmResult<()> {
        for statement in step.operation().statements() {
            handle
                .execute_with_retry(statement, &[])
                .await
                .map_err(|e| step_error(step.name(), e))?;
        }

        match step {
            MigrationStep::Up { name, .. } => {
                store.record_applied(name).await?;
            }
            MigrationStep::Down { name, .. } => {
                store.record_reverted(name).await?;
            }
        }

        Ok(())
    }
}

/// Transport failures surface as-is; anything else is attributed to the migration
fn step_error(name: &str, error: OrmError) -> OrmError {
    if error.kind().is_transport() {
        error
    } else {
        OrmError::MigrationExecution {
            name: name.to_string(),
            source: Box::new(error),
        }
    }
}

/// Executed records must name the first `executed.len()` catalog entries, in order
pub fn verify_prefix(catalog: &[Migration], executed: &[MigrationRecord]) -> OrmResult<()> {
    for (index, record) in executed.iter().enumerate() {
        if !catalog.iter().any(|m| m.name == record.name) {
            return Err(OrmError::CorruptedState(format!(
                "applied migration '{}' is not in the catalog",
                record.name
            )));
        }

        let expected = match catalog.get(index) {
            Some(migration) => &migration.name,
            None => {
                return Err(OrmError::CorruptedState(format!(
                    "tracking table holds {} records but the catalog has {} migrations",
                    executed.len(),
                    catalog.len()
                )))
            }
        };
        if expected != &record.name {
            return Err(OrmError::CorruptedState(format!(
                "migration '{}' is pending but later migration '{}' has been applied",
                expected, record.name
            )));
        }
    }
    Ok(())
}

/// Derive the ordered steps moving a catalog with `executed` applied entries to `target`
pub fn plan_steps(
    catalog: &[Migration],
    executed: usize,
    target: &MigrationTarget,
) -> OrmResult<Vec<MigrationStep>> {
    let executed = executed.min(catalog.len());
    let steps = match target {
        MigrationTarget::Up => catalog
            .get(executed)
            .map(MigrationStep::up)
            .into_iter()
            .collect(),
        MigrationTarget::Down => executed
            .checked_sub(1)
            .and_then(|last| catalog.get(last))
            .map(MigrationStep::down)
            .into_iter()
            .collect(),
        MigrationTarget::Latest => catalog[executed..].iter().map(MigrationStep::up).collect(),
        MigrationTarget::Named(name) => {
            let index = catalog
                .iter()
                .position(|m| &m.name == name)
                .ok_or_else(|| OrmError::MigrationNotFound(name.clone()))?;

            if index >= executed {
                catalog[executed..=index].iter().map(MigrationStep::up).collect()
            } else {
                catalog[index + 1..executed]
                    .iter()
                    .rev()
                    .map(MigrationStep::down)
                    .collect()
            }
        }
    };

    Ok(steps)
}
