//! Deploy-time migration

use tracing::info;

use super::definitions::MigrationResultSet;
use super::runner::Migrator;
use crate::config::Environment;

/// Bring the schema to the latest migration as part of service startup.
///
/// Development databases are migrated by hand, so nothing runs there and the
/// returned set is empty.
pub async fn migrate_on_startup(migrator: &Migrator, environment: &Environment) -> MigrationResultSet {
    if environment.is_development() {
        info!(environment = %environment, "Skipping startup migrations");
        return MigrationResultSet::default();
    }

    info!(environment = %environment, "Running startup migrations");
    migrator.migrate_to_latest().await
}
