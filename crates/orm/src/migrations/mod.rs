//! Migration System
//!
//! Catalog loading, tracking-table state and the [`Migrator`] that moves the
//! schema between them.

pub mod definitions;
pub mod provider;
pub mod runner;
pub mod startup;
pub mod state;

pub use definitions::*;
pub use provider::{FileMigrationProvider, MigrationProvider, StaticMigrationProvider};
pub use runner::{MigrationTarget, Migrator};
pub use startup::migrate_on_startup;
pub use state::MigrationStateStore;
