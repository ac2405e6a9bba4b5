//! Migration Definitions - Core types for the migration system
//!
//! Defines the catalog entries, tracking records, planned steps and the
//! per-step results reported by the migrator.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::error::{OrmError, OrmResult};

/// An ordered list of SQL statements making up one direction of a migration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Operation {
    statements: Vec<String>,
}

impl Operation {
    pub fn new<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            statements: statements.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from a SQL script, splitting it into statements
    pub fn from_sql(sql: &str) -> Self {
        Self::new(super::provider::split_statements(sql))
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// A catalog entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Unique name; its sortable prefix fixes the apply order
    pub name: String,
    /// Statements applying the migration
    pub up: Operation,
    /// Statements reverting the migration
    pub down: Operation,
}

impl Migration {
    pub fn new(name: impl Into<String>, up: Operation, down: Operation) -> Self {
        Self {
            name: name.into(),
            up,
            down,
        }
    }

    /// Both directions must carry at least one statement
    pub fn validate(&self) -> OrmResult<()> {
        if self.up.is_empty() {
            return Err(OrmError::Load(format!(
                "Migration '{}' has no up statements",
                self.name
            )));
        }
        if self.down.is_empty() {
            return Err(OrmError::Load(format!(
                "Migration '{}' has no down statements",
                self.name
            )));
        }
        Ok(())
    }
}

/// Row of the tracking table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub name: String,
    pub executed_at: DateTime<Utc>,
}

/// Catalog entry annotated with its execution state, as returned by `list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationInfo {
    pub name: String,
    /// `None` while pending
    pub executed_at: Option<DateTime<Utc>>,
}

impl MigrationInfo {
    pub fn is_executed(&self) -> bool {
        self.executed_at.is_some()
    }
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MigrationDirection {
    /// Apply the migration (run UP statements)
    Up,
    /// Revert the migration (run DOWN statements)
    Down,
}

impl std::fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationDirection::Up => f.pad("up"),
            MigrationDirection::Down => f.pad("down"),
        }
    }
}

/// A planned unit of work: one migration in one direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStep {
    Up { name: String, operation: Operation },
    Down { name: String, operation: Operation },
}

impl MigrationStep {
    pub fn up(migration: &Migration) -> Self {
        MigrationStep::Up {
            name: migration.name.clone(),
            operation: migration.up.clone(),
        }
    }

    pub fn down(migration: &Migration) -> Self {
        MigrationStep::Down {
            name: migration.name.clone(),
            operation: migration.down.clone(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MigrationStep::Up { name, .. } | MigrationStep::Down { name, .. } => name,
        }
    }

    pub fn operation(&self) -> &Operation {
        match self {
            MigrationStep::Up { operation, .. } | MigrationStep::Down { operation, .. } => operation,
        }
    }

    pub fn direction(&self) -> MigrationDirection {
        match self {
            MigrationStep::Up { .. } => MigrationDirection::Up,
            MigrationStep::Down { .. } => MigrationDirection::Down,
        }
    }
}

/// Outcome of one attempted step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MigrationStatus {
    Success,
    Error,
}

/// Report for one attempted step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationResult {
    pub name: String,
    pub direction: MigrationDirection,
    pub status: MigrationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a migrator run: the attempted steps in order, plus the error that halted it
#[derive(Debug, Default, Serialize)]
pub struct MigrationResultSet {
    pub results: Vec<MigrationResult>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<OrmError>,
}

impl MigrationResultSet {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Names applied successfully, in order
    pub fn applied(&self) -> Vec<&str> {
        self.successful(MigrationDirection::Up)
    }

    /// Names reverted successfully, in order
    pub fn reverted(&self) -> Vec<&str> {
        self.successful(MigrationDirection::Down)
    }

    /// Discard the per-step report, keeping only the halting error
    pub fn into_result(self) -> OrmResult<Vec<MigrationResult>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.results),
        }
    }

    fn successful(&self, direction: MigrationDirection) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.direction == direction && r.status == MigrationStatus::Success)
            .map(|r| r.name.as_str())
            .collect()
    }
}

fn serialize_error<S>(error: &Option<OrmError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match error {
        Some(error) => serializer.serialize_some(&error.to_string()),
        None => serializer.serialize_none(),
    }
}
