//! Error types for the data layer
//!
//! Every failure surfaced by the connection, retry, and migration layers is an
//! [`OrmError`]. Retry decisions are made on its [`ErrorKind`], never on message text.

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for data layer operations
pub type OrmResult<T> = Result<T, OrmError>;

/// PostgreSQL SQLSTATE for `unique_violation`
pub const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL SQLSTATE for `query_canceled`, raised when `statement_timeout` fires
pub const QUERY_CANCELED: &str = "57014";

/// Error type for data layer operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// The connection handle could not be constructed
    #[error("Connection initialization failed: {0}")]
    ConnectionInit(String),

    /// The remote statement exceeded its time budget
    #[error("Statement timed out: {0}")]
    Timeout(String),

    /// A generated identifier collided with an existing row
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// A retryable error persisted through every allowed attempt
    #[error("Failed after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last_error: Box<OrmError>,
    },

    /// A migration definition is malformed or duplicated
    #[error("Failed to load migrations: {0}")]
    Load(String),

    /// A requested migration is not part of the catalog
    #[error("Migration '{0}' not found")]
    MigrationNotFound(String),

    /// A migration's own statements failed
    #[error("Migration '{name}' failed: {source}")]
    MigrationExecution {
        name: String,
        #[source]
        source: Box<OrmError>,
    },

    /// The tracking table contradicts the migration catalog
    #[error("Corrupted migration state: {0}")]
    CorruptedState(String),

    /// Any other remote failure
    #[error("Query error: {0}")]
    Query(String),

    /// Invalid or missing configuration
    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

/// Stable classification of [`OrmError`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConnectionInit,
    Timeout,
    UniqueViolation,
    ExhaustedRetries,
    Load,
    MigrationNotFound,
    MigrationExecution,
    CorruptedState,
    Query,
    Configuration,
}

impl ErrorKind {
    /// Whether a failure of this kind may succeed when the operation is repeated
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::UniqueViolation)
    }

    /// Whether this kind originates in the transport rather than in a statement's own logic
    pub fn is_transport(self) -> bool {
        matches!(
            self,
            ErrorKind::ConnectionInit
                | ErrorKind::Timeout
                | ErrorKind::UniqueViolation
                | ErrorKind::ExhaustedRetries
        )
    }
}

impl OrmError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrmError::ConnectionInit(_) => ErrorKind::ConnectionInit,
            OrmError::Timeout(_) => ErrorKind::Timeout,
            OrmError::UniqueViolation(_) => ErrorKind::UniqueViolation,
            OrmError::ExhaustedRetries { .. } => ErrorKind::ExhaustedRetries,
            OrmError::Load(_) => ErrorKind::Load,
            OrmError::MigrationNotFound(_) => ErrorKind::MigrationNotFound,
            OrmError::MigrationExecution { .. } => ErrorKind::MigrationExecution,
            OrmError::CorruptedState(_) => ErrorKind::CorruptedState,
            OrmError::Query(_) => ErrorKind::Query,
            OrmError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Default retry predicate
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Build an error from a PostgreSQL SQLSTATE and server message
    pub fn from_sqlstate(code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            Some(UNIQUE_VIOLATION) => OrmError::UniqueViolation(message),
            Some(QUERY_CANCELED) => OrmError::Timeout(message),
            Some(code) => OrmError::Query(format!("{} (SQLSTATE {})", message, code)),
            None => OrmError::Query(message),
        }
    }
}

// Convert from sqlx errors, keeping the SQLSTATE classification
impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                OrmError::from_sqlstate(db_err.code().as_deref(), db_err.message())
            }
            _ => OrmError::Query(err.to_string()),
        }
    }
}
