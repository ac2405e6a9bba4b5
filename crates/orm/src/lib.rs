//! # hookdb-orm: Data Layer for hookdb
//!
//! Schema migrations and resilient statement execution against a remote
//! PostgreSQL endpoint where every call is a round trip that may fail
//! transiently.
//!
//! This crate provides the lazily-built shared connection handle, the bounded
//! retry executor keyed on error classification, the migration catalog and
//! tracking table, and the migrator that moves the schema between versions.

pub mod backends;
pub mod config;
pub mod connection;
pub mod error;
pub mod id;
pub mod migrations;
pub mod retry;

#[cfg(test)]
mod test_support;

// Re-export core traits and types
pub use backends::{Connector, DataApiClient, DatabaseRow, DatabaseValue, PostgresConnector};
pub use config::*;
pub use connection::*;
pub use error::*;
pub use id::generate_id;
pub use migrations::*;
pub use retry::*;
