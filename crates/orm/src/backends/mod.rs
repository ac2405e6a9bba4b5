//! Data API Backends
//!
//! Transport abstractions plus the PostgreSQL implementation used in production.

pub mod core;
pub mod postgres;

pub use self::core::*;
pub use postgres::{PostgresClient, PostgresConnector};
