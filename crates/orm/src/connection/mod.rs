//! Connection Management
//!
//! A [`ConnectionManager`] lazily builds the one [`ConnectionHandle`] a process
//! uses to reach the data API. The handle routes statements through the retry
//! layer.

pub mod handle;
pub mod manager;

pub use handle::*;
pub use manager::*;
