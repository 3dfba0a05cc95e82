//! SQLite storage layer.
//!
//! Repository, user directory and step service implementations backed by
//! SQLite with WAL mode and split read/write connection pools.

pub mod pool;
pub mod services;
pub mod user;
pub mod workflow;
