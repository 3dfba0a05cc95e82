//! Infrastructure layer for procflow.
//!
//! Contains implementations of the ports defined in `procflow-core`: the
//! SQLite workflow repository and user directory, the SQLite/filesystem step
//! services, the `config.toml` loader, the data directory layout, and the
//! local folder watcher for file-created triggers.

pub mod config;
pub mod filesystem;
pub mod sqlite;
pub mod workflow;
