//! Shared domain types for procflow.
//!
//! This crate contains the domain types used across the procflow engine:
//! workflow definitions, step configs, runs and their logs, run events,
//! global configuration, and the shared error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod workflow;
