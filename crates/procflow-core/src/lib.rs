//! Workflow execution logic and repository trait definitions for procflow.
//!
//! This crate defines the "ports" (repository traits, step services) that the
//! infrastructure layer implements. It depends only on `procflow-types` and
//! never on `procflow-infra` or any database crate.

pub mod event;
pub mod repository;
pub mod workflow;
