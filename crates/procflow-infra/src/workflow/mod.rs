//! Workflow trigger infrastructure.
//!
//! - `file_trigger` -- Debounced local folder watcher emitting file-created events

pub mod file_trigger;
