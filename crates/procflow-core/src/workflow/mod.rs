//! Workflow engine core.
//!
//! - `definition` -- YAML/JSON parsing, structural checks, filesystem load/save
//! - `resolver` -- `{{path}}` placeholder resolution against the run context
//! - `validation` -- per-action config completeness report
//! - `expression` -- JEXL evaluator for branch conditions and rules
//! - `step_runner` -- handlers for all 13 step actions
//! - `transition` -- applying step results to a run
//! - `engine` -- the run loop, human input and escalation entry points
//! - `escalation` -- resolve, reopen and reassign guards
//! - `scheduler` -- delay/resume tick and its periodic driver
//! - `trigger` -- file-created trigger matching

pub mod definition;
pub mod engine;
pub mod escalation;
pub mod expression;
pub mod resolver;
pub mod scheduler;
pub mod step_runner;
pub mod transition;
pub mod trigger;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;
