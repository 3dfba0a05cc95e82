//! Per-action configuration checks run before a workflow may start.
//!
//! Validation is advisory: it produces a report and never touches a run.
//! The engine refuses to start a run whose definition has an invalid report.

use procflow_types::workflow::{
    InputDataType, StepConfig, StepDefinition, ValidationIssue, ValidationReport,
};
use serde_json::Value;

/// Validate the configuration of every step.
pub fn validate(steps: &[StepDefinition]) -> ValidationReport {
    let errors = steps
        .iter()
        .flat_map(|step| {
            step_errors(&step.config)
                .into_iter()
                .map(|message| ValidationIssue {
                    step_id: step.id.clone(),
                    message,
                })
        })
        .collect();
    ValidationReport::from_issues(errors)
}

fn step_errors(config: &StepConfig) -> Vec<String> {
    let mut errors = Vec::new();
    match config {
        StepConfig::CaptureInput(c) => {
            if is_blank(&c.label) {
                errors.push("capture_input requires a label".to_string());
            }
            match c.data_type {
                None => errors.push("capture_input requires a data_type".to_string()),
                Some(InputDataType::File)
                    if c.allowed_extensions.iter().all(|ext| is_blank(ext)) =>
                {
                    errors.push("file inputs require at least one allowed extension".to_string())
                }
                Some(_) => {}
            }
        }
        StepConfig::Compare(c) => {
            if !is_bound(c.left.as_ref()) {
                errors.push("compare requires a left operand".to_string());
            }
            if !is_bound(c.right.as_ref()) {
                errors.push("compare requires a right operand".to_string());
            }
        }
        StepConfig::Approval(c) => {
            if is_blank(&c.instructions) {
                errors.push("approval requires instructions".to_string());
            }
        }
        StepConfig::AppendSheet(c) => {
            if is_blank(&c.sheet_id) {
                errors.push("append_sheet requires a sheet_id".to_string());
            }
            let has_mapping = c
                .columns
                .iter()
                .any(|m| !is_blank(&m.column) && is_bound(Some(&m.value)));
            if !has_mapping {
                errors.push("append_sheet requires at least one column mapping".to_string());
            }
        }
        StepConfig::Delay(c) => {
            if c.duration == 0 {
                errors.push("delay duration must be greater than zero".to_string());
            }
        }
        StepConfig::InsertRecord(c) => {
            if is_blank(&c.collection) {
                errors.push("insert_record requires a collection".to_string());
            }
        }
        StepConfig::Branch(c) => {
            if is_blank(&c.condition) {
                errors.push("branch requires a condition".to_string());
            }
        }
        StepConfig::Notify(c) => {
            if is_blank(&c.recipient) {
                errors.push("notify requires a recipient".to_string());
            }
        }
        StepConfig::ExtractData(c) => {
            if is_blank(&c.source) {
                errors.push("extract_data requires a source".to_string());
            }
        }
        StepConfig::ValidateRule(c) => {
            if is_blank(&c.expression) {
                errors.push("validate_rule requires an expression".to_string());
            }
        }
        StepConfig::Transform(_)
        | StepConfig::GenerateDocument(_)
        | StepConfig::Negotiation(_) => {}
    }
    errors
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// An operand is bound when present, non-null, and not an empty string.
fn is_bound(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !is_blank(s),
        Some(_) => true,
    }
}
