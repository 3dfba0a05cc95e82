//! Workflow domain types for procflow.
//!
//! A workflow is an ordered list of typed steps. Each step carries a config
//! payload whose shape is determined by its `action` tag. This module also
//! contains the execution tracking types (`WorkflowRun`, `LogEntry`), trigger
//! configuration, and the validation report shared by the engine and the API.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Accumulated run context: variable name to JSON value.
pub type RunContext = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A workflow definition: an ordered, non-empty sequence of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// UUIDv7; generated when a definition file omits it.
    #[serde(default = "Uuid::now_v7")]
    pub id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owning organization; trigger events only match workflows of the same org.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// How runs of this workflow are started automatically.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerConfig>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Ordered list of steps. Execution follows this order unless a branch jumps forward.
    pub steps: Vec<StepDefinition>,
}

fn default_true() -> bool {
    true
}

impl WorkflowDefinition {
    /// Position of the step with the given id.
    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// A single step of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// User-defined step ID (e.g. "capture-invoice"). Unique within a workflow.
    pub id: String,
    /// Human-readable step title.
    pub title: String,
    /// Email of the human responsible for this step, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Context key the step output is stored under. Defaults to `step_<index>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_variable_name: Option<String>,
    /// Action-specific configuration payload.
    pub config: StepConfig,
}

impl StepDefinition {
    pub fn action(&self) -> StepAction {
        self.config.action()
    }
}

/// The closed set of step actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    CaptureInput,
    ExtractData,
    Transform,
    InsertRecord,
    Compare,
    ValidateRule,
    Branch,
    GenerateDocument,
    Notify,
    Approval,
    Negotiation,
    Delay,
    AppendSheet,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::CaptureInput => "capture_input",
            StepAction::ExtractData => "extract_data",
            StepAction::Transform => "transform",
            StepAction::InsertRecord => "insert_record",
            StepAction::Compare => "compare",
            StepAction::ValidateRule => "validate_rule",
            StepAction::Branch => "branch",
            StepAction::GenerateDocument => "generate_document",
            StepAction::Notify => "notify",
            StepAction::Approval => "approval",
            StepAction::Negotiation => "negotiation",
            StepAction::Delay => "delay",
            StepAction::AppendSheet => "append_sheet",
        }
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step-specific configuration payload.
///
/// Internally tagged by `action`:
/// ```yaml
/// config:
///   action: delay
///   duration: 2
///   unit: hours
/// ```
///
/// Every variant struct defaults its fields, so an incomplete config still
/// parses. Completeness is checked by the validation engine before a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepConfig {
    CaptureInput(CaptureInputConfig),
    ExtractData(ExtractDataConfig),
    Transform(TransformConfig),
    InsertRecord(InsertRecordConfig),
    Compare(CompareConfig),
    ValidateRule(ValidateRuleConfig),
    Branch(BranchConfig),
    GenerateDocument(GenerateDocumentConfig),
    Notify(NotifyConfig),
    Approval(ApprovalConfig),
    Negotiation(NegotiationConfig),
    Delay(DelayConfig),
    AppendSheet(AppendSheetConfig),
}

impl StepConfig {
    pub fn action(&self) -> StepAction {
        match self {
            StepConfig::CaptureInput(_) => StepAction::CaptureInput,
            StepConfig::ExtractData(_) => StepAction::ExtractData,
            StepConfig::Transform(_) => StepAction::Transform,
            StepConfig::InsertRecord(_) => StepAction::InsertRecord,
            StepConfig::Compare(_) => StepAction::Compare,
            StepConfig::ValidateRule(_) => StepAction::ValidateRule,
            StepConfig::Branch(_) => StepAction::Branch,
            StepConfig::GenerateDocument(_) => StepAction::GenerateDocument,
            StepConfig::Notify(_) => StepAction::Notify,
            StepConfig::Approval(_) => StepAction::Approval,
            StepConfig::Negotiation(_) => StepAction::Negotiation,
            StepConfig::Delay(_) => StepAction::Delay,
            StepConfig::AppendSheet(_) => StepAction::AppendSheet,
        }
    }
}

/// Declared type of a human-captured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputDataType {
    Text,
    Number,
    Boolean,
    Date,
    Email,
    File,
}

/// Collect a value from the step's assignee.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureInputConfig {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<InputDataType>,
    /// Context variable holding the submitted value. Defaults to the slugified label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    /// Accepted file extensions for `file` inputs (without the dot).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_extensions: Vec<String>,
    pub required: bool,
}

/// AI-assisted field extraction from a document or text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractDataConfig {
    /// Text or document reference to extract from (usually a placeholder).
    pub source: String,
    pub fields: Vec<String>,
    /// Results below this confidence are flagged for review.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
}

/// Build a new object from templated values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub mappings: serde_json::Map<String, serde_json::Value>,
}

/// Insert a record into a named collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsertRecordConfig {
    pub collection: String,
    pub data: serde_json::Value,
}

/// Comparison operator for `compare` steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOperator {
    #[default]
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
}

/// Compare two values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<serde_json::Value>,
    pub operator: CompareOperator,
    /// Flag the run for review instead of recording `matched: false`.
    pub flag_on_mismatch: bool,
}

/// What a failed rule does to the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFailureMode {
    #[default]
    Flag,
    Fail,
}

/// Check a JEXL rule against the run context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateRuleConfig {
    pub expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub on_fail: RuleFailureMode,
}

/// Jump forward depending on a JEXL condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchConfig {
    pub condition: String,
    /// Step id to continue at when the condition holds. Next step when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub then_step: Option<String>,
    /// Step id to continue at otherwise. Next step when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub else_step: Option<String>,
}

/// Output format of a generated document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    #[default]
    Markdown,
    Html,
    Text,
}

impl DocumentFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Markdown => "md",
            DocumentFormat::Html => "html",
            DocumentFormat::Text => "txt",
        }
    }
}

/// Render a document from a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateDocumentConfig {
    pub template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub format: DocumentFormat,
}

/// Notification delivery channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyChannel {
    #[default]
    Email,
    Slack,
    Webhook,
}

impl NotifyChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyChannel::Email => "email",
            NotifyChannel::Slack => "slack",
            NotifyChannel::Webhook => "webhook",
        }
    }
}

/// Queue a notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub channel: NotifyChannel,
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
}

/// Require a human approval decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub instructions: String,
    /// Email of the approver. Falls back to the step assignee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
}

/// Hand terms to a human negotiator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    pub counterparty: String,
    pub terms: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,
}

/// Unit of a delay duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayUnit {
    #[default]
    Minutes,
    Hours,
    Days,
}

/// Park the run for a period of time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    pub duration: u64,
    pub unit: DelayUnit,
}

impl DelayConfig {
    /// Length of the delay. Saturates instead of overflowing for absurd values.
    pub fn as_duration(&self) -> chrono::Duration {
        let amount = i64::try_from(self.duration).unwrap_or(i64::MAX);
        let minutes = match self.unit {
            DelayUnit::Minutes => amount,
            DelayUnit::Hours => amount.saturating_mul(60),
            DelayUnit::Days => amount.saturating_mul(60 * 24),
        };
        chrono::Duration::try_minutes(minutes).unwrap_or(chrono::Duration::MAX)
    }
}

/// One column of an appended sheet row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub column: String,
    pub value: serde_json::Value,
}

/// Append a row to a spreadsheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppendSheetConfig {
    pub sheet_id: String,
    pub columns: Vec<ColumnMapping>,
}

// ---------------------------------------------------------------------------
// Trigger Configuration
// ---------------------------------------------------------------------------

/// How a workflow is started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerConfig {
    /// Started explicitly through the CLI or API.
    Manual {},
    /// Started whenever a file is created under `folder_path`.
    FileCreated {
        /// Folder path or opaque storage folder identifier.
        folder_path: String,
    },
}

/// An inbound file-creation notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCreatedEvent {
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub file_metadata: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Run Status
// ---------------------------------------------------------------------------

/// Overall status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The executor may advance the run.
    Running,
    /// Parked on a human-owned step awaiting the assignee's input.
    InProgress,
    /// Parked until `resume_at`.
    WaitingDelay,
    /// Parked for human review of a flagged step.
    Flagged,
    Completed,
    Failed,
    /// Cannot continue: definition missing or cursor out of range.
    Blocked,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::InProgress => "in_progress",
            RunStatus::WaitingDelay => "waiting_delay",
            RunStatus::Flagged => "flagged",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Blocked => "blocked",
        }
    }

    /// Completed and failed runs are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "in_progress" => Ok(RunStatus::InProgress),
            "waiting_delay" => Ok(RunStatus::WaitingDelay),
            "flagged" => Ok(RunStatus::Flagged),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "blocked" => Ok(RunStatus::Blocked),
            other => Err(format!("unknown run status: '{other}'")),
        }
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunSource {
    Manual,
    FileTrigger,
}

// ---------------------------------------------------------------------------
// Run Logs
// ---------------------------------------------------------------------------

/// Outcome recorded for a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutcome {
    Success,
    Failure,
    Flagged,
}

/// Whether an entry records a step attempt or a system action on the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    #[default]
    Step,
    Reassignment,
}

/// One entry in a run's append-only history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub step_id: String,
    pub step_index: usize,
    /// Action of the step; `None` for system entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<StepAction>,
    #[serde(default)]
    pub kind: LogKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub output: serde_json::Value,
    pub outcome: LogOutcome,
    /// Comment left by whoever resolved or reopened a flagged entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_comment: Option<String>,
}

// ---------------------------------------------------------------------------
// Workflow Run
// ---------------------------------------------------------------------------

/// Identity of a human actor, as returned by the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
}

/// A single execution instance of a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// UUIDv7 run ID.
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// Name of the workflow (denormalized for display).
    pub workflow_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    pub status: RunStatus,
    /// Index of the next step to execute.
    pub current_step_index: usize,
    /// Accumulated variables consulted by later steps.
    #[serde(default)]
    pub context: RunContext,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    /// Present only while the run is waiting on a delay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_assignee: Option<UserIdentity>,
    pub source: RunSource,
    /// Optimistic concurrency counter, incremented on every persisted write.
    #[serde(default)]
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    /// Create a fresh run positioned at the first step.
    pub fn new(
        definition: &WorkflowDefinition,
        source: RunSource,
        context: RunContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id: definition.id,
            workflow_name: definition.name.clone(),
            organization_id: definition.organization_id.clone(),
            status: RunStatus::Running,
            current_step_index: 0,
            context,
            logs: Vec::new(),
            resume_at: None,
            current_assignee: None,
            source,
            version: 0,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Number of step-attempt entries in the log (system entries excluded).
    pub fn step_attempts(&self) -> usize {
        self.logs.iter().filter(|l| l.kind == LogKind::Step).count()
    }
}

// ---------------------------------------------------------------------------
// Validation Report
// ---------------------------------------------------------------------------

/// A single configuration problem on a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub step_id: String,
    pub message: String,
}

/// Result of validating a workflow's steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn from_issues(errors: Vec<ValidationIssue>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_workflow() -> WorkflowDefinition {
        WorkflowDefinition {
            id: Uuid::now_v7(),
            name: "invoice-intake".to_string(),
            description: Some("Capture, wait, record".to_string()),
            organization_id: Some("acme".to_string()),
            trigger: Some(TriggerConfig::FileCreated {
                folder_path: "Invoices".to_string(),
            }),
            is_published: true,
            is_active: true,
            steps: vec![
                StepDefinition {
                    id: "amount".to_string(),
                    title: "Invoice amount".to_string(),
                    assignee: Some("clerk@acme.test".to_string()),
                    output_variable_name: None,
                    config: StepConfig::CaptureInput(CaptureInputConfig {
                        label: "Amount".to_string(),
                        data_type: Some(InputDataType::Number),
                        variable: Some("amount".to_string()),
                        allowed_extensions: vec![],
                        required: true,
                    }),
                },
                StepDefinition {
                    id: "wait".to_string(),
                    title: "Cool-off".to_string(),
                    assignee: None,
                    output_variable_name: None,
                    config: StepConfig::Delay(DelayConfig {
                        duration: 2,
                        unit: DelayUnit::Hours,
                    }),
                },
                StepDefinition {
                    id: "record".to_string(),
                    title: "Record invoice".to_string(),
                    assignee: None,
                    output_variable_name: Some("invoice".to_string()),
                    config: StepConfig::InsertRecord(InsertRecordConfig {
                        collection: "invoices".to_string(),
                        data: json!({"amount": "{{amount}}"}),
                    }),
                },
            ],
        }
    }

    #[test]
    fn test_workflow_definition_json_roundtrip() {
        let wf = sample_workflow();
        let json_str = serde_json::to_string_pretty(&wf).unwrap();
        let parsed: WorkflowDefinition = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.name, "invoice-intake");
        assert_eq!(parsed.steps.len(), 3);
        assert_eq!(parsed.steps[1].action(), StepAction::Delay);
        assert_eq!(parsed.steps[2].config, wf.steps[2].config);
    }

    #[test]
    fn test_step_config_tagged_by_action() {
        let config = StepConfig::Delay(DelayConfig {
            duration: 5,
            unit: DelayUnit::Minutes,
        });
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["action"], "delay");
        assert_eq!(value["duration"], 5);
        assert_eq!(value["unit"], "minutes");
    }

    #[test]
    fn test_incomplete_config_still_parses() {
        let config: StepConfig = serde_json::from_value(json!({"action": "approval"})).unwrap();
        match config {
            StepConfig::Approval(c) => assert!(c.instructions.is_empty()),
            other => panic!("expected approval, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result: Result<StepConfig, _> =
            serde_json::from_value(json!({"action": "teleport"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_realistic_yaml_workflow() {
        let yaml = r##"
id: "01938e90-0000-7000-8000-000000000001"
name: resume-screening
organization_id: acme
is_published: true
trigger:
  type: file_created
  folder_path: Resumes
steps:
  - id: extract
    title: Extract candidate
    output_variable_name: candidate
    config:
      action: extract_data
      source: "{{ file.path }}"
      fields: [name, email]
      min_confidence: 0.8
  - id: check
    title: Senior?
    config:
      action: branch
      condition: "candidate.years > 5"
      then_step: notify
  - id: notify
    title: Tell recruiting
    config:
      action: notify
      channel: slack
      recipient: "#recruiting"
      message: "New candidate {{ candidate.name }}"
"##;
        let wf: WorkflowDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(wf.name, "resume-screening");
        assert!(wf.is_active);
        assert_eq!(wf.steps.len(), 3);
        assert_eq!(wf.step_index("notify"), Some(2));
        assert_eq!(
            wf.trigger,
            Some(TriggerConfig::FileCreated {
                folder_path: "Resumes".to_string()
            })
        );
        match &wf.steps[0].config {
            StepConfig::ExtractData(c) => {
                assert_eq!(c.fields, vec!["name", "email"]);
                assert_eq!(c.min_confidence, Some(0.8));
            }
            other => panic!("expected extract_data, got {other:?}"),
        }
    }

    #[test]
    fn test_delay_duration_units() {
        let d = DelayConfig {
            duration: 3,
            unit: DelayUnit::Hours,
        };
        assert_eq!(d.as_duration(), chrono::Duration::minutes(180));
        let d = DelayConfig {
            duration: 1,
            unit: DelayUnit::Days,
        };
        assert_eq!(d.as_duration(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_run_status_str_roundtrip() {
        for status in [
            RunStatus::Running,
            RunStatus::InProgress,
            RunStatus::WaitingDelay,
            RunStatus::Flagged,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Blocked,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("paused".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Flagged.is_terminal());
        assert!(!RunStatus::Blocked.is_terminal());
    }

    #[test]
    fn test_new_run_starts_at_first_step() {
        let wf = sample_workflow();
        let run = WorkflowRun::new(&wf, RunSource::Manual, RunContext::new(), Utc::now());
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.current_step_index, 0);
        assert_eq!(run.workflow_id, wf.id);
        assert_eq!(run.organization_id.as_deref(), Some("acme"));
        assert_eq!(run.version, 0);
    }

    #[test]
    fn test_step_attempts_ignores_system_entries() {
        let wf = sample_workflow();
        let mut run = WorkflowRun::new(&wf, RunSource::Manual, RunContext::new(), Utc::now());
        run.logs.push(LogEntry {
            step_id: "amount".to_string(),
            step_index: 0,
            action: Some(StepAction::CaptureInput),
            kind: LogKind::Step,
            timestamp: Utc::now(),
            output: json!(10),
            outcome: LogOutcome::Success,
            resolution_comment: None,
        });
        run.logs.push(LogEntry {
            step_id: "wait".to_string(),
            step_index: 1,
            action: None,
            kind: LogKind::Reassignment,
            timestamp: Utc::now(),
            output: json!({"to": "b@acme.test"}),
            outcome: LogOutcome::Success,
            resolution_comment: None,
        });
        assert_eq!(run.step_attempts(), 1);
    }

    #[test]
    fn test_validation_report_from_issues() {
        assert!(ValidationReport::from_issues(vec![]).valid);
        let report = ValidationReport::from_issues(vec![ValidationIssue {
            step_id: "a".to_string(),
            message: "label is required".to_string(),
        }]);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_log_entry_defaults_kind_to_step() {
        let entry: LogEntry = serde_json::from_value(json!({
            "step_id": "a",
            "step_index": 0,
            "timestamp": "2026-01-01T00:00:00Z",
            "outcome": "flagged"
        }))
        .unwrap();
        assert_eq!(entry.kind, LogKind::Step);
        assert_eq!(entry.outcome, LogOutcome::Flagged);
        assert!(entry.output.is_null());
    }
}
