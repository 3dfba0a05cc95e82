//! Step runner for all 13 step actions.
//!
//! `StepRunner` resolves a step's config against the run context, dispatches
//! on the `StepConfig` variant, and returns an `ExecutionResult` that the run
//! state machine applies to the run. External effects (records, documents,
//! notifications, extraction, sheets) go through the `StepServices` port.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use procflow_types::workflow::{
    AppendSheetConfig, ApprovalConfig, BranchConfig, CaptureInputConfig, ColumnMapping,
    CompareConfig, CompareOperator, DocumentFormat, ExtractDataConfig, GenerateDocumentConfig,
    InputDataType, InsertRecordConfig, NegotiationConfig, NotifyChannel, NotifyConfig,
    RuleFailureMode, RunContext, StepConfig, StepDefinition, TransformConfig, ValidateRuleConfig,
    WorkflowDefinition, WorkflowRun,
};
use serde_json::{Value, json};
use uuid::Uuid;

use super::expression::ConditionEvaluator;
use super::resolver;

/// Default confidence threshold for extraction when neither step nor config sets one.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

/// Outcome of executing a single step.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// Step finished; continue at `next_index`.
    Success { output: Value, next_index: usize },
    /// Step parked the run until `resume_at`.
    Waiting { resume_at: DateTime<Utc> },
    /// Step needs a value from its human assignee.
    AwaitingActor { assignee: Option<String> },
    /// Step needs human review before the run may continue.
    Flagged { reason: String, output: Value },
    /// Step failed; the run stops.
    Failure { error: String },
}

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Errors raised by step handlers and external step services.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// Step execution failed.
    #[error("step execution failed: {0}")]
    ExecutionFailed(String),

    /// The step config cannot be executed as given.
    #[error("config error: {0}")]
    ConfigError(String),

    /// An external service rejected or could not process the request.
    #[error("service error: {0}")]
    ServiceError(String),
}

// ---------------------------------------------------------------------------
// StepServices (external collaborators)
// ---------------------------------------------------------------------------

/// Future returned by `StepServices` methods.
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StepError>> + Send + 'a>>;

/// Result of an extraction request.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Extracted field name to value.
    pub fields: serde_json::Map<String, Value>,
    /// Overall confidence in `[0, 1]`.
    pub confidence: f64,
}

/// A document to render and store.
#[derive(Debug, Clone)]
pub struct DocumentRequest {
    pub run_id: Uuid,
    pub file_name: String,
    pub format: DocumentFormat,
    pub content: String,
}

/// A notification to queue for delivery.
#[derive(Debug, Clone)]
pub struct Notification {
    pub run_id: Uuid,
    pub channel: NotifyChannel,
    pub recipient: String,
    pub subject: Option<String>,
    pub message: String,
}

/// External effects available to step handlers.
///
/// Object-safe so the engine can hold `Arc<dyn StepServices>`; the
/// infrastructure layer provides the SQLite/filesystem implementation.
pub trait StepServices: Send + Sync {
    /// Insert `data` into `collection`. Returns a receipt with the record id.
    fn insert_record(&self, collection: &str, data: &Value) -> ServiceFuture<'_, Value>;

    /// Extract `fields` from `source`.
    fn extract(&self, source: &str, fields: &[String]) -> ServiceFuture<'_, Extraction>;

    /// Render and store a document. Returns a receipt with its location.
    fn generate_document(&self, request: &DocumentRequest) -> ServiceFuture<'_, Value>;

    /// Queue a notification. Returns a receipt with the notification id.
    fn notify(&self, notification: &Notification) -> ServiceFuture<'_, Value>;

    /// Append one row to a sheet. Returns a receipt with the row number.
    fn append_row(
        &self,
        sheet_id: &str,
        row: &serde_json::Map<String, Value>,
    ) -> ServiceFuture<'_, Value>;
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

/// Executes individual steps by dispatching to action-specific handlers.
#[derive(Clone)]
pub struct StepRunner {
    services: Arc<dyn StepServices>,
    default_min_confidence: f64,
}

impl StepRunner {
    /// Create a step runner over the given services.
    pub fn new(services: Arc<dyn StepServices>) -> Self {
        Self {
            services,
            default_min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }

    /// Override the extraction confidence threshold used when a step sets none.
    pub fn with_default_min_confidence(mut self, threshold: f64) -> Self {
        self.default_min_confidence = threshold;
        self
    }

    /// Execute the step at `step_index` of `definition` for `run`.
    ///
    /// Never returns an error: handler and service failures become
    /// `ExecutionResult::Failure`.
    pub async fn execute(
        &self,
        run: &WorkflowRun,
        step_index: usize,
        definition: &WorkflowDefinition,
        now: DateTime<Utc>,
    ) -> ExecutionResult {
        let Some(step) = definition.steps.get(step_index) else {
            return ExecutionResult::Failure {
                error: format!("step index {step_index} is out of range"),
            };
        };

        let config = resolve_config(&step.config, &run.context);

        tracing::debug!(
            run_id = %run.id,
            step_id = step.id.as_str(),
            action = step.action().as_str(),
            "executing step"
        );

        let result = self
            .dispatch(run, step, step_index, definition, config, now)
            .await;

        match result {
            Ok(result) => result,
            Err(e) => ExecutionResult::Failure { error: e.to_string() },
        }
    }

    async fn dispatch(
        &self,
        run: &WorkflowRun,
        step: &StepDefinition,
        step_index: usize,
        definition: &WorkflowDefinition,
        config: StepConfig,
        now: DateTime<Utc>,
    ) -> Result<ExecutionResult, StepError> {
        let next_index = step_index + 1;
        let success = |output: Value| ExecutionResult::Success { output, next_index };

        match config {
            StepConfig::CaptureInput(c) => Ok(capture_input(step, &c, &run.context, next_index)),
            StepConfig::ExtractData(c) => self.extract_data(&c, next_index).await,
            StepConfig::Transform(c) => Ok(success(Value::Object(c.mappings))),
            StepConfig::InsertRecord(c) => {
                let receipt = self.services.insert_record(&c.collection, &c.data).await?;
                Ok(success(receipt))
            }
            StepConfig::Compare(c) => Ok(compare(&c, next_index)),
            StepConfig::ValidateRule(c) => validate_rule(&c, &run.context, next_index),
            StepConfig::Branch(c) => branch(&c, &run.context, step_index, definition),
            StepConfig::GenerateDocument(c) => {
                let file_name = c
                    .file_name
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| format!("{}-{}", slugify(&run.workflow_name), step.id));
                let request = DocumentRequest {
                    run_id: run.id,
                    file_name,
                    format: c.format,
                    content: c.template,
                };
                let receipt = self.services.generate_document(&request).await?;
                Ok(success(receipt))
            }
            StepConfig::Notify(c) => {
                let notification = Notification {
                    run_id: run.id,
                    channel: c.channel,
                    recipient: c.recipient,
                    subject: c.subject,
                    message: c.message,
                };
                let receipt = self.services.notify(&notification).await?;
                Ok(success(receipt))
            }
            StepConfig::Approval(c) => Ok(approval(step, &c, &run.context, next_index)),
            StepConfig::Negotiation(c) => Ok(ExecutionResult::Flagged {
                reason: format!("negotiation with '{}' requires review", c.counterparty),
                output: json!({
                    "counterparty": c.counterparty,
                    "terms": c.terms,
                    "max_rounds": c.max_rounds,
                }),
            }),
            StepConfig::Delay(c) => match now.checked_add_signed(c.as_duration()) {
                Some(resume_at) => Ok(ExecutionResult::Waiting { resume_at }),
                None => Err(StepError::ConfigError(format!(
                    "delay of {} {:?} is out of range",
                    c.duration, c.unit
                ))),
            },
            StepConfig::AppendSheet(c) => {
                let row: serde_json::Map<String, Value> = c
                    .columns
                    .into_iter()
                    .filter(|m| !m.column.trim().is_empty())
                    .map(|m| (m.column, m.value))
                    .collect();
                let receipt = self.services.append_row(&c.sheet_id, &row).await?;
                Ok(success(receipt))
            }
        }
    }

    async fn extract_data(
        &self,
        config: &ExtractDataConfig,
        next_index: usize,
    ) -> Result<ExecutionResult, StepError> {
        let extraction = self.services.extract(&config.source, &config.fields).await?;
        let threshold = config.min_confidence.unwrap_or(self.default_min_confidence);

        let mut output = extraction.fields;
        output.insert("confidence".to_string(), json!(extraction.confidence));
        let output = Value::Object(output);

        if extraction.confidence < threshold {
            return Ok(ExecutionResult::Flagged {
                reason: format!(
                    "extraction confidence {:.2} is below {:.2}",
                    extraction.confidence, threshold
                ),
                output,
            });
        }
        Ok(ExecutionResult::Success { output, next_index })
    }
}

// ---------------------------------------------------------------------------
// Config resolution
// ---------------------------------------------------------------------------

/// Resolve placeholders in a step config against the run context.
///
/// Text fields always resolve to text. Free-form data slots (transform
/// mappings, record data, compare operands, negotiation terms, column
/// values) keep the type of a value referenced by a lone placeholder.
/// Branch conditions and rule expressions are evaluated with the context as
/// data and are never templated.
pub fn resolve_config(config: &StepConfig, context: &RunContext) -> StepConfig {
    let text = |s: &str| resolver::resolve_template(s, context);
    let opt_text = |s: &Option<String>| s.as_deref().map(text);
    let data = |v: &Value| resolver::resolve_typed(v, context);

    match config {
        StepConfig::CaptureInput(c) => StepConfig::CaptureInput(CaptureInputConfig {
            label: text(&c.label),
            ..c.clone()
        }),
        StepConfig::ExtractData(c) => StepConfig::ExtractData(ExtractDataConfig {
            source: text(&c.source),
            ..c.clone()
        }),
        StepConfig::Transform(c) => StepConfig::Transform(TransformConfig {
            mappings: c.mappings.iter().map(|(k, v)| (k.clone(), data(v))).collect(),
        }),
        StepConfig::InsertRecord(c) => StepConfig::InsertRecord(InsertRecordConfig {
            collection: text(&c.collection),
            data: data(&c.data),
        }),
        StepConfig::Compare(c) => StepConfig::Compare(CompareConfig {
            left: c.left.as_ref().map(data),
            right: c.right.as_ref().map(data),
            ..c.clone()
        }),
        StepConfig::ValidateRule(c) => StepConfig::ValidateRule(ValidateRuleConfig {
            message: opt_text(&c.message),
            ..c.clone()
        }),
        StepConfig::Branch(_) | StepConfig::Delay(_) => config.clone(),
        StepConfig::GenerateDocument(c) => {
            StepConfig::GenerateDocument(GenerateDocumentConfig {
                template: text(&c.template),
                file_name: opt_text(&c.file_name),
                format: c.format,
            })
        }
        StepConfig::Notify(c) => StepConfig::Notify(NotifyConfig {
            channel: c.channel,
            recipient: text(&c.recipient),
            subject: opt_text(&c.subject),
            message: text(&c.message),
        }),
        StepConfig::Approval(c) => StepConfig::Approval(ApprovalConfig {
            instructions: text(&c.instructions),
            approver: opt_text(&c.approver),
        }),
        StepConfig::Negotiation(c) => StepConfig::Negotiation(NegotiationConfig {
            counterparty: text(&c.counterparty),
            terms: data(&c.terms),
            max_rounds: c.max_rounds,
        }),
        StepConfig::AppendSheet(c) => StepConfig::AppendSheet(AppendSheetConfig {
            sheet_id: text(&c.sheet_id),
            columns: c
                .columns
                .iter()
                .map(|m| ColumnMapping {
                    column: m.column.clone(),
                    value: data(&m.value),
                })
                .collect(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn capture_input(
    step: &StepDefinition,
    config: &CaptureInputConfig,
    context: &RunContext,
    next_index: usize,
) -> ExecutionResult {
    let variable = config
        .variable
        .clone()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| slugify(&config.label));

    match resolver::lookup_path(context, &variable).filter(|v| !v.is_null()) {
        Some(value) => match coerce_input(value, config) {
            Ok(output) => ExecutionResult::Success { output, next_index },
            Err(error) => ExecutionResult::Failure {
                error: format!("input '{variable}': {error}"),
            },
        },
        None if config.required => ExecutionResult::AwaitingActor {
            assignee: step.assignee.clone(),
        },
        None => ExecutionResult::Success {
            output: Value::Null,
            next_index,
        },
    }
}

/// Check a submitted value against the declared input type.
fn coerce_input(value: &Value, config: &CaptureInputConfig) -> Result<Value, String> {
    let data_type = config.data_type.unwrap_or(InputDataType::Text);
    match (data_type, value) {
        (InputDataType::Number, Value::Number(_)) => Ok(value.clone()),
        (InputDataType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("'{s}' is not a number")),
        (InputDataType::Boolean, Value::Bool(_)) => Ok(value.clone()),
        (InputDataType::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Ok(Value::Bool(true)),
            "false" | "no" => Ok(Value::Bool(false)),
            _ => Err(format!("'{s}' is not a boolean")),
        },
        (InputDataType::Email, Value::String(s)) if is_email(s) => Ok(json!(s.trim())),
        (InputDataType::Date, Value::String(s)) if is_date(s) => Ok(json!(s.trim())),
        (InputDataType::File, Value::String(s)) => {
            let ok = config.allowed_extensions.iter().any(|ext| {
                let ext = ext.trim().trim_start_matches('.').to_lowercase();
                s.to_lowercase().ends_with(&format!(".{ext}"))
            });
            if ok {
                Ok(value.clone())
            } else {
                Err(format!(
                    "'{s}' does not have an allowed extension ({})",
                    config.allowed_extensions.join(", ")
                ))
            }
        }
        (InputDataType::Text, Value::String(_)) => Ok(value.clone()),
        (InputDataType::Text, Value::Number(_) | Value::Bool(_)) => {
            Ok(json!(resolver::value_to_string(value)))
        }
        (data_type, other) => Err(format!("{other} is not a valid {data_type:?} value")),
    }
}

fn is_email(s: &str) -> bool {
    let s = s.trim();
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !s.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn is_date(s: &str) -> bool {
    let s = s.trim();
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(s).is_ok()
}

fn compare(config: &CompareConfig, next_index: usize) -> ExecutionResult {
    let left = config.left.clone().unwrap_or(Value::Null);
    let right = config.right.clone().unwrap_or(Value::Null);

    let matched = match config.operator {
        CompareOperator::Equals => loose_eq(&left, &right),
        CompareOperator::NotEquals => !loose_eq(&left, &right),
        CompareOperator::GreaterThan => {
            ordering(&left, &right) == Some(std::cmp::Ordering::Greater)
        }
        CompareOperator::LessThan => ordering(&left, &right) == Some(std::cmp::Ordering::Less),
        CompareOperator::Contains => contains(&left, &right),
    };

    let output = json!({ "matched": matched, "left": left, "right": right });
    if !matched && config.flag_on_mismatch {
        return ExecutionResult::Flagged {
            reason: format!(
                "comparison failed: {} {:?} {}",
                resolver::value_to_string(&left),
                config.operator,
                resolver::value_to_string(&right)
            ),
            output,
        };
    }
    ExecutionResult::Success { output, next_index }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Equality that treats `"42"` and `42` alike.
fn loose_eq(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => l == r,
        _ => resolver::value_to_string(left) == resolver::value_to_string(right),
    }
}

fn ordering(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => Some(resolver::value_to_string(left).cmp(&resolver::value_to_string(right))),
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        Value::Object(map) => map.contains_key(&resolver::value_to_string(needle)),
        Value::String(s) => s.contains(&resolver::value_to_string(needle)),
        _ => false,
    }
}

fn validate_rule(
    config: &ValidateRuleConfig,
    context: &RunContext,
    next_index: usize,
) -> Result<ExecutionResult, StepError> {
    let passed = ConditionEvaluator::new()
        .check(&config.expression, context)
        .map_err(|e| StepError::ExecutionFailed(e.to_string()))?;

    if passed {
        return Ok(ExecutionResult::Success {
            output: json!({ "passed": true }),
            next_index,
        });
    }

    let message = config
        .message
        .clone()
        .unwrap_or_else(|| format!("rule failed: {}", config.expression));
    Ok(match config.on_fail {
        RuleFailureMode::Flag => ExecutionResult::Flagged {
            reason: message,
            output: json!({ "passed": false }),
        },
        RuleFailureMode::Fail => ExecutionResult::Failure { error: message },
    })
}

fn branch(
    config: &BranchConfig,
    context: &RunContext,
    step_index: usize,
    definition: &WorkflowDefinition,
) -> Result<ExecutionResult, StepError> {
    let condition_met = ConditionEvaluator::new()
        .check(&config.condition, context)
        .map_err(|e| StepError::ExecutionFailed(e.to_string()))?;

    let target = if condition_met {
        config.then_step.as_deref()
    } else {
        config.else_step.as_deref()
    };

    let next_index = match target {
        None => step_index + 1,
        Some(target) => match definition.step_index(target) {
            None => {
                return Err(StepError::ConfigError(format!(
                    "branch target '{target}' does not exist"
                )));
            }
            Some(index) if index <= step_index => {
                return Err(StepError::ConfigError(format!(
                    "branch target '{target}' is not after the branch"
                )));
            }
            Some(index) => index,
        },
    };

    let next_step = definition.steps.get(next_index).map(|s| s.id.clone());
    Ok(ExecutionResult::Success {
        output: json!({ "condition_met": condition_met, "next_step": next_step }),
        next_index,
    })
}

fn approval(
    step: &StepDefinition,
    config: &ApprovalConfig,
    context: &RunContext,
    next_index: usize,
) -> ExecutionResult {
    let decision = context
        .get("approvals")
        .and_then(|approvals| approvals.get(&step.id))
        .and_then(Value::as_bool);
    let approver = config.approver.clone().or_else(|| step.assignee.clone());

    match decision {
        Some(true) => ExecutionResult::Success {
            output: json!({ "approved": true, "approver": approver }),
            next_index,
        },
        Some(false) => ExecutionResult::Failure {
            error: format!("approval '{}' was rejected", step.id),
        },
        None => ExecutionResult::Flagged {
            reason: config.instructions.clone(),
            output: json!({ "approver": approver, "instructions": config.instructions }),
        },
    }
}

/// Lowercase, collapse non-alphanumerics to `_`, trim underscores.
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    for c in label.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
