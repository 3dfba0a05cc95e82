//! Test doubles shared by the workflow module tests.

use std::sync::Mutex;

use procflow_types::workflow::{StepConfig, StepDefinition, TriggerConfig, WorkflowDefinition};
use serde_json::{Value, json};
use uuid::Uuid;

use super::step_runner::{
    DocumentRequest, Extraction, Notification, ServiceFuture, StepError, StepServices,
};

/// Step services that record every call and answer with canned receipts.
#[derive(Debug)]
pub struct RecordingServices {
    confidence: f64,
    fail: bool,
    records: Mutex<Vec<(String, Value)>>,
    extractions: Mutex<Vec<String>>,
    documents: Mutex<Vec<String>>,
    notifications: Mutex<Vec<String>>,
    rows: Mutex<Vec<(String, Value)>>,
}

impl Default for RecordingServices {
    fn default() -> Self {
        Self::with_confidence(1.0)
    }
}

impl RecordingServices {
    pub fn with_confidence(confidence: f64) -> Self {
        Self {
            confidence,
            fail: false,
            records: Mutex::new(Vec::new()),
            extractions: Mutex::new(Vec::new()),
            documents: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
            rows: Mutex::new(Vec::new()),
        }
    }

    /// Services whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<(String, Value)> {
        self.records.lock().unwrap().clone()
    }

    pub fn extractions(&self) -> Vec<String> {
        self.extractions.lock().unwrap().clone()
    }

    pub fn documents(&self) -> Vec<String> {
        self.documents.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn rows(&self) -> Vec<(String, Value)> {
        self.rows.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), StepError> {
        if self.fail {
            Err(StepError::ServiceError("service unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl StepServices for RecordingServices {
    fn insert_record(&self, collection: &str, data: &Value) -> ServiceFuture<'_, Value> {
        let entry = (collection.to_string(), data.clone());
        Box::pin(async move {
            self.check()?;
            let mut records = self.records.lock().unwrap();
            let receipt = json!({ "record_id": records.len() + 1, "data": entry.1.clone() });
            records.push(entry);
            Ok(receipt)
        })
    }

    fn extract(&self, source: &str, fields: &[String]) -> ServiceFuture<'_, Extraction> {
        let source = source.to_string();
        let fields = fields.to_vec();
        Box::pin(async move {
            self.check()?;
            self.extractions.lock().unwrap().push(source);
            Ok(Extraction {
                fields: fields
                    .into_iter()
                    .map(|f| {
                        let value = json!(format!("{f}-value"));
                        (f, value)
                    })
                    .collect(),
                confidence: self.confidence,
            })
        })
    }

    fn generate_document(&self, request: &DocumentRequest) -> ServiceFuture<'_, Value> {
        let name = format!("{}.{}", request.file_name, request.format.extension());
        Box::pin(async move {
            self.check()?;
            self.documents.lock().unwrap().push(name.clone());
            Ok(json!({ "path": name }))
        })
    }

    fn notify(&self, notification: &Notification) -> ServiceFuture<'_, Value> {
        let recipient = notification.recipient.clone();
        Box::pin(async move {
            self.check()?;
            self.notifications.lock().unwrap().push(recipient);
            Ok(json!({ "queued": true }))
        })
    }

    fn append_row(
        &self,
        sheet_id: &str,
        row: &serde_json::Map<String, Value>,
    ) -> ServiceFuture<'_, Value> {
        let entry = (sheet_id.to_string(), Value::Object(row.clone()));
        Box::pin(async move {
            self.check()?;
            let mut rows = self.rows.lock().unwrap();
            rows.push(entry);
            Ok(json!({ "row": rows.len() }))
        })
    }
}

pub fn step(id: &str, config: StepConfig) -> StepDefinition {
    StepDefinition {
        id: id.to_string(),
        title: id.to_string(),
        assignee: None,
        output_variable_name: None,
        config,
    }
}

/// A published, active, manually-triggered definition.
pub fn definition(steps: Vec<StepDefinition>) -> WorkflowDefinition {
    WorkflowDefinition {
        id: Uuid::now_v7(),
        name: "test-workflow".to_string(),
        description: None,
        organization_id: None,
        trigger: Some(TriggerConfig::Manual {}),
        is_published: true,
        is_active: true,
        steps,
    }
}
