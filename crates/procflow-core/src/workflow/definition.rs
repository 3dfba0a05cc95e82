//! Loading, saving and structural checking of workflow definitions.
//!
//! Definitions live on disk as YAML (`.yaml`, `.yml`) or JSON (`.json`).
//! Structural checks cover what would make a run impossible to drive: a
//! missing name, no steps, duplicate or blank step ids, branches that point
//! nowhere or backwards, and file triggers without a folder. Whether each
//! step's action is fully configured is reported separately by
//! `validation::validate`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use procflow_types::workflow::{StepConfig, TriggerConfig, WorkflowDefinition};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("cannot parse workflow: {0}")]
    Parse(String),

    /// Every structural problem found, in step order.
    #[error("invalid workflow: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// On-disk encoding of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Yaml,
    Json,
}

impl DefinitionFormat {
    /// Format implied by a file extension, if it is a workflow file at all.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> WorkflowError + '_ {
    move |source| WorkflowError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a definition and check its structure. YAML is a superset of JSON,
/// so JSON text is accepted too.
pub fn parse_definition(text: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let def: WorkflowDefinition =
        serde_yaml_ng::from_str(text).map_err(|e| WorkflowError::Parse(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

pub fn render_definition(
    def: &WorkflowDefinition,
    format: DefinitionFormat,
) -> Result<String, WorkflowError> {
    match format {
        DefinitionFormat::Yaml => {
            serde_yaml_ng::to_string(def).map_err(|e| WorkflowError::Parse(e.to_string()))
        }
        DefinitionFormat::Json => {
            serde_json::to_string_pretty(def).map_err(|e| WorkflowError::Parse(e.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

/// List the structural problems of `def`. Empty means the engine can drive it.
pub fn structural_problems(def: &WorkflowDefinition) -> Vec<String> {
    let mut problems = Vec::new();

    if def.name.trim().is_empty() {
        problems.push("workflow name must not be empty".to_string());
    }
    if def.steps.is_empty() {
        problems.push("workflow must have at least one step".to_string());
    }

    let mut ids = HashSet::new();
    for (index, step) in def.steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            problems.push(format!("step {index} has no id"));
        } else if !ids.insert(step.id.as_str()) {
            problems.push(format!("duplicate step id '{}'", step.id));
        }
    }

    for (index, step) in def.steps.iter().enumerate() {
        let StepConfig::Branch(branch) = &step.config else {
            continue;
        };
        for target in branch.then_step.iter().chain(&branch.else_step) {
            match def.step_index(target) {
                None => problems.push(format!(
                    "branch '{}' targets unknown step '{target}'",
                    step.id
                )),
                Some(at) if at <= index => problems.push(format!(
                    "branch '{}' jumps backwards to '{target}'",
                    step.id
                )),
                Some(_) => {}
            }
        }
    }

    if let Some(TriggerConfig::FileCreated { folder_path }) = &def.trigger {
        if folder_path.trim().is_empty() {
            problems.push("file_created trigger needs a folder_path".to_string());
        }
    }

    problems
}

pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    let problems = structural_problems(def);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::Invalid(problems))
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
    let text = std::fs::read_to_string(path).map_err(io_error(path))?;
    parse_definition(&text)
}

/// Write `def` to `path` in the format its extension names (YAML otherwise),
/// creating parent directories as needed.
pub fn save_workflow_file(path: &Path, def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let format = DefinitionFormat::from_path(path).unwrap_or(DefinitionFormat::Yaml);
    let text = render_definition(def, format)?;
    std::fs::write(path, text).map_err(io_error(path))
}

/// Every loadable workflow file under `base_dir`, sorted by path.
///
/// Files that fail to load are logged and skipped. A missing directory
/// yields nothing.
pub fn discover_workflows(
    base_dir: &Path,
) -> Result<Vec<(PathBuf, WorkflowDefinition)>, WorkflowError> {
    let mut found = Vec::new();
    if !base_dir.is_dir() {
        return Ok(found);
    }

    let mut pending = vec![base_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).map_err(io_error(&dir))? {
            let path = entry.map_err(io_error(&dir))?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            if DefinitionFormat::from_path(&path).is_none() {
                continue;
            }
            match load_workflow_file(&path) {
                Ok(def) => found.push((path, def)),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping workflow file"),
            }
        }
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}
