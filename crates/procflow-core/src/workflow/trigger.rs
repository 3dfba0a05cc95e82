//! File-created trigger matching.
//!
//! A `FileCreatedEvent` is matched against the organization's published,
//! active definitions whose trigger is `file_created`. Each match starts its
//! own run with the file described in the context under `file`.
//!
//! Folder comparison is a pluggable `FolderMatcher` strategy.

use std::sync::Arc;

use procflow_types::config::FolderMatchMode;
use procflow_types::workflow::{
    FileCreatedEvent, RunContext, RunSource, TriggerConfig, WorkflowDefinition,
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::repository::user::UserDirectory;
use crate::repository::workflow::WorkflowRepository;

use super::engine::{EngineError, RunEngine};

// ---------------------------------------------------------------------------
// Folder matching strategies
// ---------------------------------------------------------------------------

/// Decides whether a created file lies in a trigger's configured folder.
pub trait FolderMatcher: Send + Sync {
    fn matches(&self, file_path: &str, folder: &str) -> bool;
}

/// Lowercase, use `/` separators, and strip leading/trailing slashes.
fn normalize(path: &str) -> String {
    path.replace('\\', "/")
        .to_lowercase()
        .trim_matches('/')
        .to_string()
}

fn parent_folder(normalized_path: &str) -> &str {
    normalized_path
        .rsplit_once('/')
        .map(|(parent, _)| parent)
        .unwrap_or("")
}

/// Whether `folder` looks like an opaque storage identifier rather than a
/// path.
fn is_opaque_id(folder: &str) -> bool {
    folder.len() >= 12
        && folder
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && folder
            .chars()
            .any(|c| c.is_ascii_digit() || c == '-' || c == '_')
}

/// Lenient matching: parent-folder equality, path prefix, or (for opaque
/// storage ids) a bare substring match.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveFolderMatcher;

impl FolderMatcher for PermissiveFolderMatcher {
    fn matches(&self, file_path: &str, folder: &str) -> bool {
        let folder = normalize(folder);
        if folder.is_empty() {
            return false;
        }
        let path = normalize(file_path);

        parent_folder(&path) == folder
            || path.starts_with(&format!("{folder}/"))
            || (is_opaque_id(&folder) && path.contains(&folder))
    }
}

/// Strict matching: the file's parent folder must equal the configured one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactFolderMatcher;

impl FolderMatcher for ExactFolderMatcher {
    fn matches(&self, file_path: &str, folder: &str) -> bool {
        let folder = normalize(folder);
        !folder.is_empty() && parent_folder(&normalize(file_path)) == folder
    }
}

/// Build the matcher selected in configuration.
pub fn folder_matcher(mode: FolderMatchMode) -> Box<dyn FolderMatcher> {
    match mode {
        FolderMatchMode::Permissive => Box::new(PermissiveFolderMatcher),
        FolderMatchMode::Exact => Box::new(ExactFolderMatcher),
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Select the candidates whose file trigger matches `file_path`.
///
/// Only published, active definitions with a `file_created` trigger take
/// part.
pub fn match_definitions<'a>(
    matcher: &dyn FolderMatcher,
    file_path: &str,
    candidates: &'a [WorkflowDefinition],
) -> Vec<&'a WorkflowDefinition> {
    candidates
        .iter()
        .filter(|def| def.is_published && def.is_active)
        .filter(|def| match &def.trigger {
            Some(TriggerConfig::FileCreated { folder_path }) => {
                matcher.matches(file_path, folder_path)
            }
            _ => false,
        })
        .collect()
}

/// Initial context for a file-triggered run.
pub fn file_context(event: &FileCreatedEvent) -> RunContext {
    let name = event
        .file_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(event.file_path.as_str());
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty());

    let mut context = RunContext::new();
    context.insert(
        "file".to_string(),
        json!({
            "path": event.file_path,
            "name": name,
            "extension": extension,
            "metadata": event.file_metadata,
        }),
    );
    context
}

// ---------------------------------------------------------------------------
// TriggerMatcher
// ---------------------------------------------------------------------------

/// Starts runs for file-created events.
pub struct TriggerMatcher<R: WorkflowRepository, U: UserDirectory> {
    engine: Arc<RunEngine<R, U>>,
    folders: Box<dyn FolderMatcher>,
}

impl<R: WorkflowRepository, U: UserDirectory> TriggerMatcher<R, U> {
    pub fn new(engine: Arc<RunEngine<R, U>>, folders: Box<dyn FolderMatcher>) -> Self {
        Self { engine, folders }
    }

    /// Start a run for every definition matching the event.
    ///
    /// Returns the ids of the runs created. A match whose start fails is
    /// logged and skipped; only a failure to load candidates is an error.
    pub async fn dispatch(&self, event: &FileCreatedEvent) -> Result<Vec<Uuid>, EngineError> {
        let candidates = self
            .engine
            .repository()
            .list_active_definitions(event.organization_id.as_deref())
            .await?;
        let matched = match_definitions(self.folders.as_ref(), &event.file_path, &candidates);

        tracing::debug!(
            file = event.file_path.as_str(),
            candidates = candidates.len(),
            matched = matched.len(),
            "file trigger evaluated"
        );

        let mut started = Vec::with_capacity(matched.len());
        for definition in matched {
            match self
                .engine
                .start_run_for(definition, file_context(event), RunSource::FileTrigger)
                .await
            {
                Ok(run) => started.push(run.id),
                Err(e) => {
                    tracing::warn!(
                        workflow_id = %definition.id,
                        workflow = definition.name.as_str(),
                        file = event.file_path.as_str(),
                        error = %e,
                        "failed to start triggered run"
                    );
                }
            }
        }
        Ok(started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::bus::EventBus;
    use crate::repository::memory::{InMemoryUserDirectory, InMemoryWorkflowRepository};
    use crate::workflow::step_runner::StepRunner;
    use crate::workflow::testing::{RecordingServices, definition, step};
    use procflow_types::workflow::{DelayConfig, RunStatus, StepConfig, TransformConfig};

    fn triggered(folder: &str, org: Option<&str>) -> WorkflowDefinition {
        let mut def = definition(vec![step(
            "a",
            StepConfig::Transform(TransformConfig::default()),
        )]);
        def.trigger = Some(TriggerConfig::FileCreated {
            folder_path: folder.to_string(),
        });
        def.organization_id = org.map(String::from);
        def
    }

    #[test]
    fn permissive_matches_parent_folder_case_insensitively() {
        let m = PermissiveFolderMatcher;
        assert!(m.matches("/Resumes/john.pdf", "Resumes"));
        assert!(m.matches("/resumes/john.pdf", "Resumes"));
        assert!(m.matches("resumes\\john.pdf", "/Resumes/"));
        assert!(!m.matches("/Archive/Resumes2/john.pdf", "Resumes"));
    }

    #[test]
    fn permissive_matches_nested_paths_under_folder() {
        let m = PermissiveFolderMatcher;
        assert!(m.matches("/hr/resumes/2024/jane.pdf", "hr/resumes"));
        assert!(!m.matches("/hr/resumes-old/jane.pdf", "hr/resumes"));
    }

    #[test]
    fn permissive_substring_only_for_opaque_ids() {
        let m = PermissiveFolderMatcher;
        assert!(m.matches("/drive/1aB2cD3eF4gH5/cv.pdf", "1aB2cD3eF4gH5"));
        assert!(m.matches("/x/folder_1aB2cD3eF4gH5_copy/cv.pdf", "1aB2cD3eF4gH5"));
        // Plain words never substring-match
        assert!(!m.matches("/x/myresumesarchive/cv.pdf", "resumesarchive"));
        assert!(!m.matches("/x/ab-1/cv.pdf", "ab-1"));
    }

    #[test]
    fn exact_requires_parent_equality() {
        let m = ExactFolderMatcher;
        assert!(m.matches("/Resumes/john.pdf", "resumes"));
        assert!(!m.matches("/Resumes/2024/john.pdf", "resumes"));
        assert!(!m.matches("/drive/1aB2cD3eF4gH5x/cv.pdf", "1aB2cD3eF4gH5"));
    }

    #[test]
    fn unpublished_and_manual_definitions_do_not_match() {
        let mut unpublished = triggered("Resumes", None);
        unpublished.is_published = false;
        let mut inactive = triggered("Resumes", None);
        inactive.is_active = false;
        let manual = definition(vec![step("a", StepConfig::Transform(TransformConfig::default()))]);
        let live = triggered("Resumes", None);

        let candidates = vec![unpublished, inactive, manual, live.clone()];
        let matched = match_definitions(&PermissiveFolderMatcher, "/Resumes/a.pdf", &candidates);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, live.id);
    }

    #[test]
    fn file_context_describes_file() {
        let event = FileCreatedEvent {
            file_path: "/Resumes/John.Smith.PDF".to_string(),
            organization_id: None,
            file_metadata: json!({ "size": 10 }),
        };
        let ctx = file_context(&event);
        assert_eq!(
            ctx["file"],
            json!({
                "path": "/Resumes/John.Smith.PDF",
                "name": "John.Smith.PDF",
                "extension": "pdf",
                "metadata": { "size": 10 },
            })
        );

        let bare = FileCreatedEvent {
            file_path: "README".to_string(),
            organization_id: None,
            file_metadata: Value::Null,
        };
        assert_eq!(file_context(&bare)["file"]["extension"], Value::Null);
    }

    #[tokio::test]
    async fn dispatch_starts_one_run_per_match_in_org() {
        let engine = Arc::new(RunEngine::new(
            Arc::new(InMemoryWorkflowRepository::new()),
            Arc::new(InMemoryUserDirectory::new()),
            StepRunner::new(Arc::new(RecordingServices::default())),
            EventBus::new(16),
        ));
        let a = triggered("Resumes", Some("acme"));
        let b = triggered("resumes/", Some("acme"));
        let other_org = triggered("Resumes", Some("globex"));
        // Invalid step config: start fails and is skipped
        let mut broken = triggered("Resumes", Some("acme"));
        broken.steps = vec![step("d", StepConfig::Delay(DelayConfig::default()))];
        for def in [&a, &b, &other_org, &broken] {
            engine.save_workflow(def).await.unwrap();
        }

        let matcher = TriggerMatcher::new(engine.clone(), folder_matcher(FolderMatchMode::Permissive));
        let started = matcher
            .dispatch(&FileCreatedEvent {
                file_path: "/Resumes/jane.pdf".to_string(),
                organization_id: Some("acme".to_string()),
                file_metadata: Value::Null,
            })
            .await
            .unwrap();

        assert_eq!(started.len(), 2);
        for run_id in started {
            let run = engine.get_run(&run_id).await.unwrap();
            assert_eq!(run.source, RunSource::FileTrigger);
            assert_eq!(run.status, RunStatus::Completed);
            assert_eq!(run.context["file"]["name"], json!("jane.pdf"));
            assert!(run.workflow_id == a.id || run.workflow_id == b.id);
        }
    }
}
