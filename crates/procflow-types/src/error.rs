use thiserror::Error;

/// Errors raised by the storage ports (workflow repository, user directory).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("query error: {0}")]
    Query(String),

    /// A stored definition or run could not be encoded or decoded.
    #[error("malformed {kind} document: {reason}")]
    Document { kind: &'static str, reason: String },

    #[error("entity not found")]
    NotFound,

    /// Optimistic concurrency check failed, or the id is already taken.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    pub fn document(kind: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Document {
            kind,
            reason: reason.to_string(),
        }
    }
}
