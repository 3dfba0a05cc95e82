//! User directory port.
//!
//! Escalation needs to turn an email address into a user identity. The
//! infrastructure layer implements this over the `users` table.

use procflow_types::error::RepositoryError;
use procflow_types::workflow::UserIdentity;

/// Lookup of human actors by email.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait UserDirectory: Send + Sync {
    /// Find a user by email (case-insensitive). `None` when unknown.
    fn find_by_email(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = Result<Option<UserIdentity>, RepositoryError>> + Send;
}
