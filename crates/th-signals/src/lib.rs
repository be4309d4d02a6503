//! External repository signals for the trailhead quest bot.
//!
//! Task validators never talk to GitHub directly; they consume the
//! [`RepoSignals`] capability set, and admin commands consume
//! [`RepoAdmin`]. The [`github`] module provides the octocrab-backed
//! production implementations; tests substitute hand-rolled mocks.

pub mod github;

use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure modes of an external signal query.
///
/// Signals are fetched fresh per validation attempt and are never
/// retried internally: a `Transient` failure surfaces to the user as a
/// generic validation failure that is safe to retry by re-commenting.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("transient network error: {0}")]
    Transient(String),
    #[error("not found")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, SignalError>;

// ---------------------------------------------------------------------------
// RepoSignals
// ---------------------------------------------------------------------------

/// Read (plus one assignment write) capabilities against the tracked
/// open-source repository.
///
/// Every call reflects eventually-consistent live state; no caching
/// happens across calls.
#[async_trait]
pub trait RepoSignals: Send + Sync {
    /// Number of currently open issues (excluding pull requests).
    async fn issue_count(&self) -> Result<u64>;

    /// Number of currently open pull requests.
    async fn pull_request_count(&self) -> Result<u64>;

    /// Numbers of all currently open issues (excluding pull requests).
    async fn open_issue_numbers(&self) -> Result<Vec<u64>>;

    /// Whether `user` is (or would become) the first assignee of the issue.
    async fn is_first_assignee(&self, user: &str, issue: u64) -> Result<bool>;

    /// Whether the issue carries a label with the given name.
    async fn has_label(&self, issue: u64, label: &str) -> Result<bool>;

    /// Login of the issue's primary assignee, if any.
    async fn issue_assignee_login(&self, issue: u64) -> Result<Option<String>>;

    /// Whether `user` has commented on the issue.
    async fn user_commented_on_issue(&self, issue: u64, user: &str) -> Result<bool>;

    /// Whether `user` has an open pull request they also commented on.
    async fn user_opened_pr_with_comment(&self, user: &str) -> Result<bool>;

    /// Whether the issue is closed.
    async fn issue_is_closed(&self, issue: u64) -> Result<bool>;

    /// Assign `user` to the issue.
    async fn assign_user(&self, issue: u64, user: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// RepoAdmin
// ---------------------------------------------------------------------------

/// Privileged operations backing the `/`-prefixed admin commands and the
/// webhook's admin gate.
#[async_trait]
pub trait RepoAdmin: Send + Sync {
    /// Whether `user` is an owner of the organization that hosts the bot.
    async fn is_org_owner(&self, user: &str) -> Result<bool>;

    /// Create a per-participant working repository; returns its name.
    async fn create_user_repo(&self, user: &str) -> Result<String>;

    /// Delete a repository by name.
    async fn delete_repo(&self, name: &str) -> Result<()>;

    /// Close every open issue in a repository (used by `/reset_repo`).
    async fn close_open_issues(&self, name: &str) -> Result<()>;
}
