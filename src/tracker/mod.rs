//! Issue-tracker access.
//!
//! The engine consumes the tracker through a narrow capability interface
//! so tests can substitute an in-memory fake and the triage logic stays
//! independent of any one vendor SDK.

pub mod github;
pub mod index;
pub mod signature;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One issue as listed from the tracker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueRecord {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Set when the issue has been closed.
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

impl IssueRecord {
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
}

/// One comment on an issue or pull request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: u64,
    #[serde(default)]
    pub body: String,
}

/// Narrow capability interface over the issue tracker.
///
/// Issues and pull requests share a comment namespace, so the comment
/// operations serve both.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// All open issues carrying every one of `labels`.
    async fn list_open_issues(&self, labels: &[String]) -> Result<Vec<IssueRecord>>;

    /// All issues of any state created by `creator` and carrying `labels`.
    async fn list_issues_by_creator(
        &self,
        creator: &str,
        labels: &[String],
    ) -> Result<Vec<IssueRecord>>;

    /// Comments of one issue or PR, oldest first.
    async fn list_comments(&self, number: u64) -> Result<Vec<CommentRecord>>;

    /// Create an issue; returns its number.
    async fn create_issue(&self, title: &str, body: &str, labels: &[String]) -> Result<u64>;

    /// Comment on an issue or PR.
    async fn create_comment(&self, number: u64, body: &str) -> Result<()>;

    /// Replace the body of an existing comment.
    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<()>;

    /// Reopen an issue; a no-op when it is already open.
    async fn reopen_issue(&self, number: u64) -> Result<()>;
}

/// Comment on `number` and reopen it in case it was closed.
pub async fn comment_and_reopen(
    tracker: &dyn IssueTracker,
    number: u64,
    body: &str,
) -> Result<()> {
    tracker.create_comment(number, body).await?;
    tracker.reopen_issue(number).await
}
