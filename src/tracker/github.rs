//! GitHub REST v3 implementation of the issue-tracker interface.

use crate::error::Result;
use crate::http::Client;
use crate::tracker::{CommentRecord, IssueRecord, IssueTracker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

const API_ROOT: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

pub struct GithubClient {
    http: Client,
    token: String,
    owner: String,
    repo: String,
}

impl GithubClient {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: Client::new()?,
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
        })
    }

    fn issues_url(&self, tail: &str) -> String {
        format!("{API_ROOT}/repos/{}/{}/issues{tail}", self.owner, self.repo)
    }

    /// Page through an issue listing until a short page arrives.
    async fn list_issues_paged(&self, base_query: &[(&str, &str)]) -> Result<Vec<IssueRecord>> {
        let mut issues = Vec::new();
        let mut page = 1usize;
        loop {
            let mut request = self
                .http
                .get(&self.issues_url(""))
                .bearer(&self.token)
                .header("Accept", "application/vnd.github+json")
                .query("per_page", PER_PAGE.to_string())
                .query("page", page.to_string());
            for (key, value) in base_query {
                if value.is_empty() {
                    continue;
                }
                request = request.query(*key, *value);
            }
            let response = request.send().await?.success("list issues")?;
            let raw: Vec<RawIssue> = response.json()?;
            let count = raw.len();
            issues.extend(
                raw.into_iter()
                    // The issues endpoint interleaves PRs; skip them.
                    .filter(|issue| issue.pull_request.is_none())
                    .map(IssueRecord::from),
            );
            if count < PER_PAGE {
                return Ok(issues);
            }
            page += 1;
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl From<RawIssue> for IssueRecord {
    fn from(raw: RawIssue) -> Self {
        Self {
            number: raw.number,
            title: raw.title,
            body: raw.body.unwrap_or_default(),
            closed_at: raw.closed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: u64,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    number: u64,
}

#[async_trait]
impl IssueTracker for GithubClient {
    async fn list_open_issues(&self, labels: &[String]) -> Result<Vec<IssueRecord>> {
        let labels = labels.join(",");
        self.list_issues_paged(&[("state", "open"), ("labels", &labels)])
            .await
    }

    async fn list_issues_by_creator(
        &self,
        creator: &str,
        labels: &[String],
    ) -> Result<Vec<IssueRecord>> {
        let labels = labels.join(",");
        self.list_issues_paged(&[("state", "all"), ("creator", creator), ("labels", &labels)])
            .await
    }

    async fn list_comments(&self, number: u64) -> Result<Vec<CommentRecord>> {
        let mut comments = Vec::new();
        let mut page = 1usize;
        loop {
            let response = self
                .http
                .get(&self.issues_url(&format!("/{number}/comments")))
                .bearer(&self.token)
                .header("Accept", "application/vnd.github+json")
                .query("per_page", PER_PAGE.to_string())
                .query("page", page.to_string())
                .send()
                .await?;
            if response.is_not_found() {
                // Issue no longer exists; nothing to read.
                return Ok(comments);
            }
            let raw: Vec<RawComment> = response.success("list comments")?.json()?;
            let count = raw.len();
            comments.extend(raw.into_iter().map(|c| CommentRecord {
                id: c.id,
                body: c.body.unwrap_or_default(),
            }));
            if count < PER_PAGE {
                return Ok(comments);
            }
            page += 1;
        }
    }

    async fn create_issue(&self, title: &str, body: &str, labels: &[String]) -> Result<u64> {
        let response = self
            .http
            .post(&self.issues_url(""))
            .bearer(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&json!({
                "title": title,
                "body": body,
                "labels": labels,
            }))?
            .send()
            .await?
            .success("create issue")?;
        let created: CreatedIssue = response.json()?;
        Ok(created.number)
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<()> {
        self.http
            .post(&self.issues_url(&format!("/{number}/comments")))
            .bearer(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&json!({ "body": body }))?
            .send()
            .await?
            .success("create comment")?;
        Ok(())
    }

    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<()> {
        self.http
            .patch(&self.issues_url(&format!("/comments/{comment_id}")))
            .bearer(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&json!({ "body": body }))?
            .send()
            .await?
            .success("update comment")?;
        Ok(())
    }

    async fn reopen_issue(&self, number: u64) -> Result<()> {
        self.http
            .patch(&self.issues_url(&format!("/{number}")))
            .bearer(&self.token)
            .header("Accept", "application/vnd.github+json")
            .json(&json!({ "state": "open" }))?
            .send()
            .await?
            .success("reopen issue")?;
        Ok(())
    }
}
