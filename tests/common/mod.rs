//! In-memory fakes of the CI-server and issue-tracker interfaces.
//!
//! Both fakes record every write so tests can assert on created issues,
//! posted comments and reopen calls.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use flake_triage::ci::{BuildParameter, CiServer, FetchedBuild, FetchedCase};
use flake_triage::error::{Error, Result};
use flake_triage::tracker::{CommentRecord, IssueRecord, IssueTracker};
use std::collections::HashMap;
use std::sync::Mutex;

// ── CI server ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeCi {
    /// `None` entries model builds pruned from CI history.
    builds: Mutex<HashMap<(String, i64), Option<FetchedBuild>>>,
    /// Build numbers that fail hard when fetched.
    poisoned: Mutex<Vec<i64>>,
}

impl FakeCi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_build(&self, job_name: &str, build_number: i64, build: FetchedBuild) {
        self.builds
            .lock()
            .unwrap()
            .insert((job_name.to_string(), build_number), Some(build));
    }

    pub fn add_pruned_build(&self, job_name: &str, build_number: i64) {
        self.builds
            .lock()
            .unwrap()
            .insert((job_name.to_string(), build_number), None);
    }

    pub fn poison_build(&self, build_number: i64) {
        self.poisoned.lock().unwrap().push(build_number);
    }
}

#[async_trait]
impl CiServer for FakeCi {
    async fn list_build_ids(&self, job_name: &str) -> Result<Vec<i64>> {
        let builds = self.builds.lock().unwrap();
        let mut ids: Vec<i64> = builds
            .keys()
            .filter(|(job, _)| job == job_name)
            .map(|(_, number)| *number)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn fetch_build(&self, job_name: &str, build_number: i64) -> Result<Option<FetchedBuild>> {
        if self.poisoned.lock().unwrap().contains(&build_number) {
            return Err(Error::api("CI server returned 500"));
        }
        Ok(self
            .builds
            .lock()
            .unwrap()
            .get(&(job_name.to_string(), build_number))
            .cloned()
            .flatten())
    }
}

/// A build with one failing case per `(name, stderr, trace)` triple. The
/// failure-output excerpt is whatever `FAIL:` line the stderr carries.
pub fn failing_build(pr: u64, job_name: &str, build_number: i64, cases: &[(&str, &str, &str)]) -> FetchedBuild {
    FetchedBuild {
        url: format!("https://ci.example.io/job/{job_name}/{build_number}/"),
        parameters: if pr == 0 {
            Vec::new()
        } else {
            vec![BuildParameter {
                name: "ghprbPullId".to_string(),
                value: pr.to_string(),
            }]
        },
        artifacts: vec![format!(
            "https://ci.example.io/job/{job_name}/{build_number}/artifact/logs.zip"
        )],
        cases: cases
            .iter()
            .map(|(name, stderr, trace)| FetchedCase {
                name: (*name).to_string(),
                status: "FAILED".to_string(),
                stdout: Some(String::new()),
                stderr: Some((*stderr).to_string()),
                stack_trace: Some((*trace).to_string()),
            })
            .collect(),
    }
}

// ── Issue tracker ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FakeIssue {
    pub record: IssueRecord,
    pub labels: Vec<String>,
    pub creator: String,
}

#[derive(Default)]
pub struct FakeTracker {
    issues: Mutex<Vec<FakeIssue>>,
    comments: Mutex<HashMap<u64, Vec<CommentRecord>>>,
    next_issue_number: Mutex<u64>,
    next_comment_id: Mutex<u64>,
    reopened: Mutex<Vec<u64>>,
    /// Login recorded as creator for issues created through the trait.
    pub bot_login: String,
}

impl FakeTracker {
    pub fn new(bot_login: &str) -> Self {
        Self {
            next_issue_number: Mutex::new(1000),
            bot_login: bot_login.to_string(),
            ..Self::default()
        }
    }

    /// Seed a pre-existing issue.
    pub fn seed_issue(&self, number: u64, title: &str, body: &str, labels: &[&str], creator: &str, closed: bool) {
        self.issues.lock().unwrap().push(FakeIssue {
            record: IssueRecord {
                number,
                title: title.to_string(),
                body: body.to_string(),
                closed_at: closed.then(Utc::now),
            },
            labels: labels.iter().map(ToString::to_string).collect(),
            creator: creator.to_string(),
        });
    }

    /// Seed a comment on an issue or PR.
    pub fn seed_comment(&self, number: u64, body: &str) {
        let id = {
            let mut next = self.next_comment_id.lock().unwrap();
            *next += 1;
            *next
        };
        self.comments
            .lock()
            .unwrap()
            .entry(number)
            .or_default()
            .push(CommentRecord {
                id,
                body: body.to_string(),
            });
    }

    pub fn issue(&self, number: u64) -> Option<FakeIssue> {
        self.issues
            .lock()
            .unwrap()
            .iter()
            .find(|issue| issue.record.number == number)
            .cloned()
    }

    pub fn issue_count(&self) -> usize {
        self.issues.lock().unwrap().len()
    }

    pub fn comments_on(&self, number: u64) -> Vec<CommentRecord> {
        self.comments
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .unwrap_or_default()
    }

    pub fn reopened_issues(&self) -> Vec<u64> {
        self.reopened.lock().unwrap().clone()
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn list_open_issues(&self, labels: &[String]) -> Result<Vec<IssueRecord>> {
        Ok(self
            .issues
            .lock()
            .unwrap()
            .iter()
            .filter(|issue| !issue.record.is_closed())
            .filter(|issue| labels.iter().all(|label| issue.labels.contains(label)))
            .map(|issue| issue.record.clone())
            .collect())
    }

    async fn list_issues_by_creator(
        &self,
        creator: &str,
        labels: &[String],
    ) -> Result<Vec<IssueRecord>> {
        Ok(self
            .issues
            .lock()
            .unwrap()
            .iter()
            .filter(|issue| issue.creator == creator)
            .filter(|issue| labels.iter().all(|label| issue.labels.contains(label)))
            .map(|issue| issue.record.clone())
            .collect())
    }

    async fn list_comments(&self, number: u64) -> Result<Vec<CommentRecord>> {
        Ok(self.comments_on(number))
    }

    async fn create_issue(&self, title: &str, body: &str, labels: &[String]) -> Result<u64> {
        let number = {
            let mut next = self.next_issue_number.lock().unwrap();
            *next += 1;
            *next
        };
        self.issues.lock().unwrap().push(FakeIssue {
            record: IssueRecord {
                number,
                title: title.to_string(),
                body: body.to_string(),
                closed_at: None,
            },
            labels: labels.to_vec(),
            creator: self.bot_login.clone(),
        });
        Ok(number)
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<()> {
        self.seed_comment(number, body);
        Ok(())
    }

    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<()> {
        let mut comments = self.comments.lock().unwrap();
        for bucket in comments.values_mut() {
            if let Some(comment) = bucket.iter_mut().find(|c| c.id == comment_id) {
                comment.body = body.to_string();
                return Ok(());
            }
        }
        Err(Error::api(format!("comment {comment_id} not found")))
    }

    async fn reopen_issue(&self, number: u64) -> Result<()> {
        let mut issues = self.issues.lock().unwrap();
        let Some(issue) = issues.iter_mut().find(|i| i.record.number == number) else {
            return Err(Error::api(format!("issue {number} not found")));
        };
        issue.record.closed_at = None;
        self.reopened.lock().unwrap().push(number);
        Ok(())
    }
}
