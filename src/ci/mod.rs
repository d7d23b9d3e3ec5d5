//! CI-server access.
//!
//! The engine only needs two capabilities from a CI server: enumerate a
//! job's build ids and fetch one build's result set. Everything else
//! (extraction, crawling) is built on top of those, so tests substitute
//! an in-memory fake and the engine stays decoupled from any one vendor
//! API.

pub mod crawl;
pub mod extract;
pub mod jenkins;

use crate::error::Result;
use crate::tracker::signature::Test;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// One named build parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildParameter {
    pub name: String,
    pub value: String,
}

/// One test case inside a fetched build's result set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchedCase {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub stack_trace: Option<String>,
}

/// One build as fetched from the CI server, before extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchedBuild {
    /// Result-page URL of the build.
    pub url: String,
    #[serde(default)]
    pub parameters: Vec<BuildParameter>,
    /// Artifact URLs of the whole build.
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub cases: Vec<FetchedCase>,
}

/// Narrow capability interface over a CI server.
#[async_trait]
pub trait CiServer: Send + Sync {
    /// All build ids known for `job_name`.
    async fn list_build_ids(&self, job_name: &str) -> Result<Vec<i64>>;

    /// Fetch one build. `None` means the build is gone from CI history
    /// (pruned), which is a soft condition, never an error.
    async fn fetch_build(&self, job_name: &str, build_number: i64) -> Result<Option<FetchedBuild>>;
}

/// One failing test case inside one build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildFailure {
    #[serde(rename = "build-number")]
    pub build_number: i64,
    #[serde(rename = "job-name")]
    pub job_name: String,
    /// Artifact URLs of the whole build; no finer attribution is
    /// attempted.
    pub artifacts: Vec<String>,
    /// Result-page URL of the build.
    pub url: String,
    #[serde(flatten)]
    pub test: Test,
}

/// Failures of one job, grouped by PR number. PR 0 means the build had no
/// PR association (scheduled or baseline run).
pub type JobFailures = HashMap<u64, Vec<BuildFailure>>;

/// Split a build result URL into its job name and build number.
///
/// Returns `None` when the URL does not look like a job build page,
/// e.g. `https://ci.example.io/job/Widgets-PR-K8s/5154/` yields
/// `("Widgets-PR-K8s", 5154)`.
#[must_use]
pub fn split_job_name_number(link: &str) -> Option<(String, i64)> {
    let url = Url::parse(link).ok()?;
    let rest = url.path().strip_prefix("/job/")?;
    let mut parts = rest.split('/');
    let job_name = parts.next()?;
    let build_number: i64 = parts.next()?.parse().ok()?;
    if job_name.is_empty() {
        return None;
    }
    Some((job_name.to_string(), build_number))
}
