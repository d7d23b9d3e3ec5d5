//! Run configuration for the triage engine.
//!
//! The configuration is a YAML document kept next to the repository it
//! serves. It carries the similarity threshold, the per-build failure
//! budget, the ignorable-failure substrings and the mapping from PR job
//! names to the stable jobs used as their baseline.

use crate::error::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Stable jobs correlated with one PR job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StableJobs {
    #[serde(rename = "correlated-with-stable-jobs", default)]
    pub job_names: Vec<String>,
}

/// Issue-tracker side of the configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueTrackerConfig {
    /// Repository the tracking issues live in, as `owner/name`.
    #[serde(default)]
    pub repository: String,

    /// Login of the bot account that creates tracking issues.
    #[serde(rename = "bot-login", default)]
    pub bot_login: String,

    /// Labels applied to (and used to find) bot-created issues.
    #[serde(rename = "issue-labels", default)]
    pub issue_labels: Vec<String>,
}

/// CI-server side of the configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CiConfig {
    /// Base URL of the CI server.
    #[serde(rename = "ci-url", default)]
    pub ci_url: String,

    /// Pattern matching the PR comment that triggered CI. Triage output is
    /// appended to the most recent comment matching this pattern.
    #[serde(rename = "trigger-pattern", default)]
    pub trigger_pattern: String,

    /// Maps a PR job name to the stable jobs used as its baseline. Jobs
    /// absent from this map are not flake-tracked.
    #[serde(rename = "pr-jobs", default)]
    pub pr_jobs: BTreeMap<String, StableJobs>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlakeConfig {
    #[serde(rename = "issue-tracker-config", default)]
    pub issue_tracker: IssueTrackerConfig,

    #[serde(rename = "ci-config", default)]
    pub ci: CiConfig,

    /// Builds with more than this many filtered failures are treated as
    /// wholesale-broken and contribute nothing to triage.
    #[serde(rename = "max-flakes-per-test")]
    pub max_flakes_per_test: usize,

    /// Similarity threshold in [0, 1].
    #[serde(rename = "flake-similarity")]
    pub flake_similarity: f64,

    /// Substrings marking common, ignorable failures.
    #[serde(rename = "ignore-failures", default)]
    pub ignore_failures: Vec<String>,
}

impl FlakeConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_str(&raw)
    }

    /// Parse and validate a YAML document.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(raw: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.flake_similarity) {
            return Err(Error::config(format!(
                "flake-similarity must be within [0, 1], got {}",
                self.flake_similarity
            )));
        }
        if self.max_flakes_per_test == 0 {
            return Err(Error::config("max-flakes-per-test must be nonzero"));
        }
        if !self.ci.trigger_pattern.is_empty() {
            Regex::new(&self.ci.trigger_pattern).map_err(|e| {
                Error::config(format!("trigger-pattern does not compile: {e}"))
            })?;
        }
        if !self.issue_tracker.repository.is_empty()
            && self.issue_tracker.repository.split('/').count() != 2
        {
            return Err(Error::config(format!(
                "repository must be owner/name, got {:?}",
                self.issue_tracker.repository
            )));
        }
        Ok(())
    }

    /// True if `text` contains any of the configured ignorable substrings.
    #[must_use]
    pub fn common_failure(&self, text: &str) -> bool {
        self.ignore_failures
            .iter()
            .any(|needle| text.contains(needle.as_str()))
    }

    /// Stable job names correlated with `pr_job_name`, or `None` when the
    /// job is not flake-tracked.
    #[must_use]
    pub fn stable_jobs_for(&self, pr_job_name: &str) -> Option<&[String]> {
        self.ci
            .pr_jobs
            .get(pr_job_name)
            .map(|s| s.job_names.as_slice())
    }

    /// `(owner, name)` of the tracker repository.
    pub fn repository(&self) -> Result<(&str, &str)> {
        self.issue_tracker
            .repository
            .split_once('/')
            .ok_or_else(|| Error::config("repository is not set"))
    }
}
