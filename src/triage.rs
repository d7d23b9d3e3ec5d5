//! The triage engine.
//!
//! Owns one batch's working state: the known-issue index and the
//! per-job baseline cache, both discarded when the batch ends. A failure
//! is checked against the index first, then against the stable-branch
//! baseline; only a failure matching neither is surfaced as unclassified.

use crate::ci::{crawl, extract, split_job_name_number, BuildFailure, CiServer, JobFailures};
use crate::config::FlakeConfig;
use crate::error::{Error, Result};
use crate::report;
use crate::similarity::similar_flake;
use crate::tracker::index::{self, KnownIssueIndex};
use crate::tracker::signature::TrackedIssue;
use crate::tracker::{comment_and_reopen, IssueTracker};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Triage result for one failing build URL.
#[derive(Debug, Clone, Default)]
pub struct BuildVerdict {
    pub job_name: String,
    /// Matched issue number to the similarity percentages that hit it;
    /// several failures of one build may match the same issue.
    pub known: BTreeMap<u64, Vec<f64>>,
    /// Failures matching neither the index nor the baseline.
    pub unclassified: Vec<BuildFailure>,
}

impl BuildVerdict {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.known.is_empty() && self.unclassified.is_empty()
    }
}

/// Drop ignorable failures, then drop the whole build when too many
/// remain.
///
/// A build with more filtered failures than `max-flakes-per-test` is
/// broken wholesale; reporting its failures as flakes would only
/// manufacture false positives.
fn filter_flakes(
    cfg: &FlakeConfig,
    failures: Vec<BuildFailure>,
    build_url: &str,
) -> Vec<BuildFailure> {
    let total = failures.len();
    let kept: Vec<BuildFailure> = failures
        .into_iter()
        .filter(|failure| !cfg.common_failure(&failure.test.failure_output))
        .collect();

    if kept.len() > cfg.max_flakes_per_test {
        warn!(
            build_url,
            kept = kept.len(),
            total,
            max_flakes_per_test = cfg.max_flakes_per_test,
            "build has more failures than expected, ignoring all of them"
        );
        return Vec::new();
    }
    kept
}

pub struct TriageEngine {
    ci: Arc<dyn CiServer>,
    tracker: Arc<dyn IssueTracker>,
    cfg: FlakeConfig,
    trigger: Option<Regex>,
    known_issues: KnownIssueIndex,
    baseline: HashMap<String, JobFailures>,
}

impl TriageEngine {
    /// Build an engine for one triage batch, constructing the known-issue
    /// index from the tracker.
    pub async fn new(
        ci: Arc<dyn CiServer>,
        tracker: Arc<dyn IssueTracker>,
        cfg: FlakeConfig,
    ) -> Result<Self> {
        let known_issues = index::build_known_issue_index(
            tracker.as_ref(),
            &cfg.issue_tracker.bot_login,
            &cfg.issue_tracker.issue_labels,
        )
        .await?;
        Self::with_index(ci, tracker, cfg, known_issues)
    }

    /// Build an engine around an already-constructed index.
    pub fn with_index(
        ci: Arc<dyn CiServer>,
        tracker: Arc<dyn IssueTracker>,
        cfg: FlakeConfig,
        known_issues: KnownIssueIndex,
    ) -> Result<Self> {
        cfg.validate()?;
        let trigger = if cfg.ci.trigger_pattern.is_empty() {
            None
        } else {
            Some(
                Regex::new(&cfg.ci.trigger_pattern)
                    .map_err(|e| Error::config(format!("trigger-pattern: {e}")))?,
            )
        };
        Ok(Self {
            ci,
            tracker,
            cfg,
            trigger,
            known_issues,
            baseline: HashMap::new(),
        })
    }

    #[must_use]
    pub const fn known_issues(&self) -> &KnownIssueIndex {
        &self.known_issues
    }

    /// Triage one failing build URL for `pr_number`.
    ///
    /// Returns `None` for builds that produce no verdict: jobs without a
    /// stable-baseline mapping, builds with nothing left after filtering,
    /// and wholesale-broken builds.
    pub async fn triage_build(
        &mut self,
        pr_number: u64,
        build_url: &str,
    ) -> Result<Option<BuildVerdict>> {
        let Some((job_name, build_number)) = split_job_name_number(build_url) else {
            warn!(build_url, pr_number, "failing URL is not a job build page");
            return Ok(None);
        };

        let Some(stable_jobs) = self.cfg.stable_jobs_for(&job_name) else {
            // Not every failing job is flake-tracked.
            warn!(%job_name, pr_number, "job has no stable-baseline mapping");
            return Ok(None);
        };
        let stable_jobs: Vec<String> = stable_jobs.to_vec();

        let Some(build) = self.ci.fetch_build(&job_name, build_number).await? else {
            return Ok(None);
        };
        let failures = extract::build_failures(&job_name, build_number, &build);
        let failures = filter_flakes(&self.cfg, failures, build_url);
        if failures.is_empty() {
            return Ok(None);
        }

        let mut verdict = BuildVerdict {
            job_name,
            ..BuildVerdict::default()
        };

        'failures: for failure in failures {
            // Known, already-tracked flakes take precedence: never
            // duplicate one into a new issue.
            if let Some((issue_number, sim)) =
                index::lookup(&self.known_issues, &failure.test, self.cfg.flake_similarity)
            {
                info!(
                    issue_number,
                    test_name = %failure.test.test_name,
                    pr_number,
                    "failure matches tracked flake"
                );
                let body = report::issue_hit_comment(pr_number, 100.0 * sim, &failure);
                comment_and_reopen(self.tracker.as_ref(), issue_number, &body).await?;
                verdict
                    .known
                    .entry(issue_number)
                    .or_default()
                    .push(100.0 * sim);
                continue 'failures;
            }

            // Unknown to the tracker: does the stable branch hit it too?
            for stable_job in &stable_jobs {
                self.ensure_baseline(stable_job).await?;
                let matched = self.baseline[stable_job.as_str()]
                    .values()
                    .flatten()
                    .find_map(|stable| {
                        similar_flake(&stable.test, &failure.test, self.cfg.flake_similarity)
                    });
                let Some(sim) = matched else {
                    continue;
                };

                // Create the tracking issue immediately so the signature
                // is indexed before the next failure is processed.
                let title = report::issue_title(&failure.test.test_name);
                let body = report::issue_body(&failure);
                let issue_number = self
                    .tracker
                    .create_issue(&title, &body, &self.cfg.issue_tracker.issue_labels)
                    .await?;
                info!(
                    issue_number,
                    %stable_job,
                    test_name = %failure.test.test_name,
                    pr_number,
                    "failure also present on stable branch, created tracking issue"
                );
                let hit = report::issue_hit_comment(pr_number, 100.0 * sim, &failure);
                self.tracker.create_comment(issue_number, &hit).await?;
                self.known_issues.insert(
                    issue_number,
                    TrackedIssue {
                        title,
                        test: failure.test.clone(),
                    },
                );
                verdict
                    .known
                    .entry(issue_number)
                    .or_default()
                    .push(100.0 * sim);
                continue 'failures;
            }

            info!(
                test_name = %failure.test.test_name,
                pr_number, "failure matches no tracked flake and no baseline"
            );
            verdict.unclassified.push(failure);
        }

        Ok(Some(verdict))
    }

    /// Crawl and filter one stable job's history, at most once per batch.
    async fn ensure_baseline(&mut self, stable_job: &str) -> Result<()> {
        if self.baseline.contains_key(stable_job) {
            return Ok(());
        }
        info!(stable_job, "baseline not cached yet, crawling");
        let cfg = &self.cfg;
        let crawled = crawl::crawl_job_filtered(&self.ci, stable_job, |bucket, job| {
            filter_flakes(cfg, bucket, job)
        })
        .await?;
        self.baseline.insert(stable_job.to_string(), crawled);
        Ok(())
    }

    /// Triage a batch of failing build URLs for one PR and report the
    /// verdicts back as a single growing PR comment.
    ///
    /// Stops on the first hard error; comment rendering happens only
    /// after a build's triage fully succeeded, so a failed batch posts
    /// nothing partial.
    pub async fn triage_batch(&mut self, pr_number: u64, build_urls: &[String]) -> Result<()> {
        for build_url in build_urls {
            let Some(verdict) = self.triage_build(pr_number, build_url).await? else {
                continue;
            };
            if verdict.is_empty() {
                continue;
            }

            let comment = if verdict.unclassified.is_empty() {
                report::known_flakes_comment(&verdict.job_name, &verdict.known)
            } else if !verdict.known.is_empty() {
                report::mixed_comment(&verdict.job_name, &verdict.unclassified, &verdict.known)
            } else if verdict.unclassified.len() == 1 {
                report::single_failure_comment(&verdict.unclassified[0])
            } else {
                // Several simultaneous unmatched failures look like a
                // genuine regression; list them without promoting any.
                report::failure_list_comment(&verdict.job_name, &verdict.unclassified)
            };

            self.create_or_append_pr_comment(pr_number, &comment).await?;
        }
        Ok(())
    }

    /// Create one tracking issue per failure of the given build, on
    /// explicit request from the PR.
    pub async fn promote_new_flakes(
        &mut self,
        pr_number: u64,
        job_name: &str,
        build_number: i64,
    ) -> Result<()> {
        let Some(build) = self.ci.fetch_build(job_name, build_number).await? else {
            return Err(Error::validation(format!(
                "build #{build_number} of job {job_name:?} no longer exists"
            )));
        };
        let failures = extract::build_failures(job_name, build_number, &build);
        if failures.is_empty() {
            return Err(Error::validation(format!(
                "build #{build_number} of job {job_name:?} had no failures"
            )));
        }

        let comment = if failures.len() < self.cfg.max_flakes_per_test {
            let mut created = Vec::with_capacity(failures.len());
            for failure in failures {
                let title = report::issue_title(&failure.test.test_name);
                let body = report::issue_body(&failure);
                let issue_number = self
                    .tracker
                    .create_issue(&title, &body, &self.cfg.issue_tracker.issue_labels)
                    .await?;
                self.known_issues.insert(
                    issue_number,
                    TrackedIssue {
                        title,
                        test: failure.test,
                    },
                );
                created.push(issue_number);
            }
            info!(pr_number, issues = created.len(), "created tracking issues");
            report::new_issues_comment(&created)
        } else {
            report::promotion_refused_comment(failures.len(), self.cfg.max_flakes_per_test)
        };

        self.create_or_append_pr_comment(pr_number, &comment).await
    }

    /// Append `comment` to the most recent PR comment matching the
    /// trigger pattern; create a new one when none matches. Keeps a PR on
    /// one growing triage comment instead of one comment per job.
    async fn create_or_append_pr_comment(&self, pr_number: u64, comment: &str) -> Result<()> {
        let triggered = match &self.trigger {
            Some(trigger) => self
                .tracker
                .list_comments(pr_number)
                .await?
                .into_iter()
                .filter(|c| trigger.is_match(&c.body))
                .last(),
            None => None,
        };

        match triggered {
            Some(existing) => {
                let body = format!("{}\n\n{comment}", existing.body);
                self.tracker.update_comment(existing.id, &body).await
            }
            None => self.tracker.create_comment(pr_number, comment).await,
        }
    }
}
