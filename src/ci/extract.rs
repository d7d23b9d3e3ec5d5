//! Structured failure extraction from one fetched build.

use crate::ci::{BuildFailure, FetchedBuild};
use crate::tracker::signature::Test;
use regex::Regex;
use std::sync::OnceLock;

/// Case statuses that count as failures; everything else is ignored.
const STATUS_FAILED: &str = "FAILED";
const STATUS_REGRESSION: &str = "REGRESSION";

/// Build parameter carrying the PR number.
const PR_PARAMETER: &str = "ghprbPullId";

static FAIL_REGEX: OnceLock<Regex> = OnceLock::new();

/// First `FAIL:` line of the captured standard error, used as the
/// failure-output excerpt.
fn failure_excerpt(stderr: &str) -> String {
    let re = FAIL_REGEX.get_or_init(|| Regex::new(r"FAIL:[^\n]+").expect("static regex"));
    re.find(stderr)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// PR number from the build parameters, 0 when the build has no PR
/// association (scheduled or baseline run).
///
/// The parameter key can appear more than once; one occurrence holds the
/// actual number, another the unexpanded `${ghprbPullId}` template
/// placeholder. Non-numeric values are skipped, not errors.
#[must_use]
pub fn pr_number(build: &FetchedBuild) -> u64 {
    build
        .parameters
        .iter()
        .filter(|p| p.name == PR_PARAMETER)
        .find_map(|p| p.value.parse::<u64>().ok())
        .unwrap_or(0)
}

/// Extract the ordered sequence of failures from one fetched build.
///
/// Every failure of the build carries the full artifact-URL list; no
/// per-suite attribution is attempted.
#[must_use]
pub fn build_failures(job_name: &str, build_number: i64, build: &FetchedBuild) -> Vec<BuildFailure> {
    let mut failures = Vec::new();
    for case in &build.cases {
        if case.status != STATUS_FAILED && case.status != STATUS_REGRESSION {
            continue;
        }
        let stdout = case.stdout.clone().unwrap_or_default();
        let stderr = case.stderr.clone().unwrap_or_default();
        let stack_trace = case.stack_trace.clone().unwrap_or_default();
        failures.push(BuildFailure {
            build_number,
            job_name: job_name.to_string(),
            artifacts: build.artifacts.clone(),
            url: build.url.clone(),
            test: Test {
                test_name: case.name.clone(),
                failure_output: failure_excerpt(&stderr),
                stack_trace,
                standard_output: stdout,
                standard_error: stderr,
            },
        });
    }
    failures
}
