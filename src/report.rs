//! Rendering of triage verdicts into tracker-facing text.
//!
//! Issue bodies embed the failure signature under the marker fences from
//! [`crate::tracker::signature`], so everything written here can be parsed
//! back when the index is rebuilt.

use crate::ci::BuildFailure;
use crate::tracker::signature::{
    FAILURE_OUTPUT_FENCE, FAILURE_OUTPUT_HEADING, ISSUE_TITLE_PREFIX, STACK_TRACE_FENCE,
    STACK_TRACE_HEADING, STDERR_FENCE, STDERR_HEADING, STDOUT_FENCE, STDOUT_HEADING,
    TEST_NAME_FENCE, TEST_NAME_HEADING,
};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// PR comment command that promotes a failure to a tracked flake.
pub const NEW_FLAKE_COMMAND: &str = "/flake-triage new-flake";

/// Title of the tracking issue for a failure.
#[must_use]
pub fn issue_title(test_name: &str) -> String {
    format!("{ISSUE_TITLE_PREFIX}{test_name}")
}

fn fenced(out: &mut String, heading: &str, fence: &str, content: &str, collapsed: bool) {
    out.push_str(heading);
    out.push('\n');
    if collapsed {
        out.push_str("<details><summary>Click to show.</summary>\n\n");
    }
    out.push_str(fence);
    out.push('\n');
    out.push_str(content);
    out.push_str("\n```\n");
    if collapsed {
        out.push_str("</details>\n");
    }
    out.push('\n');
}

/// Full signature rendering shared by issue bodies and issue comments.
fn signature_blocks(failure: &BuildFailure) -> String {
    let mut out = String::new();
    fenced(
        &mut out,
        TEST_NAME_HEADING,
        TEST_NAME_FENCE,
        &failure.test.test_name,
        false,
    );
    fenced(
        &mut out,
        FAILURE_OUTPUT_HEADING,
        FAILURE_OUTPUT_FENCE,
        &failure.test.failure_output,
        false,
    );
    fenced(
        &mut out,
        STACK_TRACE_HEADING,
        STACK_TRACE_FENCE,
        &failure.test.stack_trace,
        true,
    );
    fenced(
        &mut out,
        STDOUT_HEADING,
        STDOUT_FENCE,
        &failure.test.standard_output,
        true,
    );
    fenced(
        &mut out,
        STDERR_HEADING,
        STDERR_FENCE,
        &failure.test.standard_error,
        true,
    );

    out.push_str("Artifacts:\n<details><summary>Click to show.</summary>\n\n");
    for artifact in &failure.artifacts {
        let _ = writeln!(out, "- {artifact}");
    }
    out.push_str("</details>\n\n");
    let _ = writeln!(out, "Build URL: {}", failure.url);
    out
}

/// Body of a freshly created tracking issue.
#[must_use]
pub fn issue_body(failure: &BuildFailure) -> String {
    let mut out = signature_blocks(failure);
    out.push_str(
        "\nIf this is a duplicate of an existing flake, comment \
         'Duplicate of #<issue-number>' and close this issue.\n",
    );
    out
}

/// Comment left on a tracking issue when a PR hits its flake.
#[must_use]
pub fn issue_hit_comment(pr_number: u64, similarity_pct: f64, failure: &BuildFailure) -> String {
    format!(
        "PR #{pr_number} hit this flake with {similarity_pct:.2}% similarity:\n\
         <details><summary>Click to show.</summary>\n\n{}</details>",
        signature_blocks(failure)
    )
}

fn similarity_list(percentages: &[f64]) -> String {
    let joined = percentages
        .iter()
        .map(|p| format!("{p:.2}%"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{joined} similarity")
}

fn issue_refs(issues: &BTreeMap<u64, Vec<f64>>) -> String {
    issues
        .iter()
        .map(|(number, percentages)| format!("#{number} ({})", similarity_list(percentages)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// PR comment when every failure matched a known flake.
#[must_use]
pub fn known_flakes_comment(job_name: &str, issues: &BTreeMap<u64, Vec<f64>>) -> String {
    format!("Job '{job_name}' hit: {}\n", issue_refs(issues))
}

/// PR comment when known flakes were hit AND unmatched failures remain;
/// the leftovers might be new flakes.
#[must_use]
pub fn mixed_comment(
    job_name: &str,
    unclassified: &[BuildFailure],
    issues: &BTreeMap<u64, Vec<f64>>,
) -> String {
    let plural = if unclassified.len() > 1 { "s" } else { "" };
    format!(
        "Job '{job_name}' has {} failure{plural} that might be new flake{plural} \
         since it also hit {} known flake{}: {}\n",
        unclassified.len(),
        issues.len(),
        if issues.len() > 1 { "s" } else { "" },
        issue_refs(issues)
    )
}

/// PR comment for a single unmatched failure, inviting promotion.
#[must_use]
pub fn single_failure_comment(failure: &BuildFailure) -> String {
    let mut out = format!(
        "Job '{}' failed:\n<details><summary>Click to show.</summary>\n\n",
        failure.job_name
    );
    fenced(
        &mut out,
        TEST_NAME_HEADING,
        TEST_NAME_FENCE,
        &failure.test.test_name,
        false,
    );
    fenced(
        &mut out,
        FAILURE_OUTPUT_HEADING,
        FAILURE_OUTPUT_FENCE,
        &failure.test.failure_output,
        false,
    );
    let _ = write!(
        out,
        "</details>\n\nBuild URL: {}\n\n\
         If it is a flake and an issue doesn't already exist to track it, comment \
         `{NEW_FLAKE_COMMAND} {}` so I can create one.\n\n\
         Then please upload the build artifacts to that issue.",
        failure.url, failure.job_name
    );
    out
}

/// PR comment for several unmatched failures and no known flakes: likely a
/// genuine regression, so just list them.
#[must_use]
pub fn failure_list_comment(job_name: &str, failures: &[BuildFailure]) -> String {
    let mut out = format!(
        "Job '{job_name}' has {} failures, which looks more like a regression than flakiness:\n",
        failures.len()
    );
    for failure in failures {
        let _ = writeln!(out, "- {}", failure.test.test_name);
    }
    if let Some(first) = failures.first() {
        let _ = writeln!(out, "\nBuild URL: {}", first.url);
    }
    out
}

/// PR acknowledgement after tracking issues were created on request.
#[must_use]
pub fn new_issues_comment(issues: &[u64]) -> String {
    let refs = issues
        .iter()
        .map(|number| format!("#{number}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!(":+1: created {refs}\n")
}

/// PR reply when promotion was refused because the build had too many
/// failures.
#[must_use]
pub fn promotion_refused_comment(failures: usize, max_flakes_per_test: usize) -> String {
    format!(
        ":-1: Unable to create issues: number of failures ({failures}) \
         reaches the maximum permitted ({max_flakes_per_test})."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::signature::{Test, TrackedIssue};

    fn failure() -> BuildFailure {
        BuildFailure {
            build_number: 42,
            job_name: "Widgets-PR-K8s".to_string(),
            artifacts: vec!["https://ci.example.io/job/J/42/artifact/logs.zip".to_string()],
            url: "https://ci.example.io/job/J/42/".to_string(),
            test: Test {
                test_name: "TestConntrackGC".to_string(),
                failure_output: "FAIL: gc did not reclaim entries".to_string(),
                stack_trace: "at conntrack.go:42".to_string(),
                standard_output: "setting up".to_string(),
                standard_error: "FAIL: gc did not reclaim entries".to_string(),
            },
        }
    }

    #[test]
    fn issue_body_roundtrips_through_parser() {
        let failure = failure();
        let body = issue_body(&failure);
        let parsed = TrackedIssue::parse(&issue_title(&failure.test.test_name), &body);
        assert_eq!(parsed.test.test_name, failure.test.test_name);
        assert_eq!(parsed.test.failure_output, failure.test.failure_output);
        assert_eq!(parsed.test.stack_trace, failure.test.stack_trace);
        assert_eq!(parsed.test.standard_output, failure.test.standard_output);
        assert_eq!(parsed.test.standard_error, failure.test.standard_error);
    }

    #[test]
    fn issue_hit_comment_mentions_pr_and_similarity() {
        let comment = issue_hit_comment(1234, 99.87, &failure());
        assert!(comment.starts_with("PR #1234 hit this flake with 99.87% similarity"));
        assert!(comment.contains("TestConntrackGC"));
    }

    #[test]
    fn known_flakes_comment_lists_issues() {
        let mut issues = BTreeMap::new();
        issues.insert(501, vec![100.0]);
        issues.insert(502, vec![92.5, 88.25]);
        let comment = known_flakes_comment("Widgets-PR-K8s", &issues);
        assert!(comment.contains("#501 (100.00% similarity)"));
        assert!(comment.contains("#502 (92.50%, 88.25% similarity)"));
    }

    #[test]
    fn mixed_comment_pluralizes() {
        let mut issues = BTreeMap::new();
        issues.insert(501, vec![100.0]);
        let comment = mixed_comment("J", &[failure(), failure()], &issues);
        assert!(comment.contains("2 failures"));
        assert!(comment.contains("new flakes"));
        assert!(comment.contains("1 known flake:"));
    }

    #[test]
    fn single_failure_comment_invites_promotion() {
        let comment = single_failure_comment(&failure());
        assert!(comment.contains("/flake-triage new-flake Widgets-PR-K8s"));
        assert!(comment.contains("FAIL: gc did not reclaim entries"));
    }

    #[test]
    fn failure_list_comment_names_each_test() {
        let comment = failure_list_comment("J", &[failure(), failure()]);
        assert!(comment.contains("2 failures"));
        assert!(comment.contains("- TestConntrackGC"));
        assert!(comment.contains("regression"));
    }

    #[test]
    fn new_issues_comment_format() {
        assert_eq!(new_issues_comment(&[601, 602]), ":+1: created #601 #602\n");
    }

    #[test]
    fn promotion_refused_comment_mentions_limit() {
        let comment = promotion_refused_comment(12, 5);
        assert!(comment.contains("(12)"));
        assert!(comment.contains("(5)"));
    }
}
