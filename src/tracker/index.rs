//! The known-issue index: the engine's long-term memory of tracked flakes.
//!
//! Built once per triage batch from the tracker, keyed by issue number.
//! Closed bot-created issues are re-keyed under the issue a human marked
//! them a duplicate of, so similarity lookups transparently resolve to the
//! canonical surviving issue.

use crate::error::Result;
use crate::similarity::similar_flake;
use crate::tracker::signature::{Test, TrackedIssue};
use crate::tracker::IssueTracker;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

pub type KnownIssueIndex = BTreeMap<u64, TrackedIssue>;

static DUPLICATE_REGEX: OnceLock<Regex> = OnceLock::new();

/// Last issue number declared as "Duplicate of #N" (or a full issue URL)
/// in `body`, if any. Only the verb's leading letter is case-insensitive.
#[must_use]
pub fn duplicate_of(body: &str) -> Option<u64> {
    let re = DUPLICATE_REGEX.get_or_init(|| {
        Regex::new(
            r"[Dd]uplicate of[ ]+(?:https?://(?:www\.)?[^\s/]+/[^\s/]+/[^\s/]+/issues?/|#)([0-9]+)",
        )
        .expect("static regex")
    });
    re.captures_iter(body)
        .last()
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Build the known-issue index for one triage batch.
///
/// Two passes: (a) all open issues carrying the configured labels;
/// (b) all issues of any state created by the bot, to catch issues closed
/// as duplicates. For a closed group-(b) issue not already indexed, the
/// last "Duplicate of #N" comment re-keys its signature under N.
pub async fn build_known_issue_index(
    tracker: &dyn IssueTracker,
    bot_login: &str,
    labels: &[String],
) -> Result<KnownIssueIndex> {
    let mut index = KnownIssueIndex::new();

    for issue in tracker.list_open_issues(labels).await? {
        index.insert(issue.number, TrackedIssue::parse(&issue.title, &issue.body));
    }

    for issue in tracker.list_issues_by_creator(bot_login, labels).await? {
        if index.contains_key(&issue.number) {
            continue;
        }
        let mut key = issue.number;
        if issue.is_closed() {
            if let Some(canonical) = find_duplicate_target(tracker, issue.number).await? {
                key = canonical;
            }
        }
        // Parse the bot issue either way; a duplicate just lands under
        // the canonical number.
        index.insert(key, TrackedIssue::parse(&issue.title, &issue.body));
    }

    debug!(issues = index.len(), "built known-issue index");
    Ok(index)
}

/// Scan an issue's comments for the last duplicate declaration.
async fn find_duplicate_target(
    tracker: &dyn IssueTracker,
    issue_number: u64,
) -> Result<Option<u64>> {
    let mut target = None;
    for comment in tracker.list_comments(issue_number).await? {
        if let Some(number) = duplicate_of(&comment.body) {
            // Multiple people may declare a duplicate; the last one wins.
            target = Some(number);
        }
    }
    Ok(target)
}

/// Find the indexed issue most similar to `failure`, at or above
/// `threshold`.
///
/// Linear scan in ascending issue-number order with a strictly-greater
/// comparison, so ties resolve to the lowest qualifying issue number.
#[must_use]
pub fn lookup(index: &KnownIssueIndex, failure: &Test, threshold: f64) -> Option<(u64, f64)> {
    let mut best: Option<(u64, f64)> = None;
    for (&number, issue) in index {
        let Some(sim) = similar_flake(&issue.test, failure, threshold) else {
            continue;
        };
        if best.map_or(true, |(_, best_sim)| sim > best_sim) {
            best = Some((number, sim));
        }
    }
    best
}
