//! Text-diff-based failure similarity.
//!
//! Two failures are "the same flake" when their test names match exactly
//! and the diff between their outputs stays small. The metric is crude:
//! strings that diverge early produce many edit segments and score far
//! from 1.0 even when they look related. That bias toward near-exact
//! matches is intentional.

use crate::tracker::signature::Test;
use similar::TextDiff;

/// Similarity of two strings in [0, 1].
///
/// Identical strings score exactly 1.0. Otherwise the score is
/// `1 - segments / ((len(a) + len(b)) / 2)` where `segments` counts the
/// grouped edit operations of a character-level diff, clamped at 0.
#[must_use]
pub fn string_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let half_len = (a.chars().count() + b.chars().count()) as f64 / 2.0;
    if half_len == 0.0 {
        return 1.0;
    }
    let diff = TextDiff::from_chars(a, b);
    // A replace run is a delete segment plus an insert segment.
    let segments: usize = diff
        .ops()
        .iter()
        .map(|op| match op.tag() {
            similar::DiffTag::Replace => 2,
            _ => 1,
        })
        .sum();
    (1.0 - segments as f64 / half_len).max(0.0)
}

/// Check whether `candidate` is the same flake as `reference`.
///
/// Returns the combined similarity when it reaches `threshold`, `None`
/// when the two are not comparable (different test names, empty failure
/// output) or not similar enough. Failure-output and stack-trace
/// similarities are multiplied, so disagreement in either stream drags
/// the combined score down.
#[must_use]
pub fn similar_flake(reference: &Test, candidate: &Test, threshold: f64) -> Option<f64> {
    // Cheap prefilter before any text comparison.
    if reference.test_name != candidate.test_name {
        return None;
    }
    if reference.failure_output.is_empty() || candidate.failure_output.is_empty() {
        return None;
    }

    let fail_sim = string_similarity(&reference.failure_output, &candidate.failure_output);
    let trace_sim = string_similarity(&reference.stack_trace, &candidate.stack_trace);
    let sim = fail_sim * trace_sim;
    if sim >= threshold {
        Some(sim)
    } else {
        None
    }
}
