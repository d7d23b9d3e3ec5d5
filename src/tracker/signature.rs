//! Failure signatures embedded in tracking-issue bodies.
//!
//! Issue bodies carry the signature as fenced text blocks under fixed
//! markers (a `test-name` fence, a `failure-output` fence, ...). The
//! fences double as an info string for the machine parser and render as
//! plain code blocks for humans, so a fresh process can always rebuild
//! its view of known flakes by text-parsing the tracker — no local cache
//! file is ever needed.

use serde::{Deserialize, Serialize};

pub const TEST_NAME_FENCE: &str = "```test-name";
pub const TEST_NAME_HEADING: &str = "### Test Name";
pub const FAILURE_OUTPUT_FENCE: &str = "```failure-output";
pub const FAILURE_OUTPUT_HEADING: &str = "### Failure Output";
pub const STACK_TRACE_FENCE: &str = "```stack-trace";
pub const STACK_TRACE_HEADING: &str = "### Stacktrace";
pub const STDOUT_FENCE: &str = "```standard-output";
pub const STDOUT_HEADING: &str = "### Standard Output";
pub const STDERR_FENCE: &str = "```standard-error";
pub const STDERR_HEADING: &str = "### Standard Error";

/// Title prefix for tracking issues; legacy issues encode only the test
/// name after it.
pub const ISSUE_TITLE_PREFIX: &str = "CI: ";

/// A failure's content signature.
///
/// Identity for comparison purposes is (test name, failure output, stack
/// trace); standard out/err are informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Test {
    pub test_name: String,
    pub failure_output: String,
    pub stack_trace: String,
    #[serde(default)]
    pub standard_output: String,
    #[serde(default)]
    pub standard_error: String,
}

/// The tracked-issue projection: a title plus the signature reconstructed
/// from the issue body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedIssue {
    pub title: String,
    pub test: Test,
}

impl TrackedIssue {
    /// Rebuild a tracked issue from its title and body.
    ///
    /// Bodies written by this engine carry marker fences; older or
    /// hand-written bodies may only have the human headings, and ancient
    /// ones nothing at all — those fall back to deriving the test name
    /// from the title. Free-form bodies end up with an empty failure
    /// output and will never match on similarity, which is the intended
    /// degrade-gracefully behavior.
    #[must_use]
    pub fn parse(title: &str, body: &str) -> Self {
        let mut test = Test {
            test_name: find_block(body, TEST_NAME_FENCE, TEST_NAME_HEADING),
            failure_output: find_block(body, FAILURE_OUTPUT_FENCE, FAILURE_OUTPUT_HEADING),
            stack_trace: find_block(body, STACK_TRACE_FENCE, STACK_TRACE_HEADING),
            standard_output: find_block(body, STDOUT_FENCE, STDOUT_HEADING),
            standard_error: find_block(body, STDERR_FENCE, STDERR_HEADING),
        };
        if test.test_name.is_empty() {
            test.test_name = title
                .strip_prefix(ISSUE_TITLE_PREFIX)
                .unwrap_or(title)
                .to_string();
        }
        Self {
            title: title.to_string(),
            test,
        }
    }
}

/// Look a block up by its machine fence first, then by its human heading.
fn find_block(body: &str, fence: &str, heading: &str) -> String {
    let text = text_block_between(body, fence, false);
    if !text.is_empty() {
        return text;
    }
    text_block_between(body, heading, true)
}

/// Extract the lines between `marker` and the next closing fence.
///
/// With `skip_first_fence`, the first ``` after the marker opens the block
/// instead of closing it (the human-heading layout puts a plain fence
/// between heading and content).
fn text_block_between(body: &str, marker: &str, mut skip_first_fence: bool) -> String {
    let lines: Vec<&str> = body.lines().collect();
    let mut beginning = None;
    let mut end = None;
    for (idx, line) in lines.iter().enumerate() {
        let line = line.trim();
        if line == marker {
            beginning = Some(idx);
        }
        if beginning.is_some() && line == "```" {
            if skip_first_fence {
                // Heading layout: this fence opens the block.
                skip_first_fence = false;
                beginning = Some(idx);
                continue;
            }
            end = Some(idx);
            break;
        }
    }
    let Some(beginning) = beginning else {
        return String::new();
    };
    let end = end.unwrap_or(lines.len());
    if beginning + 1 >= end {
        return String::new();
    }
    lines[beginning + 1..end].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MACHINE_BODY: &str = "\
### Test Name
```test-name
TestConntrackGC
```

### Failure Output
```failure-output
FAIL: gc did not reclaim entries
```

### Stacktrace
<details><summary>Click to show.</summary>

```stack-trace
at conntrack.go:42
at suite.go:10
```
</details>
";

    #[test]
    fn parses_machine_fences() {
        let issue = TrackedIssue::parse("CI: TestConntrackGC", MACHINE_BODY);
        assert_eq!(issue.test.test_name, "TestConntrackGC");
        assert_eq!(issue.test.failure_output, "FAIL: gc did not reclaim entries");
        assert_eq!(issue.test.stack_trace, "at conntrack.go:42\nat suite.go:10");
    }

    #[test]
    fn falls_back_to_human_headings() {
        let body = "\
### Test Name
```
TestPolicyEnforcement
```

### Failure Output
```
FAIL: policy not applied
```
";
        let issue = TrackedIssue::parse("CI: TestPolicyEnforcement", body);
        assert_eq!(issue.test.test_name, "TestPolicyEnforcement");
        assert_eq!(issue.test.failure_output, "FAIL: policy not applied");
    }

    #[test]
    fn free_form_body_falls_back_to_title() {
        let issue = TrackedIssue::parse("CI: TestHubbleRelay", "something handwritten");
        assert_eq!(issue.test.test_name, "TestHubbleRelay");
        assert_eq!(issue.test.failure_output, "");
    }

    #[test]
    fn title_without_prefix_is_used_verbatim() {
        let issue = TrackedIssue::parse("weird flake in datapath", "");
        assert_eq!(issue.test.test_name, "weird flake in datapath");
    }

    #[test]
    fn unterminated_fence_runs_to_end_of_body() {
        let body = "```failure-output\nFAIL: truncated upload\nmore text";
        let issue = TrackedIssue::parse("CI: X", body);
        assert_eq!(issue.test.failure_output, "FAIL: truncated upload\nmore text");
    }

    #[test]
    fn empty_block_is_empty() {
        let body = "```failure-output\n```";
        let issue = TrackedIssue::parse("CI: X", body);
        assert_eq!(issue.test.failure_output, "");
    }

    #[test]
    fn multiline_blocks_preserved() {
        let body = "```stack-trace\nline one\n\nline three\n```";
        let issue = TrackedIssue::parse("CI: X", body);
        assert_eq!(issue.test.stack_trace, "line one\n\nline three");
    }
}
