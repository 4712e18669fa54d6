//! Test-runner output classification.
//!
//! Recognizes the terminal summary of Jest, Vitest, Mocha and TAP-style
//! runners (including `node --test`). Counts are supplementary: the process
//! exit code decides success. All-zero counts with `recognized == false` mean
//! "could not parse", not "no tests ran".

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::transport::strip_ansi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerFormat {
    Jest,
    Vitest,
    Mocha,
    Tap,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCounts {
    pub passed: u32,
    pub failed: u32,
    /// Only when the runner reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<u32>,
    pub total: u32,
    pub recognized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<RunnerFormat>,
}

impl TestCounts {
    pub fn unrecognized() -> Self {
        Self::default()
    }
}

macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).expect("static test-output pattern is valid"))
        }
    };
}

// Tests:       1 failed, 2 skipped, 5 passed, 8 total
static_regex!(jest_line, r"(?m)^\s*Tests:\s+(.*\d+ total)\s*$");
//       Tests  2 failed | 10 passed | 1 skipped (13)
static_regex!(vitest_line, r"(?m)^\s*Tests\s+(.+?)\s*\((\d+)\)\s*$");
static_regex!(labelled_count, r"(\d+) (passed|failed|skipped|todo|total)");
static_regex!(mocha_passing, r"(?m)^\s*(\d+) passing\b");
static_regex!(mocha_failing, r"(?m)^\s*(\d+) failing\b");
static_regex!(mocha_pending, r"(?m)^\s*(\d+) pending\b");
// `# pass 3` (TAP) or `ℹ pass 3` (node --test spec reporter)
static_regex!(
    tap_counter,
    r"(?m)^\s*(?:#|ℹ)\s*(tests|pass|fail|skip|todo|cancelled)\s+(\d+)\s*$"
);

/// Classify raw runner output. First recognized format wins.
pub fn parse(raw: &str) -> TestCounts {
    let text = strip_ansi(raw);
    parse_jest(&text)
        .or_else(|| parse_vitest(&text))
        .or_else(|| parse_mocha(&text))
        .or_else(|| parse_tap(&text))
        .unwrap_or_default()
}

fn num(s: &str) -> u32 {
    s.parse().unwrap_or(0)
}

#[derive(Default)]
struct Labelled {
    passed: u32,
    failed: u32,
    skipped: Option<u32>,
    total: Option<u32>,
}

fn labelled(summary: &str) -> Labelled {
    let mut out = Labelled::default();
    for caps in labelled_count().captures_iter(summary) {
        let n = num(&caps[1]);
        match &caps[2] {
            "passed" => out.passed = n,
            "failed" => out.failed = n,
            "skipped" | "todo" => {
                out.skipped = Some(out.skipped.unwrap_or(0).saturating_add(n))
            }
            "total" => out.total = Some(n),
            _ => {}
        }
    }
    out
}

fn parse_jest(text: &str) -> Option<TestCounts> {
    let caps = jest_line().captures_iter(text).last()?;
    let counts = labelled(&caps[1]);
    Some(TestCounts {
        passed: counts.passed,
        failed: counts.failed,
        skipped: counts.skipped,
        total: counts
            .total
            .unwrap_or(counts.passed.saturating_add(counts.failed)),
        recognized: true,
        format: Some(RunnerFormat::Jest),
    })
}

fn parse_vitest(text: &str) -> Option<TestCounts> {
    let caps = vitest_line()
        .captures_iter(text)
        .filter(|c| labelled_count().is_match(&c[1]))
        .last()?;
    let counts = labelled(&caps[1]);
    Some(TestCounts {
        passed: counts.passed,
        failed: counts.failed,
        skipped: counts.skipped,
        total: num(&caps[2]),
        recognized: true,
        format: Some(RunnerFormat::Vitest),
    })
}

fn parse_mocha(text: &str) -> Option<TestCounts> {
    let passed = num(&mocha_passing().captures_iter(text).last()?[1]);
    let failed = mocha_failing()
        .captures_iter(text)
        .last()
        .map_or(0, |c| num(&c[1]));
    let skipped = mocha_pending().captures_iter(text).last().map(|c| num(&c[1]));
    Some(TestCounts {
        passed,
        failed,
        skipped,
        total: passed
            .saturating_add(failed)
            .saturating_add(skipped.unwrap_or(0)),
        recognized: true,
        format: Some(RunnerFormat::Mocha),
    })
}

fn parse_tap(text: &str) -> Option<TestCounts> {
    let mut tests = None;
    let mut passed = None;
    let mut failed = 0;
    let mut skipped: Option<u32> = None;
    for caps in tap_counter().captures_iter(text) {
        let n = num(&caps[2]);
        match &caps[1] {
            "tests" => tests = Some(n),
            "pass" => passed = Some(n),
            "fail" => failed = n,
            "skip" | "todo" => skipped = Some(skipped.unwrap_or(0).saturating_add(n)),
            _ => {}
        }
    }
    if tests.is_none() && passed.is_none() {
        return None;
    }
    let passed = passed.unwrap_or(0);
    Some(TestCounts {
        passed,
        failed,
        skipped,
        total: tests.unwrap_or(
            passed
                .saturating_add(failed)
                .saturating_add(skipped.unwrap_or(0)),
        ),
        recognized: true,
        format: Some(RunnerFormat::Tap),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jest_summary() {
        let out = "PASS src/a.test.js\nFAIL src/b.test.js\n\nTest Suites: 1 failed, 1 passed, 2 total\nTests:       1 failed, 2 skipped, 5 passed, 8 total\nSnapshots:   0 total\nTime:        1.2 s\n";
        let counts = parse(out);
        assert_eq!(counts.format, Some(RunnerFormat::Jest));
        assert_eq!((counts.passed, counts.failed, counts.total), (5, 1, 8));
        assert_eq!(counts.skipped, Some(2));
    }

    #[test]
    fn test_jest_ignores_suite_line() {
        let counts = parse("Test Suites: 3 passed, 3 total\nTests:       12 passed, 12 total\n");
        assert_eq!((counts.passed, counts.failed, counts.total), (12, 0, 12));
        assert_eq!(counts.skipped, None);
    }

    #[test]
    fn test_vitest_summary_with_colors() {
        let out = " \x1b[2m Test Files \x1b[22m 1 failed | 3 passed (4)\n \x1b[2m      Tests \x1b[22m \x1b[31m2 failed\x1b[39m | \x1b[32m10 passed\x1b[39m | 1 skipped (13)\n";
        let counts = parse(out);
        assert_eq!(counts.format, Some(RunnerFormat::Vitest));
        assert_eq!((counts.passed, counts.failed, counts.total), (10, 2, 13));
        assert_eq!(counts.skipped, Some(1));
    }

    #[test]
    fn test_mocha_summary() {
        let out = "  suite\n    ✓ works\n\n  7 passing (30ms)\n  2 failing\n  1 pending\n";
        let counts = parse(out);
        assert_eq!(counts.format, Some(RunnerFormat::Mocha));
        assert_eq!((counts.passed, counts.failed, counts.total), (7, 2, 10));
        assert_eq!(counts.skipped, Some(1));
    }

    #[test]
    fn test_tap_summary() {
        let out = "TAP version 13\nok 1 - a\nnot ok 2 - b\n1..2\n# tests 2\n# pass 1\n# fail 1\n";
        let counts = parse(out);
        assert_eq!(counts.format, Some(RunnerFormat::Tap));
        assert_eq!((counts.passed, counts.failed, counts.total), (1, 1, 2));
    }

    #[test]
    fn test_node_test_reporter() {
        let out = "✔ adds (0.5ms)\nℹ tests 4\nℹ suites 0\nℹ pass 4\nℹ fail 0\nℹ cancelled 0\nℹ skipped 0\n";
        let counts = parse(out);
        assert_eq!(counts.format, Some(RunnerFormat::Tap));
        assert_eq!((counts.passed, counts.total), (4, 4));
    }

    #[test]
    fn test_unrecognized_output_is_zeroed() {
        let counts = parse("Segmentation fault (core dumped)\n");
        assert!(!counts.recognized);
        assert_eq!(counts, TestCounts::unrecognized());
        assert_eq!(counts.total, 0);
    }

    #[test]
    fn test_huge_counts_saturate() {
        let counts = parse("  4000000000 passing\n  4000000000 failing\n");
        assert!(counts.recognized);
        assert_eq!(counts.total, u32::MAX);

        let tap = parse("# pass 4000000000\n# skip 4000000000\n# todo 4000000000\n");
        assert_eq!(tap.skipped, Some(u32::MAX));
        assert_eq!(tap.total, u32::MAX);
    }
}
