//! Test-count parsers for toolchain output
//!
//! Each toolchain tries its parsers in a fixed order, structured reports
//! (JUnit XML, TRX, JSON event streams) first and text patterns last. A
//! parser returns `None` when its format is absent; callers use
//! [`non_trivial`] to skip results that found zero tests.

use crate::catalog::Language;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

/// Passed and failed counts. Skipped tests are not part of the total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCounts {
    pub passed: usize,
    pub failed: usize,
}

impl TestCounts {
    pub fn new(passed: usize, failed: usize) -> Self {
        Self { passed, failed }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed
    }

    /// From a run total that may include skipped tests.
    fn from_run(run: usize, failed: usize, skipped: usize) -> Self {
        Self {
            passed: run.saturating_sub(failed).saturating_sub(skipped),
            failed: failed.min(run),
        }
    }
}

impl std::ops::Add for TestCounts {
    type Output = TestCounts;

    fn add(self, rhs: TestCounts) -> TestCounts {
        TestCounts::new(self.passed + rhs.passed, self.failed + rhs.failed)
    }
}

/// Keep only results that found at least one test.
pub fn non_trivial(counts: Option<TestCounts>) -> Option<TestCounts> {
    counts.filter(|c| c.total() > 0)
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex pattern")
}

fn num(s: Option<regex::Match<'_>>) -> usize {
    s.and_then(|m| m.as_str().parse().ok()).unwrap_or(0)
}

// ═══════════════════════════════════════════════════════════════════════════
//  XML
// ═══════════════════════════════════════════════════════════════════════════

/// One element of an XML document, flattened
#[derive(Debug, Clone)]
pub(crate) struct XmlElement {
    pub name: String,
    pub depth: usize,
    pub parent: Option<String>,
    pub attrs: HashMap<String, String>,
}

impl XmlElement {
    pub fn attr_usize(&self, key: &str) -> usize {
        self.attrs
            .get(key)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as usize)
            .unwrap_or(0)
    }

    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attrs
            .get(key)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }
}

fn element_from(e: &BytesStart<'_>, depth: usize, parent: Option<&String>) -> XmlElement {
    let attrs = e
        .attributes()
        .flatten()
        .map(|attr| {
            (
                String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned(),
                String::from_utf8_lossy(&attr.value).into_owned(),
            )
        })
        .collect();
    XmlElement {
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        depth,
        parent: parent.cloned(),
        attrs,
    }
}

/// Every element in document order. Stops quietly at the first syntax error.
pub(crate) fn xml_elements(xml: &str) -> Vec<XmlElement> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<String> = Vec::new();
    let mut elements = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let element = element_from(&e, stack.len(), stack.last());
                stack.push(element.name.clone());
                elements.push(element);
            }
            Ok(Event::Empty(e)) => {
                elements.push(element_from(&e, stack.len(), stack.last()));
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                tracing::debug!(error = %err, "Stopped reading malformed XML report");
                break;
            }
            Ok(_) => {}
        }
    }
    elements
}

/// JUnit-style XML (pytest, Surefire, Gradle, PHPUnit).
///
/// Sums the outermost `<testsuite>` elements; nested suites are already
/// included in their parent's attributes.
pub fn junit_xml(xml: &str) -> Option<TestCounts> {
    let suites: Vec<XmlElement> = xml_elements(xml)
        .into_iter()
        .filter(|e| e.name == "testsuite")
        .collect();
    let top = suites.iter().map(|s| s.depth).min()?;

    let counts = suites
        .iter()
        .filter(|s| s.depth == top)
        .map(|s| {
            let tests = s.attr_usize("tests");
            let failed = s.attr_usize("failures") + s.attr_usize("errors");
            let skipped = s.attr_usize("skipped") + s.attr_usize("disabled");
            TestCounts::from_run(tests, failed, skipped)
        })
        .fold(TestCounts::default(), |acc, c| acc + c);
    Some(counts)
}

/// Sum every JUnit XML file in `dir` (Surefire and Gradle write one per class).
pub fn junit_dir(dir: &Path) -> Option<TestCounts> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("xml"))
        .collect();
    entries.sort();

    let mut total: Option<TestCounts> = None;
    for path in entries {
        if let Some(counts) = fs::read_to_string(&path).ok().and_then(|x| junit_xml(&x)) {
            total = Some(total.unwrap_or_default() + counts);
        }
    }
    total
}

pub fn junit_file(path: &Path) -> Option<TestCounts> {
    fs::read_to_string(path).ok().and_then(|xml| junit_xml(&xml))
}

/// Visual Studio TRX results (`dotnet test --logger trx`).
pub fn trx(xml: &str) -> Option<TestCounts> {
    let counters = xml_elements(xml).into_iter().find(|e| e.name == "Counters")?;
    let failed = counters.attr_usize("failed")
        + counters.attr_usize("error")
        + counters.attr_usize("timeout")
        + counters.attr_usize("aborted");
    Some(TestCounts::new(counters.attr_usize("passed"), failed))
}

// ═══════════════════════════════════════════════════════════════════════════
//  PYTHON
// ═══════════════════════════════════════════════════════════════════════════

static PYTEST_SUMMARY_LINE: LazyLock<Regex> =
    LazyLock::new(|| regex(r"^=*\s*(\d+ \w+(?:, \d+ \w+)*) in [\d.]+\s*s"));
static PYTEST_SUMMARY_ITEM: LazyLock<Regex> = LazyLock::new(|| regex(r"(\d+) (\w+)"));
static PYTEST_VERBOSE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| regex(r"^\S+::\S+.*?\s(PASSED|FAILED|ERROR)\b"));

/// pytest's final summary line, e.g. `=== 3 passed, 1 failed in 0.12s ===`.
pub fn pytest_summary(output: &str) -> Option<TestCounts> {
    for line in output.lines().rev() {
        let Some(caps) = PYTEST_SUMMARY_LINE.captures(line.trim()) else {
            continue;
        };
        let mut counts = TestCounts::default();
        let mut recognized = false;
        for item in PYTEST_SUMMARY_ITEM.captures_iter(&caps[1]) {
            let n: usize = item[1].parse().unwrap_or(0);
            match &item[2] {
                "passed" | "xpassed" => {
                    counts.passed += n;
                    recognized = true;
                }
                "failed" | "error" | "errors" => {
                    counts.failed += n;
                    recognized = true;
                }
                "skipped" | "xfailed" | "deselected" | "warning" | "warnings" => {
                    recognized = true;
                }
                _ => {}
            }
        }
        if recognized {
            return Some(counts);
        }
    }
    None
}

/// Per-test `PASSED` / `FAILED` markers from `pytest -v`.
pub fn pytest_markers(output: &str) -> Option<TestCounts> {
    let mut counts = TestCounts::default();
    let mut seen = false;
    for line in output.lines() {
        if let Some(caps) = PYTEST_VERBOSE_MARKER.captures(line) {
            seen = true;
            match &caps[1] {
                "PASSED" => counts.passed += 1,
                _ => counts.failed += 1,
            }
        }
    }
    seen.then_some(counts)
}

static UNITTEST_RAN: LazyLock<Regex> = LazyLock::new(|| regex(r"Ran (\d+) tests? in"));
static UNITTEST_FAILED: LazyLock<Regex> = LazyLock::new(|| regex(r"FAILED \(([^)]*)\)"));
static UNITTEST_OK: LazyLock<Regex> = LazyLock::new(|| regex(r"(?m)^OK(?: \(([^)]*)\))?\s*$"));
static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| regex(r"(\w+)=(\d+)"));

/// `python -m unittest` summary.
pub fn unittest(output: &str) -> Option<TestCounts> {
    let ran = num(UNITTEST_RAN.captures(output)?.get(1));

    let details = UNITTEST_FAILED
        .captures(output)
        .or_else(|| UNITTEST_OK.captures(output))
        .and_then(|c| c.get(1).map(|m| m.as_str().to_string()))
        .unwrap_or_default();

    let mut failed = 0;
    let mut skipped = 0;
    for kv in KEY_VALUE.captures_iter(&details) {
        let n: usize = kv[2].parse().unwrap_or(0);
        match &kv[1] {
            "failures" | "errors" | "unexpected_successes" => failed += n,
            "skipped" | "expected_failures" => skipped += n,
            _ => {}
        }
    }
    Some(TestCounts::from_run(ran, failed, skipped))
}

// ═══════════════════════════════════════════════════════════════════════════
//  JAVASCRIPT
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JestResults {
    #[serde(default)]
    num_passed_tests: usize,
    #[serde(default)]
    num_failed_tests: usize,
    #[serde(default)]
    num_runtime_error_test_suites: usize,
}

/// Jest's `--json` results file.
pub fn jest_json(json: &str) -> Option<TestCounts> {
    let results: JestResults = serde_json::from_str(json).ok()?;
    Some(TestCounts::new(
        results.num_passed_tests,
        results.num_failed_tests + results.num_runtime_error_test_suites,
    ))
}

static JEST_TESTS_LINE: LazyLock<Regex> = LazyLock::new(|| regex(r"(?m)^Tests:\s+(.*)$"));
static JEST_FAILED: LazyLock<Regex> = LazyLock::new(|| regex(r"(\d+) failed"));
static JEST_PASSED: LazyLock<Regex> = LazyLock::new(|| regex(r"(\d+) passed"));

/// Jest's console summary, e.g. `Tests:       1 failed, 3 passed, 4 total`.
pub fn jest_summary(output: &str) -> Option<TestCounts> {
    let line = JEST_TESTS_LINE.captures_iter(output).last()?;
    let body = &line[1];
    Some(TestCounts::new(
        num(JEST_PASSED.captures(body).and_then(|c| c.get(1))),
        num(JEST_FAILED.captures(body).and_then(|c| c.get(1))),
    ))
}

static KARMA_EXECUTED: LazyLock<Regex> =
    LazyLock::new(|| regex(r"Executed (\d+) of (\d+)(?: \((\d+) FAILED\))?"));

/// Karma's progress line; the last occurrence holds the final tally.
pub fn karma_summary(output: &str) -> Option<TestCounts> {
    let caps = KARMA_EXECUTED.captures_iter(output).last()?;
    let executed = num(caps.get(1));
    let failed = num(caps.get(3));
    Some(TestCounts::from_run(executed, failed, 0))
}

/// Check and cross marks from verbose Jest/Mocha output.
pub fn js_markers(output: &str) -> Option<TestCounts> {
    let mut counts = TestCounts::default();
    for line in output.lines() {
        let line = line.trim_start();
        if line.starts_with('✓') || line.starts_with('√') {
            counts.passed += 1;
        } else if line.starts_with('✕') || line.starts_with('×') {
            counts.failed += 1;
        }
    }
    (counts.total() > 0).then_some(counts)
}

// ═══════════════════════════════════════════════════════════════════════════
//  JAVA
// ═══════════════════════════════════════════════════════════════════════════

static MAVEN_TESTS_RUN: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"Tests run:\s*(\d+),\s*Failures:\s*(\d+),\s*Errors:\s*(\d+),\s*Skipped:\s*(\d+)")
});

/// Surefire's aggregate line; per-class lines come first, the total last.
pub fn maven_summary(output: &str) -> Option<TestCounts> {
    let caps = MAVEN_TESTS_RUN.captures_iter(output).last()?;
    Some(TestCounts::from_run(
        num(caps.get(1)),
        num(caps.get(2)) + num(caps.get(3)),
        num(caps.get(4)),
    ))
}

static GRADLE_COMPLETED: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(\d+) tests? completed(?:, (\d+) failed)?(?:, (\d+) skipped)?")
});

/// Gradle's `N tests completed, M failed` line.
pub fn gradle_summary(output: &str) -> Option<TestCounts> {
    let caps = GRADLE_COMPLETED.captures_iter(output).last()?;
    Some(TestCounts::from_run(
        num(caps.get(1)),
        num(caps.get(2)),
        num(caps.get(3)),
    ))
}

// ═══════════════════════════════════════════════════════════════════════════
//  C#
// ═══════════════════════════════════════════════════════════════════════════

static DOTNET_RESULT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(?:Passed|Failed)!\s*-\s*Failed:\s*(\d+),\s*Passed:\s*(\d+),\s*Skipped:\s*(\d+),\s*Total:\s*(\d+)")
});
static DOTNET_LEGACY_TOTAL: LazyLock<Regex> = LazyLock::new(|| regex(r"Total tests:\s*(\d+)"));
static DOTNET_LEGACY_PASSED: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?m)^\s*Passed:\s*(\d+)\s*$"));
static DOTNET_LEGACY_FAILED: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?m)^\s*Failed:\s*(\d+)\s*$"));

/// `dotnet test` console summary; one line per test project.
pub fn dotnet_summary(output: &str) -> Option<TestCounts> {
    let mut total: Option<TestCounts> = None;
    for caps in DOTNET_RESULT_LINE.captures_iter(output) {
        let counts = TestCounts::new(num(caps.get(2)), num(caps.get(1)));
        total = Some(total.unwrap_or_default() + counts);
    }
    if total.is_some() {
        return total;
    }

    DOTNET_LEGACY_TOTAL.captures(output)?;
    Some(TestCounts::new(
        num(DOTNET_LEGACY_PASSED.captures(output).and_then(|c| c.get(1))),
        num(DOTNET_LEGACY_FAILED.captures(output).and_then(|c| c.get(1))),
    ))
}

// ═══════════════════════════════════════════════════════════════════════════
//  GO
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct GoTestEvent {
    #[serde(rename = "Action", default)]
    action: String,
    #[serde(rename = "Test", default)]
    test: Option<String>,
}

/// `go test -json` event stream. Subtests are folded into their parent.
pub fn go_json(output: &str) -> Option<TestCounts> {
    let mut counts = TestCounts::default();
    let mut saw_event = false;
    for line in output.lines() {
        let Ok(event) = serde_json::from_str::<GoTestEvent>(line.trim()) else {
            continue;
        };
        saw_event = true;
        let Some(test) = event.test.as_deref() else {
            continue;
        };
        if test.contains('/') {
            continue;
        }
        match event.action.as_str() {
            "pass" => counts.passed += 1,
            "fail" => counts.failed += 1,
            _ => {}
        }
    }
    saw_event.then_some(counts)
}

static GO_VERBOSE_RESULT: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?m)^\s*--- (PASS|FAIL): (\S+)"));

/// `--- PASS: TestX` / `--- FAIL: TestX` lines from `go test -v`.
pub fn go_text(output: &str) -> Option<TestCounts> {
    let mut counts = TestCounts::default();
    for caps in GO_VERBOSE_RESULT.captures_iter(output) {
        if caps[2].contains('/') {
            continue;
        }
        match &caps[1] {
            "PASS" => counts.passed += 1,
            _ => counts.failed += 1,
        }
    }
    (counts.total() > 0).then_some(counts)
}

// ═══════════════════════════════════════════════════════════════════════════
//  RUBY
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct RspecReport {
    summary: RspecSummary,
}

#[derive(Deserialize)]
struct RspecSummary {
    #[serde(default)]
    example_count: usize,
    #[serde(default)]
    failure_count: usize,
    #[serde(default)]
    pending_count: usize,
    #[serde(default)]
    errors_outside_of_examples_count: usize,
}

/// RSpec `--format json` report.
pub fn rspec_json(json: &str) -> Option<TestCounts> {
    let report: RspecReport = serde_json::from_str(json).ok()?;
    let s = report.summary;
    let mut counts = TestCounts::from_run(s.example_count, s.failure_count, s.pending_count);
    counts.failed += s.errors_outside_of_examples_count;
    Some(counts)
}

static RSPEC_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"(\d+) examples?, (\d+) failures?(?:, (\d+) pending)?")
});

pub fn rspec_text(output: &str) -> Option<TestCounts> {
    let caps = RSPEC_SUMMARY.captures_iter(output).last()?;
    Some(TestCounts::from_run(
        num(caps.get(1)),
        num(caps.get(2)),
        num(caps.get(3)),
    ))
}

// ═══════════════════════════════════════════════════════════════════════════
//  PHP
// ═══════════════════════════════════════════════════════════════════════════

static PHPUNIT_OK: LazyLock<Regex> = LazyLock::new(|| regex(r"OK \((\d+) tests?"));
static PHPUNIT_TESTS: LazyLock<Regex> = LazyLock::new(|| regex(r"Tests:\s*(\d+),([^\n]*)"));
static PHPUNIT_FIELD: LazyLock<Regex> = LazyLock::new(|| regex(r"(\w+):\s*(\d+)"));

/// PHPUnit console summary.
pub fn phpunit_text(output: &str) -> Option<TestCounts> {
    if let Some(caps) = PHPUNIT_TESTS.captures_iter(output).last() {
        let tests = num(caps.get(1));
        let mut failed = 0;
        let mut skipped = 0;
        for field in PHPUNIT_FIELD.captures_iter(&caps[2]) {
            let n: usize = field[2].parse().unwrap_or(0);
            match &field[1] {
                "Failures" | "Errors" => failed += n,
                "Skipped" | "Incomplete" => skipped += n,
                _ => {}
            }
        }
        return Some(TestCounts::from_run(tests, failed, skipped));
    }
    let caps = PHPUNIT_OK.captures_iter(output).last()?;
    Some(TestCounts::new(num(caps.get(1)), 0))
}

// ═══════════════════════════════════════════════════════════════════════════
//  LAST RESORT
// ═══════════════════════════════════════════════════════════════════════════

/// pytest node ids (`tests/test_calc.py::test_add`) and unittest lines
/// (`test_add (tests.test_calc.CalcTest)`); bare file or module names are not tests.
static PY_IDENT: LazyLock<Regex> =
    LazyLock::new(|| regex(r"\S*::test_\w+|\btest_\w+ \([\w.]+\)"));
static GO_IDENT: LazyLock<Regex> = LazyLock::new(|| regex(r"\bTest[A-Z0-9_]\w*"));
static CAMEL_IDENT: LazyLock<Regex> = LazyLock::new(|| regex(r"\btest[A-Z0-9_]\w*"));

/// Count distinct test identifiers mentioned in the output. The counts are
/// a guess: every identifier is assumed to have passed.
pub fn test_identifiers(language: Language, output: &str) -> Option<TestCounts> {
    let pattern: &Regex = match language {
        Language::Python => &PY_IDENT,
        Language::Go => &GO_IDENT,
        Language::Java | Language::Php => &CAMEL_IDENT,
        _ => return None,
    };
    let unique: BTreeSet<&str> = pattern.find_iter(output).map(|m| m.as_str()).collect();
    (!unique.is_empty()).then(|| TestCounts::new(unique.len(), 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_junit_pytest_report() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<testsuites><testsuite name="pytest" errors="1" failures="1" skipped="1" tests="6" time="0.05">
<testcase classname="tests.test_calc" name="test_add" time="0.001"/>
</testsuite></testsuites>"#;
        assert_eq!(junit_xml(xml), Some(TestCounts::new(3, 2)));
    }

    #[test]
    fn test_junit_nested_suites_not_double_counted() {
        let xml = r#"<testsuites>
  <testsuite name="all" tests="3" failures="1" errors="0" skipped="0">
    <testsuite name="CalcTest" tests="3" failures="1" errors="0" skipped="0"/>
  </testsuite>
</testsuites>"#;
        assert_eq!(junit_xml(xml), Some(TestCounts::new(2, 1)));
    }

    #[test]
    fn test_junit_dir_sums_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("TEST-a.xml"),
            r#"<testsuite tests="2" failures="0" errors="0" skipped="0"/>"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("TEST-b.xml"),
            r#"<testsuite tests="3" failures="1" errors="1" skipped="0"/>"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        assert_eq!(junit_dir(dir.path()), Some(TestCounts::new(3, 2)));
    }

    #[test]
    fn test_malformed_xml_yields_nothing() {
        assert_eq!(junit_xml("<testsuite tests=\"oops"), None);
        assert_eq!(junit_xml("not xml at all"), None);
    }

    #[test]
    fn test_pytest_summary_variants() {
        let out = "collected 4 items\n\ntests/test_a.py ..F.\n\n========= 3 passed, 1 failed in 0.12s =========\n";
        assert_eq!(pytest_summary(out), Some(TestCounts::new(3, 1)));

        let out = "===== 2 failed, 5 passed, 1 skipped, 1 error, 3 warnings in 1.50s =====";
        assert_eq!(pytest_summary(out), Some(TestCounts::new(5, 3)));

        let quiet = "....\n4 passed in 0.03s\n";
        assert_eq!(pytest_summary(quiet), Some(TestCounts::new(4, 0)));

        assert_eq!(pytest_summary("nothing to see"), None);
    }

    #[test]
    fn test_pytest_markers_ignore_short_summary() {
        let out = "tests/test_a.py::test_one PASSED [ 50%]\n\
                   tests/test_a.py::test_two FAILED [100%]\n\
                   FAILED tests/test_a.py::test_two - assert 1 == 2\n";
        assert_eq!(pytest_markers(out), Some(TestCounts::new(1, 1)));
    }

    #[test]
    fn test_unittest_summary() {
        let ok = "...\n----------------------------------------------------------------------\nRan 3 tests in 0.001s\n\nOK\n";
        assert_eq!(unittest(ok), Some(TestCounts::new(3, 0)));

        let failed = "Ran 5 tests in 0.010s\n\nFAILED (failures=1, errors=1, skipped=1)\n";
        assert_eq!(unittest(failed), Some(TestCounts::new(2, 2)));

        let skipped = "Ran 2 tests in 0.000s\n\nOK (skipped=1)\n";
        assert_eq!(unittest(skipped), Some(TestCounts::new(1, 0)));

        assert_eq!(unittest("Ran 0 tests in 0.000s\n\nNO TESTS RAN\n"), Some(TestCounts::default()));
    }

    #[test]
    fn test_jest_json_and_summary() {
        let json = r#"{"numFailedTests": 1, "numPassedTests": 4, "numPendingTests": 2, "numTotalTests": 7, "success": false}"#;
        assert_eq!(jest_json(json), Some(TestCounts::new(4, 1)));

        let text = "Test Suites: 1 failed, 1 total\nTests:       1 failed, 2 skipped, 3 passed, 6 total\n";
        assert_eq!(jest_summary(text), Some(TestCounts::new(3, 1)));
    }

    #[test]
    fn test_karma_summary() {
        let out = "Executed 1 of 4 SUCCESS\nExecuted 4 of 4 (1 FAILED) (0.02 secs)\n";
        assert_eq!(karma_summary(out), Some(TestCounts::new(3, 1)));
    }

    #[test]
    fn test_js_markers() {
        let out = "  calc\n    ✓ adds (2 ms)\n    ✕ subtracts (1 ms)\n    ✓ multiplies\n";
        assert_eq!(js_markers(out), Some(TestCounts::new(2, 1)));
    }

    #[test]
    fn test_maven_summary_takes_aggregate() {
        let out = "[INFO] Tests run: 2, Failures: 0, Errors: 0, Skipped: 0, Time elapsed: 0.1 s - in a.ATest\n\
                   [ERROR] Tests run: 3, Failures: 1, Errors: 0, Skipped: 0, Time elapsed: 0.1 s - in a.BTest\n\
                   [INFO] Results:\n\
                   [ERROR] Tests run: 5, Failures: 1, Errors: 1, Skipped: 1\n";
        assert_eq!(maven_summary(out), Some(TestCounts::new(2, 2)));
    }

    #[test]
    fn test_gradle_summary() {
        assert_eq!(
            gradle_summary("12 tests completed, 2 failed, 1 skipped"),
            Some(TestCounts::new(9, 2))
        );
        assert_eq!(gradle_summary("BUILD SUCCESSFUL"), None);
    }

    #[test]
    fn test_trx_counters() {
        let xml = r#"<TestRun xmlns="http://microsoft.com/schemas/VisualStudio/TeamTest/2010">
<ResultSummary outcome="Failed"><Counters total="4" executed="4" passed="3" failed="1" error="0" timeout="0" aborted="0" /></ResultSummary></TestRun>"#;
        assert_eq!(trx(xml), Some(TestCounts::new(3, 1)));
    }

    #[test]
    fn test_dotnet_summaries() {
        let modern = "Passed!  - Failed:     0, Passed:     3, Skipped:     0, Total:     3, Duration: 12 ms - Lib.Tests.dll (net8.0)\n\
                      Failed!  - Failed:     1, Passed:     1, Skipped:     1, Total:     3, Duration: 9 ms - Api.Tests.dll (net8.0)\n";
        assert_eq!(dotnet_summary(modern), Some(TestCounts::new(4, 1)));

        let legacy = "Total tests: 4\n     Passed: 3\n     Failed: 1\n Total time: 1.2 Seconds\n";
        assert_eq!(dotnet_summary(legacy), Some(TestCounts::new(3, 1)));
    }

    #[test]
    fn test_go_json_stream() {
        let out = r#"{"Action":"run","Package":"calc","Test":"TestAdd"}
{"Action":"pass","Package":"calc","Test":"TestAdd","Elapsed":0}
{"Action":"run","Package":"calc","Test":"TestSub"}
{"Action":"pass","Package":"calc","Test":"TestSub/negative","Elapsed":0}
{"Action":"fail","Package":"calc","Test":"TestSub","Elapsed":0}
{"Action":"fail","Package":"calc","Elapsed":0.01}"#;
        assert_eq!(go_json(out), Some(TestCounts::new(1, 1)));
        assert_eq!(go_json("plain text"), None);
    }

    #[test]
    fn test_go_text() {
        let out = "=== RUN   TestAdd\n--- PASS: TestAdd (0.00s)\n=== RUN   TestSub\n    --- PASS: TestSub/zero (0.00s)\n--- FAIL: TestSub (0.00s)\nFAIL\n";
        assert_eq!(go_text(out), Some(TestCounts::new(1, 1)));
    }

    #[test]
    fn test_rspec_parsers() {
        let json = r#"{"version":"3.12.0","examples":[],"summary":{"duration":0.01,"example_count":5,"failure_count":1,"pending_count":1,"errors_outside_of_examples_count":0},"summary_line":"5 examples, 1 failure, 1 pending"}"#;
        assert_eq!(rspec_json(json), Some(TestCounts::new(3, 1)));
        assert_eq!(
            rspec_text("Finished in 0.01 seconds\n5 examples, 1 failure, 1 pending\n"),
            Some(TestCounts::new(3, 1))
        );
    }

    #[test]
    fn test_phpunit_text() {
        assert_eq!(
            phpunit_text("OK (5 tests, 12 assertions)"),
            Some(TestCounts::new(5, 0))
        );
        assert_eq!(
            phpunit_text("FAILURES!\nTests: 6, Assertions: 9, Failures: 1, Errors: 1, Skipped: 1.\n"),
            Some(TestCounts::new(3, 2))
        );
    }

    #[test]
    fn test_identifier_fallback() {
        let out = "test_add (tests.test_calc.CalcTest) ... ok\n\
                   test_sub (tests.test_calc.CalcTest) ... ok\n\
                   FAIL: test_add (tests.test_calc.CalcTest)";
        assert_eq!(test_identifiers(Language::Python, out), Some(TestCounts::new(2, 0)));
        assert_eq!(test_identifiers(Language::Ruby, out), None);
    }

    #[test]
    fn test_identifier_fallback_ignores_file_and_module_names() {
        let out = "collecting tests/test_calc.py\n\
                   ImportError while importing test module 'tests/test_calc.py'\n\
                   ModuleNotFoundError: No module named 'test_calc'\n\
                   tests/test_calc.py::test_add PASSED\n\
                   tests/test_calc.py::TestCalc::test_sub[2-1] FAILED\n\
                   FAILED tests/test_calc.py::test_add - assert 3 == 4";
        assert_eq!(test_identifiers(Language::Python, out), Some(TestCounts::new(2, 0)));
        assert_eq!(
            test_identifiers(Language::Python, "No module named 'test_calc' in tests/test_calc.py"),
            None
        );
    }

    proptest! {
        #[test]
        fn prop_pytest_summary_matches_counts(passed in 0usize..500, failed in 0usize..500, skipped in 0usize..50) {
            prop_assume!(passed + failed > 0);
            let mut parts = Vec::new();
            if failed > 0 { parts.push(format!("{failed} failed")); }
            if passed > 0 { parts.push(format!("{passed} passed")); }
            if skipped > 0 { parts.push(format!("{skipped} skipped")); }
            let line = format!("===== {} in 0.42s =====", parts.join(", "));
            let counts = pytest_summary(&line).unwrap();
            prop_assert_eq!(counts, TestCounts::new(passed, failed));
            prop_assert_eq!(counts.passed + counts.failed, counts.total());
        }

        #[test]
        fn prop_maven_counts_never_exceed_run(run in 0usize..1000, failures in 0usize..1000, errors in 0usize..1000, skipped in 0usize..1000) {
            let line = format!("Tests run: {run}, Failures: {failures}, Errors: {errors}, Skipped: {skipped}");
            let counts = maven_summary(&line).unwrap();
            prop_assert!(counts.total() <= run);
        }

        #[test]
        fn prop_junit_never_panics(tests in 0usize..100, failures in 0usize..100, errors in 0usize..100, skipped in 0usize..100) {
            let xml = format!(r#"<testsuite tests="{tests}" failures="{failures}" errors="{errors}" skipped="{skipped}"/>"#);
            let counts = junit_xml(&xml).unwrap();
            prop_assert!(counts.total() <= tests);
        }

        #[test]
        fn prop_parsers_tolerate_arbitrary_text(text in ".{0,400}") {
            let _ = pytest_summary(&text);
            let _ = jest_summary(&text);
            let _ = maven_summary(&text);
            let _ = dotnet_summary(&text);
            let _ = go_json(&text);
            let _ = phpunit_text(&text);
            let _ = junit_xml(&text);
        }
    }
}
