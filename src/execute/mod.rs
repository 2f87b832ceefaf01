//! Test Execution Engine
//!
//! Runs the generated (and pre-existing) tests of one language inside a
//! working tree and normalizes whatever the toolchain prints into an
//! [`ExecutionResult`]. Nothing in here returns an error to the caller:
//! every failure becomes a result carrying an error string and zero
//! counters, so one broken toolchain never aborts a multi-language run.

pub mod budget;
pub mod coverage;
pub mod parse;
pub mod runner;
pub mod toolchains;

pub use budget::Budget;
pub use parse::TestCounts;

use crate::analysis::scanner::RepoScanner;
use crate::catalog::Language;
use crate::config::ExecutionConfig;
use crate::util::tail_chars;
use futures::future::BoxFuture;
use runner::CommandOutcome;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

/// Raw tool output kept on a result is cut to this many trailing characters.
pub const OUTPUT_TAIL_CHARS: usize = 8_000;

/// Whether the numbers on a result were read from the tool or guessed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    Measured,
    Estimated,
}

/// Normalized pass/fail/coverage record for one language
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub tests_passed: usize,
    pub tests_failed: usize,
    /// Always `tests_passed + tests_failed`
    pub tests_total: usize,
    /// `None` when the run produced no coverage data
    pub coverage_percentage: Option<f64>,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Human-readable coverage report, relative to the working tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_report: Option<String>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    fn from_counts(counts: TestCounts, provenance: Provenance) -> Self {
        Self {
            tests_passed: counts.passed,
            tests_failed: counts.failed,
            tests_total: counts.total(),
            provenance,
            ..Default::default()
        }
    }

    pub fn measured(counts: TestCounts) -> Self {
        Self::from_counts(counts, Provenance::Measured)
    }

    pub fn estimated(counts: TestCounts, note: impl Into<String>) -> Self {
        let mut result = Self::from_counts(counts, Provenance::Estimated);
        result.note = Some(note.into());
        result
    }

    /// Nothing to run: all counters zero and no error.
    pub fn no_tests() -> Self {
        Self {
            note: Some("No test files found".to_string()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_coverage(mut self, coverage: Option<f64>) -> Self {
        self.coverage_percentage = coverage.filter(|c| c.is_finite()).map(|c| c.clamp(0.0, 100.0));
        self
    }

    pub fn with_report(mut self, report: Option<String>) -> Self {
        self.coverage_report = report;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Attach the tails of a command's output.
    pub fn with_output(mut self, outcome: &CommandOutcome) -> Self {
        let keep = |text: &str| {
            let trimmed = text.trim_end();
            (!trimmed.is_empty()).then(|| tail_chars(trimmed, OUTPUT_TAIL_CHARS))
        };
        self.stdout = keep(&outcome.stdout);
        self.stderr = keep(&outcome.stderr);
        self
    }

    pub fn is_measured(&self) -> bool {
        self.provenance == Provenance::Measured
    }

    pub fn counts(&self) -> TestCounts {
        TestCounts::new(self.tests_passed, self.tests_failed)
    }
}

/// Test files of `language` present in the tree, by naming convention.
pub fn discover_tests(root: &Path, language: Language) -> Vec<String> {
    RepoScanner::new()
        .visible_files(root)
        .into_iter()
        .filter(|path| language.is_test_file(Path::new(path)))
        .collect()
}

/// What to run
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    pub root: &'a Path,
    pub language: Language,
    pub framework: &'a str,
    pub budget: Budget,
}

/// Runs one language's tests in a working tree.
pub trait TestExecutor: Send + Sync {
    fn run<'a>(&'a self, request: ExecutionRequest<'a>) -> BoxFuture<'a, ExecutionResult>;
}

/// Production executor: real toolchains as subprocesses
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    config: ExecutionConfig,
}

impl ExecutionEngine {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    /// Discover, then run the language's toolchain with coverage.
    pub async fn run_with_coverage(
        &self,
        root: &Path,
        language: Language,
        framework: &str,
        budget: Budget,
    ) -> ExecutionResult {
        let start = Instant::now();
        let discovered = discover_tests(root, language);
        if discovered.is_empty() {
            tracing::info!(language = %language, "No test files discovered");
            return ExecutionResult::no_tests();
        }

        tracing::info!(
            language = %language,
            framework = %framework,
            test_files = discovered.len(),
            "Running tests"
        );
        let ctx = toolchains::Context {
            root,
            language,
            framework,
            discovered: &discovered,
            config: &self.config,
            budget,
        };
        let mut result = toolchains::run(&ctx).await;
        result.duration_ms = start.elapsed().as_millis() as u64;

        match &result.error {
            Some(error) => {
                tracing::warn!(language = %language, error = %error, "Test execution failed")
            }
            None => tracing::info!(
                language = %language,
                passed = result.tests_passed,
                failed = result.tests_failed,
                coverage = ?result.coverage_percentage,
                provenance = ?result.provenance,
                "Test execution finished"
            ),
        }
        result
    }
}

impl TestExecutor for ExecutionEngine {
    fn run<'a>(&'a self, request: ExecutionRequest<'a>) -> BoxFuture<'a, ExecutionResult> {
        Box::pin(self.run_with_coverage(
            request.root,
            request.language,
            request.framework,
            request.budget,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_counts_invariant_on_constructors() {
        let measured = ExecutionResult::measured(TestCounts::new(4, 1));
        assert_eq!(measured.tests_total, 5);
        assert!(measured.is_measured());

        let estimated = ExecutionResult::estimated(TestCounts::new(1, 0), "guess");
        assert_eq!(estimated.provenance, Provenance::Estimated);
        assert_eq!(estimated.note.as_deref(), Some("guess"));
    }

    #[test]
    fn test_no_tests_is_all_zero_without_error() {
        let result = ExecutionResult::no_tests();
        assert_eq!(result.counts(), TestCounts::default());
        assert_eq!(result.tests_total, 0);
        assert!(result.error.is_none());
        assert!(result.coverage_percentage.is_none());
    }

    #[test]
    fn test_coverage_is_clamped_and_finite() {
        let result = ExecutionResult::measured(TestCounts::new(1, 0)).with_coverage(Some(f64::NAN));
        assert_eq!(result.coverage_percentage, None);
        let result = ExecutionResult::measured(TestCounts::new(1, 0)).with_coverage(Some(140.0));
        assert_eq!(result.coverage_percentage, Some(100.0));
    }

    #[test]
    fn test_output_tails_are_bounded() {
        let outcome = CommandOutcome {
            stdout: "x".repeat(OUTPUT_TAIL_CHARS * 2),
            stderr: "   \n".to_string(),
            ..Default::default()
        };
        let result = ExecutionResult::failed("boom").with_output(&outcome);
        assert_eq!(result.stdout.unwrap().chars().count(), OUTPUT_TAIL_CHARS);
        assert!(result.stderr.is_none());
    }

    #[test]
    fn test_discover_tests_uses_naming_rules() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("tests")).unwrap();
        fs::create_dir_all(root.path().join("node_modules/pkg")).unwrap();
        fs::write(root.path().join("calc.py"), "").unwrap();
        fs::write(root.path().join("tests/test_calc.py"), "").unwrap();
        fs::write(root.path().join("calc.test.js"), "").unwrap();
        fs::write(root.path().join("node_modules/pkg/a.test.js"), "").unwrap();

        assert_eq!(discover_tests(root.path(), Language::Python), vec!["tests/test_calc.py"]);
        assert_eq!(discover_tests(root.path(), Language::JavaScript), vec!["calc.test.js"]);
        assert!(discover_tests(root.path(), Language::Go).is_empty());
    }

    #[tokio::test]
    async fn test_engine_reports_no_tests_before_probing() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("main.go"), "package main\n").unwrap();

        let engine = ExecutionEngine::new(ExecutionConfig::default());
        let result = engine
            .run_with_coverage(root.path(), Language::Go, "go_testing", Budget::unbounded())
            .await;
        assert_eq!(result, ExecutionResult::no_tests());
    }

    #[test]
    fn test_result_serializes_provenance() {
        let json = serde_json::to_value(ExecutionResult::estimated(TestCounts::new(1, 0), "n")).unwrap();
        assert_eq!(json["provenance"], "estimated");
        assert_eq!(json["tests_total"], 1);
    }
}
