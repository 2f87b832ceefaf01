//! Per-language toolchain strategies
//!
//! Every strategy has the same shape: preflight probe, optional bootstrap,
//! the primary test+coverage run, a fixed parser order, and a fallback
//! rung where one exists. Dispatch over [`Language`] happens once, here.

pub mod csharp;
pub mod go;
pub mod java;
pub mod javascript;
pub mod php;
pub mod python;
pub mod ruby;

use super::budget::Budget;
use super::parse::{self, non_trivial, TestCounts};
use super::runner::{self, CommandOutcome, CommandSpec};
use super::ExecutionResult;
use crate::catalog::Language;
use crate::config::ExecutionConfig;
use crate::util::relative_slash_path;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything a strategy needs to run in one working tree
pub struct Context<'a> {
    pub root: &'a Path,
    pub language: Language,
    pub framework: &'a str,
    pub discovered: &'a [String],
    pub config: &'a ExecutionConfig,
    pub budget: Budget,
}

impl Context<'_> {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.config.probe_timeout_secs)
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_secs(self.config.bootstrap_timeout_secs)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.config.test_timeout_secs)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.config.fallback_timeout_secs)
    }

    /// `.testforge/<language>` inside the tree, created on demand.
    pub fn report_dir(&self) -> Result<PathBuf, String> {
        let dir = self.root.join(".testforge").join(self.language.id());
        fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create report directory {}: {}", dir.display(), e))?;
        Ok(dir)
    }

    /// A command rooted in the working tree with the test-run timeout.
    pub fn command(&self, name: &str, program: impl Into<String>) -> CommandSpec {
        CommandSpec::new(name, self.root, program).timeout(self.test_timeout())
    }

    pub async fn probe(&self, program: &str, args: &[&str]) -> bool {
        runner::probe(self.root, program, args, self.probe_timeout(), &self.budget).await
    }

    pub async fn run(&self, spec: &CommandSpec) -> CommandOutcome {
        runner::run_command(spec, &self.budget).await
    }

    /// Run a bootstrap step. Failures are logged and reported as `false`.
    pub async fn bootstrap(&self, spec: CommandSpec) -> bool {
        if !self.config.allow_bootstrap {
            tracing::debug!(command = %spec.label(), "Bootstrap disabled, skipping");
            return false;
        }
        let spec = spec.timeout(self.bootstrap_timeout());
        let outcome = self.run(&spec).await;
        if !outcome.success {
            tracing::warn!(
                language = %self.language,
                command = %outcome.command,
                exit_code = ?outcome.exit_code,
                failure = ?outcome.execution_failure(),
                "Bootstrap step failed"
            );
        }
        outcome.success
    }

    /// A report path relative to the tree, if the file exists.
    pub fn report_path(&self, path: &Path) -> Option<String> {
        path.exists().then(|| relative_slash_path(self.root, path))
    }
}

/// Run the strategy for the context's language.
pub async fn run(ctx: &Context<'_>) -> ExecutionResult {
    match ctx.language {
        Language::Python => python::run(ctx).await,
        Language::JavaScript => javascript::run(ctx).await,
        Language::Java => java::run(ctx).await,
        Language::CSharp => csharp::run(ctx).await,
        Language::Go => go::run(ctx).await,
        Language::Ruby => ruby::run(ctx).await,
        Language::Php => php::run(ctx).await,
    }
}

/// First candidate that found at least one test.
pub fn first_counts(candidates: impl IntoIterator<Item = Option<TestCounts>>) -> Option<TestCounts> {
    candidates.into_iter().find_map(non_trivial)
}

/// Turn a finished primary run into a result.
///
/// Launch failures and timeouts become errors. Otherwise the parsed counts
/// are used; without them, test identifiers in the output give an estimate,
/// and if even that finds nothing the run is reported as unparseable.
pub fn conclude(
    ctx: &Context<'_>,
    outcome: &CommandOutcome,
    counts: Option<TestCounts>,
    coverage: Option<f64>,
    report: Option<String>,
) -> ExecutionResult {
    if let Some(failure) = outcome.execution_failure() {
        return ExecutionResult::failed(failure).with_output(outcome);
    }

    let result = match counts {
        Some(counts) => ExecutionResult::measured(counts),
        None => {
            let output = outcome.combined_output();
            match non_trivial(parse::test_identifiers(ctx.language, &output)) {
                Some(counts) => ExecutionResult::estimated(
                    counts,
                    "Counts inferred from test names in the tool output",
                ),
                None => {
                    return ExecutionResult::failed(format!(
                        "Could not read test results from `{}` (exit code {})",
                        outcome.command,
                        outcome
                            .exit_code
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| "none".to_string())
                    ))
                    .with_output(outcome)
                }
            }
        }
    };

    result
        .with_coverage(coverage)
        .with_report(report)
        .with_output(outcome)
}

/// Newest file under `dir` whose name satisfies `matches`.
pub fn newest_file(dir: &Path, matches: impl Fn(&str) -> bool) -> Option<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_str().map(&matches).unwrap_or(false))
        .max_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()))
        .map(|e| e.into_path())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::execute::Provenance;

    pub(crate) fn context<'a>(
        root: &'a Path,
        language: Language,
        config: &'a ExecutionConfig,
        discovered: &'a [String],
    ) -> Context<'a> {
        Context {
            root,
            language,
            framework: language.framework(),
            discovered,
            config,
            budget: Budget::unbounded(),
        }
    }

    fn finished(stdout: &str) -> CommandOutcome {
        CommandOutcome {
            command: "tool".to_string(),
            success: true,
            exit_code: Some(0),
            stdout: stdout.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_counts_skips_empty() {
        let picked = first_counts([None, Some(TestCounts::default()), Some(TestCounts::new(2, 1))]);
        assert_eq!(picked, Some(TestCounts::new(2, 1)));
        assert_eq!(first_counts([None, Some(TestCounts::default())]), None);
    }

    #[test]
    fn test_conclude_prefers_parsed_counts() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecutionConfig::default();
        let ctx = context(dir.path(), Language::Python, &config, &[]);

        let result = conclude(&ctx, &finished("ok"), Some(TestCounts::new(3, 0)), Some(50.0), None);
        assert_eq!(result.tests_total, 3);
        assert_eq!(result.provenance, Provenance::Measured);
        assert_eq!(result.coverage_percentage, Some(50.0));
    }

    #[test]
    fn test_conclude_falls_back_to_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecutionConfig::default();
        let ctx = context(dir.path(), Language::Python, &config, &[]);

        let result = conclude(&ctx, &finished("test_add ok\ntest_sub ok\n"), None, None, None);
        assert_eq!(result.tests_total, 2);
        assert_eq!(result.provenance, Provenance::Estimated);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_conclude_unparseable_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecutionConfig::default();
        let ctx = context(dir.path(), Language::Ruby, &config, &[]);

        let result = conclude(&ctx, &finished("gibberish"), None, Some(10.0), None);
        assert!(result.error.unwrap().contains("Could not read test results"));
        assert_eq!(result.tests_total, 0);
        assert_eq!(result.coverage_percentage, None);
    }

    #[test]
    fn test_conclude_timeout_is_error_with_zero_counters() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecutionConfig::default();
        let ctx = context(dir.path(), Language::Go, &config, &[]);
        let outcome = CommandOutcome {
            command: "go test".to_string(),
            timed_out: true,
            duration_ms: 300_000,
            ..Default::default()
        };

        let result = conclude(&ctx, &outcome, Some(TestCounts::new(5, 0)), None, None);
        assert!(result.error.as_ref().unwrap().contains("timed out"));
        assert_eq!(result.counts(), TestCounts::default());
    }

    #[test]
    fn test_report_dir_is_hidden_and_per_language() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecutionConfig::default();
        let ctx = context(dir.path(), Language::CSharp, &config, &[]);
        let report = ctx.report_dir().unwrap();
        assert!(report.ends_with(".testforge/csharp"));
        assert!(report.is_dir());
    }
}
