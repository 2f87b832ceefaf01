//! Python: pytest with pytest-cov, falling back to unittest
//!
//! Ladder: pytest on the host interpreter, pytest in a bootstrapped venv,
//! `unittest discover -s tests`, `unittest discover`, up to three
//! individual test files, then an estimated placeholder.

use super::{conclude, first_counts, Context};
use crate::execute::coverage::{self, read_report};
use crate::execute::parse::{self, non_trivial, TestCounts};
use crate::execute::runner::{CommandOutcome, CommandSpec};
use crate::execute::ExecutionResult;
use std::path::{Path, PathBuf};

const PLACEHOLDER_COVERAGE: f64 = 25.0;
const MAX_INDIVIDUAL_FILES: usize = 3;
const PLACEHOLDER_NOTE: &str =
    "No Python test runner could execute the tests; counts and coverage are placeholders";

pub async fn run(ctx: &Context<'_>) -> ExecutionResult {
    match find_interpreter(ctx).await {
        Some(python) => run_with_interpreter(ctx, python).await,
        None => ExecutionResult::failed("No Python interpreter found (tried python3, python)"),
    }
}

async fn run_with_interpreter(ctx: &Context<'_>, mut python: String) -> ExecutionResult {
    let report_dir = match ctx.report_dir() {
        Ok(dir) => dir,
        Err(err) => return ExecutionResult::failed(err),
    };

    let mut has_pytest = has_module(ctx, &python, "pytest").await;
    if !has_pytest {
        if let Some(venv_python) = bootstrap_venv(ctx, &python, &report_dir).await {
            python = venv_python;
            has_pytest = has_module(ctx, &python, "pytest").await;
        }
    }

    if has_pytest {
        let (outcome, result) = run_pytest(ctx, &python, &report_dir).await;
        if result.error.is_none() || outcome.timed_out {
            return result;
        }
        tracing::info!(error = ?result.error, "pytest produced no usable result, trying unittest");
    } else {
        tracing::info!("pytest unavailable, trying unittest");
    }

    if let Some(result) = run_unittest_ladder(ctx, &python).await {
        return result;
    }

    tracing::warn!("No Python test runner produced results, returning an estimate");
    ExecutionResult::estimated(TestCounts::new(1, 0), PLACEHOLDER_NOTE)
        .with_coverage(Some(PLACEHOLDER_COVERAGE))
}

async fn find_interpreter(ctx: &Context<'_>) -> Option<String> {
    let mut candidates = Vec::new();
    if let Ok(venv) = std::env::var("VIRTUAL_ENV") {
        candidates.push(venv_python(Path::new(&venv)).to_string_lossy().into_owned());
    }
    candidates.push("python3".to_string());
    candidates.push("python".to_string());

    for candidate in candidates {
        if ctx.probe(&candidate, &["--version"]).await {
            return Some(candidate);
        }
    }
    None
}

fn venv_python(venv: &Path) -> PathBuf {
    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python")
    }
}

async fn has_module(ctx: &Context<'_>, python: &str, module: &str) -> bool {
    let check = format!("import {}", module);
    ctx.probe(python, &["-c", check.as_str()]).await
}

/// Create `.testforge/python/venv` with pytest and pytest-cov installed.
async fn bootstrap_venv(ctx: &Context<'_>, python: &str, report_dir: &Path) -> Option<String> {
    let venv = report_dir.join("venv");
    let venv_str = venv.to_string_lossy().into_owned();
    tracing::info!(venv = %venv.display(), "Bootstrapping pytest into a virtual environment");

    if !ctx
        .bootstrap(ctx.command("python venv", python).args(&["-m", "venv", venv_str.as_str()]))
        .await
    {
        return None;
    }
    let venv_python = venv_python(&venv).to_string_lossy().into_owned();

    let mut install = vec!["-m", "pip", "install", "--quiet", "pytest", "pytest-cov"];
    if ctx.root.join("requirements.txt").is_file() {
        install.extend(["-r", "requirements.txt"]);
    }
    if !ctx
        .bootstrap(ctx.command("pip install", &venv_python).args(install.as_slice()))
        .await
    {
        return None;
    }
    Some(venv_python)
}

async fn run_pytest(
    ctx: &Context<'_>,
    python: &str,
    report_dir: &Path,
) -> (CommandOutcome, ExecutionResult) {
    let junit = report_dir.join("junit.xml");
    let coverage_json = report_dir.join("coverage.json");
    let htmlcov = ctx.root.join("htmlcov");

    let mut args = vec![
        "-m".to_string(),
        "pytest".to_string(),
        "-v".to_string(),
        format!("--junitxml={}", junit.display()),
    ];
    let with_coverage = has_module(ctx, python, "pytest_cov").await;
    if with_coverage {
        args.extend([
            "--cov=.".to_string(),
            format!("--cov-report=json:{}", coverage_json.display()),
            format!("--cov-report=html:{}", htmlcov.display()),
        ]);
    }

    let spec = ctx.command("pytest", python).args(args.as_slice());
    let outcome = ctx.run(&spec).await;
    let output = outcome.combined_output();

    let counts = first_counts([
        parse::junit_file(&junit),
        parse::pytest_summary(&output),
        parse::pytest_markers(&output),
    ]);
    let coverage = read_report(&coverage_json, coverage::coverage_py_json)
        .or_else(|| read_report(&htmlcov.join("index.html"), coverage::htmlcov_index));
    let report = ctx.report_path(&htmlcov.join("index.html"));

    let result = conclude(ctx, &outcome, counts, coverage, report);
    (outcome, result)
}

async fn run_unittest_ladder(ctx: &Context<'_>, python: &str) -> Option<ExecutionResult> {
    if ctx.root.join("tests").is_dir() {
        let spec = ctx
            .command("unittest tests", python)
            .args(&["-m", "unittest", "discover", "-s", "tests", "-v"])
            .timeout(ctx.fallback_timeout());
        if let Some(result) = unittest_result(ctx, &spec).await {
            return Some(result);
        }
    }

    let spec = ctx
        .command("unittest", python)
        .args(&["-m", "unittest", "discover", "-v"])
        .timeout(ctx.fallback_timeout());
    if let Some(result) = unittest_result(ctx, &spec).await {
        return Some(result);
    }

    let mut total: Option<TestCounts> = None;
    let mut last_outcome = None;
    for file in ctx.discovered.iter().take(MAX_INDIVIDUAL_FILES) {
        let spec = ctx
            .command("unittest file", python)
            .args(&["-m", "unittest", "-v", file.as_str()])
            .timeout(ctx.fallback_timeout());
        let outcome = ctx.run(&spec).await;
        if let Some(counts) = non_trivial(parse::unittest(&outcome.combined_output())) {
            total = Some(total.unwrap_or_default() + counts);
        }
        last_outcome = Some(outcome);
    }

    let counts = total?;
    let mut result = ExecutionResult::measured(counts).with_note(format!(
        "Ran up to {} test files individually with unittest",
        MAX_INDIVIDUAL_FILES
    ));
    if let Some(outcome) = &last_outcome {
        result = result.with_output(outcome);
    }
    Some(result)
}

async fn unittest_result(
    ctx: &Context<'_>,
    spec: &CommandSpec,
) -> Option<ExecutionResult> {
    let outcome = ctx.run(spec).await;
    if !outcome.completed() {
        tracing::debug!(failure = ?outcome.execution_failure(), "unittest rung failed");
        return None;
    }
    let counts = non_trivial(parse::unittest(&outcome.combined_output()))?;
    Some(
        ExecutionResult::measured(counts)
            .with_note("pytest unavailable; ran with unittest, no coverage collected")
            .with_output(&outcome),
    )
}
