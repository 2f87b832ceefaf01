//! Java: Maven or Gradle with JaCoCo

use super::{conclude, first_counts, Context};
use crate::execute::coverage::{self, read_report};
use crate::execute::parse;
use crate::execute::runner::CommandOutcome;
use crate::execute::ExecutionResult;
use std::path::PathBuf;

const JACOCO_PLUGIN: &str = "org.jacoco:jacoco-maven-plugin:0.8.12";

#[derive(Debug, Clone, PartialEq, Eq)]
enum BuildTool {
    Maven,
    /// Program to invoke: the wrapper when present, else `gradle`
    Gradle(String),
}

pub async fn run(ctx: &Context<'_>) -> ExecutionResult {
    let Some(tool) = detect_build_tool(ctx) else {
        return ExecutionResult::failed(
            "No pom.xml or build.gradle found; Java tests need Maven or Gradle",
        );
    };

    match tool {
        BuildTool::Maven => run_maven(ctx).await,
        BuildTool::Gradle(program) => run_gradle(ctx, &program).await,
    }
}

fn detect_build_tool(ctx: &Context<'_>) -> Option<BuildTool> {
    if ctx.root.join("pom.xml").is_file() {
        return Some(BuildTool::Maven);
    }
    let gradle = ["build.gradle", "build.gradle.kts"]
        .iter()
        .any(|f| ctx.root.join(f).is_file());
    if !gradle {
        return None;
    }
    let wrapper = ctx.root.join(if cfg!(windows) { "gradlew.bat" } else { "gradlew" });
    Some(BuildTool::Gradle(if wrapper.is_file() {
        wrapper.to_string_lossy().into_owned()
    } else {
        "gradle".to_string()
    }))
}

async fn run_maven(ctx: &Context<'_>) -> ExecutionResult {
    if !ctx.probe("mvn", &["-v"]).await {
        return ExecutionResult::failed("Maven (mvn) is not available");
    }

    let prepare = format!("{}:prepare-agent", JACOCO_PLUGIN);
    let report_goal = format!("{}:report", JACOCO_PLUGIN);
    let spec = ctx.command("maven", "mvn").args(&[
        "-B",
        "-Dmaven.test.failure.ignore=true",
        prepare.as_str(),
        "test",
        report_goal.as_str(),
    ]);
    let outcome = ctx.run(&spec).await;

    let target = ctx.root.join("target");
    let jacoco = target.join("site/jacoco");
    finish(
        ctx,
        &outcome,
        target.join("surefire-reports"),
        jacoco.join("jacoco.xml"),
        jacoco.join("index.html"),
    )
}

async fn run_gradle(ctx: &Context<'_>, program: &str) -> ExecutionResult {
    if !ctx.probe(program, &["--version"]).await {
        return ExecutionResult::failed(format!("Gradle ({}) is not available", program));
    }

    let spec = ctx
        .command("gradle", program)
        .args(&["test", "--continue", "--console=plain"]);
    let outcome = ctx.run(&spec).await;

    // Not every build applies the jacoco plugin; a failure here only costs coverage
    if outcome.completed() {
        let report = ctx
            .command("gradle jacoco", program)
            .args(&["jacocoTestReport", "--console=plain"])
            .timeout(ctx.fallback_timeout());
        let report_outcome = ctx.run(&report).await;
        if !report_outcome.success {
            tracing::debug!("jacocoTestReport unavailable, continuing without coverage");
        }
    }

    let build = ctx.root.join("build");
    let jacoco = build.join("reports/jacoco/test");
    finish(
        ctx,
        &outcome,
        build.join("test-results/test"),
        jacoco.join("jacocoTestReport.xml"),
        jacoco.join("html/index.html"),
    )
}

fn finish(
    ctx: &Context<'_>,
    outcome: &CommandOutcome,
    junit_dir: PathBuf,
    jacoco_xml: PathBuf,
    html_report: PathBuf,
) -> ExecutionResult {
    let output = outcome.combined_output();
    let counts = first_counts([
        parse::junit_dir(&junit_dir),
        parse::maven_summary(&output),
        parse::gradle_summary(&output),
    ]);
    let coverage = read_report(&jacoco_xml, coverage::jacoco_xml);
    conclude(ctx, outcome, counts, coverage, ctx.report_path(&html_report))
}
