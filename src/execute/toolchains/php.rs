//! PHP: PHPUnit, from the project's vendor directory when possible

use super::{conclude, first_counts, Context};
use crate::execute::coverage::{self, read_report};
use crate::execute::parse;
use crate::execute::ExecutionResult;

pub async fn run(ctx: &Context<'_>) -> ExecutionResult {
    let Some(phpunit) = find_phpunit(ctx).await else {
        return ExecutionResult::failed(
            "PHPUnit is not available (no vendor/bin/phpunit, composer or phpunit on PATH)",
        );
    };
    let report_dir = match ctx.report_dir() {
        Ok(dir) => dir,
        Err(err) => return ExecutionResult::failed(err),
    };

    let junit = report_dir.join("junit.xml");
    let clover = report_dir.join("clover.xml");
    let html = report_dir.join("coverage-html");
    let target = if ctx.root.join("tests").is_dir() { "tests" } else { "." };

    let spec = ctx
        .command("phpunit", phpunit)
        .args(&[
            "--log-junit".to_string(),
            junit.to_string_lossy().into_owned(),
            "--coverage-clover".to_string(),
            clover.to_string_lossy().into_owned(),
            "--coverage-html".to_string(),
            html.to_string_lossy().into_owned(),
            "--coverage-text".to_string(),
            target.to_string(),
        ])
        .with_env_overrides(&[("XDEBUG_MODE".to_string(), "coverage".to_string())]);
    let outcome = ctx.run(&spec).await;
    let output = outcome.combined_output();

    let counts = first_counts([parse::junit_file(&junit), parse::phpunit_text(&output)]);
    let coverage = read_report(&clover, coverage::clover_xml)
        .or_else(|| coverage::phpunit_text(&output));
    let report = ctx.report_path(&html.join("index.html"));

    conclude(ctx, &outcome, counts, coverage, report)
}

async fn find_phpunit(ctx: &Context<'_>) -> Option<String> {
    let vendored = ctx.root.join("vendor/bin/phpunit");
    if !vendored.is_file() && ctx.probe("composer", &["--version"]).await {
        ctx.bootstrap(ctx.command("composer require phpunit", "composer").args(&[
            "require",
            "--dev",
            "--no-interaction",
            "phpunit/phpunit",
        ]))
        .await;
    }
    if vendored.is_file() {
        return Some(vendored.to_string_lossy().into_owned());
    }
    if ctx.probe("phpunit", &["--version"]).await {
        return Some("phpunit".to_string());
    }
    None
}
