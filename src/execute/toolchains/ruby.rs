//! Ruby: RSpec through bundler, or plain `rspec`

use super::{conclude, first_counts, Context};
use crate::execute::coverage::{self, read_report};
use crate::execute::parse;
use crate::execute::runner::CommandSpec;
use crate::execute::ExecutionResult;
use std::fs;

pub async fn run(ctx: &Context<'_>) -> ExecutionResult {
    let report_dir = match ctx.report_dir() {
        Ok(dir) => dir,
        Err(err) => return ExecutionResult::failed(err),
    };
    let json_out = report_dir.join("rspec.json");
    let json_arg = json_out.to_string_lossy().into_owned();
    let rspec_args = [
        "--format",
        "json",
        "--out",
        json_arg.as_str(),
        "--format",
        "progress",
    ];

    let mut attempts: Vec<CommandSpec> = Vec::new();
    if ctx.root.join("Gemfile").is_file() && ctx.probe("bundle", &["--version"]).await {
        ctx.bootstrap(ctx.command("bundle install", "bundle").arg("install"))
            .await;
        let mut args = vec!["exec", "rspec"];
        args.extend(rspec_args);
        attempts.push(ctx.command("bundle exec rspec", "bundle").args(args.as_slice()));
    }
    if ctx.probe("rspec", &["--version"]).await {
        attempts.push(ctx.command("rspec", "rspec").args(&rspec_args));
    }
    if attempts.is_empty() {
        return ExecutionResult::failed("RSpec is not available (tried bundle exec rspec, rspec)");
    }

    let mut last = None;
    for spec in attempts {
        let _ = fs::remove_file(&json_out);
        let outcome = ctx.run(&spec).await;
        let counts = first_counts([
            fs::read_to_string(&json_out)
                .ok()
                .and_then(|json| parse::rspec_json(&json)),
            parse::rspec_text(&outcome.combined_output()),
        ]);
        let coverage_dir = ctx.root.join("coverage");
        let coverage = read_report(&coverage_dir.join(".last_run.json"), coverage::simplecov_last_run);
        let report = ctx.report_path(&coverage_dir.join("index.html"));

        let result = conclude(ctx, &outcome, counts, coverage, report);
        if result.error.is_none() || outcome.timed_out {
            return result;
        }
        tracing::info!(command = %outcome.command, error = ?result.error, "RSpec attempt produced no result");
        last = Some(result);
    }
    last.unwrap_or_else(|| ExecutionResult::failed("RSpec produced no result"))
}
