//! Go: `go test -json` with a cover profile

use super::{conclude, first_counts, Context};
use crate::execute::coverage::{self, read_report};
use crate::execute::parse;
use crate::execute::ExecutionResult;

const FALLBACK_MODULE: &str = "testforge/generated";

pub async fn run(ctx: &Context<'_>) -> ExecutionResult {
    if !ctx.probe("go", &["version"]).await {
        return ExecutionResult::failed("The Go toolchain (go) is not available");
    }
    let report_dir = match ctx.report_dir() {
        Ok(dir) => dir,
        Err(err) => return ExecutionResult::failed(err),
    };

    if !ctx.root.join("go.mod").is_file() {
        let init = ctx
            .command("go mod init", "go")
            .args(&["mod", "init", FALLBACK_MODULE])
            .timeout(ctx.fallback_timeout());
        let outcome = ctx.run(&init).await;
        if !outcome.success {
            tracing::warn!(failure = ?outcome.execution_failure(), "go mod init failed");
        }
    }

    let profile = report_dir.join("coverage.out");
    let profile_arg = format!("-coverprofile={}", profile.display());
    let spec = ctx
        .command("go test", "go")
        .args(&["test", "-json", profile_arg.as_str(), "./..."]);
    let outcome = ctx.run(&spec).await;

    let counts = first_counts([
        parse::go_json(&outcome.stdout),
        parse::go_text(&outcome.combined_output()),
    ]);
    let coverage = read_report(&profile, coverage::go_profile);

    let mut report = None;
    if profile.is_file() {
        let html = report_dir.join("coverage.html");
        let html_spec = ctx
            .command("go tool cover", "go")
            .args(&[
                "tool".to_string(),
                "cover".to_string(),
                format!("-html={}", profile.display()),
                "-o".to_string(),
                html.to_string_lossy().into_owned(),
            ])
            .timeout(ctx.fallback_timeout());
        if ctx.run(&html_spec).await.success {
            report = ctx.report_path(&html);
        }
    }

    conclude(ctx, &outcome, counts, coverage, report)
}
