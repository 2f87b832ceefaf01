//! C#: `dotnet test` with coverlet and a TRX logger

use super::{conclude, first_counts, newest_file, Context};
use crate::execute::coverage::{self, read_report};
use crate::execute::parse::{self, TestCounts};
use crate::execute::ExecutionResult;
use std::fs;
use std::path::Path;

pub async fn run(ctx: &Context<'_>) -> ExecutionResult {
    if !ctx.probe("dotnet", &["--version"]).await {
        return ExecutionResult::failed("The .NET SDK (dotnet) is not available");
    }
    let report_dir = match ctx.report_dir() {
        Ok(dir) => dir,
        Err(err) => return ExecutionResult::failed(err),
    };
    // Stale TRX files from an earlier run would be summed in
    let _ = fs::remove_dir_all(&report_dir);
    if let Err(err) = ctx.report_dir() {
        return ExecutionResult::failed(err);
    }

    let results = report_dir.to_string_lossy().into_owned();
    let spec = ctx.command("dotnet test", "dotnet").args(&[
        "test",
        "--collect",
        "XPlat Code Coverage",
        "--logger",
        "trx",
        "--results-directory",
        results.as_str(),
    ]);
    let outcome = ctx.run(&spec).await;
    let output = outcome.combined_output();

    let counts = first_counts([
        trx_dir(&report_dir),
        parse::dotnet_summary(&output),
    ]);
    let cobertura = newest_file(&report_dir, |name| name == "coverage.cobertura.xml");
    let coverage = cobertura
        .as_deref()
        .and_then(|path| read_report(path, coverage::cobertura_xml));
    let report = cobertura.as_deref().and_then(|path| ctx.report_path(path));

    conclude(ctx, &outcome, counts, coverage, report)
}

/// Sum every TRX file under `dir` (one per test project).
fn trx_dir(dir: &Path) -> Option<TestCounts> {
    let mut total: Option<TestCounts> = None;
    for entry in walkdir::WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("trx"))
    {
        if let Some(counts) = fs::read_to_string(entry.path())
            .ok()
            .and_then(|xml| parse::trx(&xml))
        {
            total = Some(total.unwrap_or_default() + counts);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trx_dir_sums_projects() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("run1");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            dir.path().join("a.trx"),
            r#"<TestRun><ResultSummary><Counters passed="2" failed="0"/></ResultSummary></TestRun>"#,
        )
        .unwrap();
        fs::write(
            nested.join("b.trx"),
            r#"<TestRun><ResultSummary><Counters passed="1" failed="2"/></ResultSummary></TestRun>"#,
        )
        .unwrap();
        assert_eq!(trx_dir(dir.path()), Some(TestCounts::new(3, 2)));
    }

    #[test]
    fn test_trx_dir_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(trx_dir(dir.path()), None);
    }
}
