//! JavaScript/TypeScript: jest (or karma when the project uses it)

use super::{conclude, first_counts, Context};
use crate::execute::coverage::{self, read_report};
use crate::execute::parse;
use crate::execute::ExecutionResult;
use crate::util::write_atomic;
use serde_json::Value;
use std::fs;
use std::path::Path;

const MINIMAL_PACKAGE_JSON: &str = r#"{
  "name": "testforge-generated",
  "version": "0.0.0",
  "private": true,
  "scripts": {
    "test": "jest"
  }
}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Runner {
    Jest,
    Karma,
}

/// npm and an optional PATH override when node came from nodeenv
struct Npm {
    program: String,
    env: Vec<(String, String)>,
}

pub async fn run(ctx: &Context<'_>) -> ExecutionResult {
    let report_dir = match ctx.report_dir() {
        Ok(dir) => dir,
        Err(err) => return ExecutionResult::failed(err),
    };
    let Some(npm) = find_npm(ctx, &report_dir).await else {
        return ExecutionResult::failed("npm is not available and nodeenv could not provide it");
    };

    let package_json = ctx.root.join("package.json");
    if !package_json.is_file() {
        if let Err(err) = write_atomic(&package_json, MINIMAL_PACKAGE_JSON) {
            return ExecutionResult::failed(format!("Failed to create package.json: {}", err));
        }
        tracing::info!("Created a minimal package.json");
    }
    let runner = detect_runner(&package_json);

    if !ctx.root.join("node_modules").is_dir() {
        ctx.bootstrap(
            ctx.command("npm install", npm.program.as_str())
                .args(&["install", "--no-audit", "--no-fund"])
                .with_env_overrides(&npm.env),
        )
        .await;
    }
    if runner == Runner::Jest && !ctx.root.join("node_modules/.bin/jest").exists() {
        ctx.bootstrap(
            ctx.command("install jest", npm.program.as_str())
                .args(&["install", "--save-dev", "--no-audit", "--no-fund", "jest"])
                .with_env_overrides(&npm.env),
        )
        .await;
    }

    let results_json = report_dir.join("jest-results.json");
    let coverage_dir = report_dir.join("coverage");
    let spec = match runner {
        Runner::Jest => ctx
            .command("jest", npx_for(&npm.program))
            .args(&[
                "jest".to_string(),
                "--ci".to_string(),
                "--verbose".to_string(),
                "--json".to_string(),
                format!("--outputFile={}", results_json.display()),
                "--coverage".to_string(),
                "--coverageReporters=json".to_string(),
                "--coverageReporters=html".to_string(),
                format!("--coverageDirectory={}", coverage_dir.display()),
            ])
            .with_env_overrides(&npm.env),
        Runner::Karma => ctx
            .command("karma", npm.program.as_str())
            .args(&["test", "--", "--single-run"])
            .with_env_overrides(&npm.env),
    };
    let outcome = ctx.run(&spec).await;
    let output = outcome.combined_output();

    let counts = first_counts([
        fs::read_to_string(&results_json)
            .ok()
            .and_then(|json| parse::jest_json(&json)),
        parse::jest_summary(&output),
        parse::karma_summary(&output),
        parse::js_markers(&output),
    ]);

    let root = ctx
        .root
        .canonicalize()
        .unwrap_or_else(|_| ctx.root.to_path_buf());
    let coverage = read_report(&coverage_dir.join("coverage-final.json"), |json| {
        coverage::istanbul_json(json, &root)
    });
    let report = ctx.report_path(&coverage_dir.join("index.html"));

    conclude(ctx, &outcome, counts, coverage, report)
}

async fn find_npm(ctx: &Context<'_>, report_dir: &Path) -> Option<Npm> {
    if ctx.probe("npm", &["--version"]).await {
        return Some(Npm {
            program: "npm".to_string(),
            env: Vec::new(),
        });
    }
    if !ctx.probe("nodeenv", &["--version"]).await {
        return None;
    }

    let env_dir = report_dir.join("nodeenv");
    let env_str = env_dir.to_string_lossy().into_owned();
    tracing::info!(dir = %env_dir.display(), "Bootstrapping node with nodeenv");
    if !ctx
        .bootstrap(ctx.command("nodeenv", "nodeenv").args(&["--prebuilt", env_str.as_str()]))
        .await
    {
        return None;
    }

    let bin = env_dir.join("bin");
    let path = match std::env::var_os("PATH") {
        Some(existing) => {
            let mut paths = vec![bin.clone()];
            paths.extend(std::env::split_paths(&existing));
            std::env::join_paths(paths).ok()?
        }
        None => bin.clone().into_os_string(),
    };
    Some(Npm {
        program: bin.join("npm").to_string_lossy().into_owned(),
        env: vec![("PATH".to_string(), path.to_string_lossy().into_owned())],
    })
}

fn npx_for(npm: &str) -> String {
    match npm.strip_suffix("npm") {
        Some(prefix) => format!("{}npx", prefix),
        None => "npx".to_string(),
    }
}

/// Karma when the `test` script mentions it, jest otherwise.
fn detect_runner(package_json: &Path) -> Runner {
    let script = fs::read_to_string(package_json)
        .ok()
        .and_then(|content| serde_json::from_str::<Value>(&content).ok())
        .and_then(|manifest| {
            manifest
                .get("scripts")
                .and_then(|s| s.get("test"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_default();
    if script.contains("karma") {
        Runner::Karma
    } else {
        Runner::Jest
    }
}
