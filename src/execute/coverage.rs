//! Coverage report readers
//!
//! Every reader returns a percentage in `[0, 100]` restricted to source
//! files, or `None` when the report is missing or unreadable. Zero total
//! statements is 0%, never NaN.

use super::parse::xml_elements;
use crate::analysis::scanner::is_ignored_dir_name;
use crate::catalog::Language;
use crate::util::round2;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

/// `covered / total * 100`, 0 when `total` is 0.
pub fn percentage(covered: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2((covered.min(total) as f64 / total as f64) * 100.0)
}

fn clamp_percent(value: f64) -> Option<f64> {
    value.is_finite().then(|| round2(value.clamp(0.0, 100.0)))
}

/// Test files, vendored code, hidden paths and build scaffolding.
pub fn is_excluded_source(language: Language, path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    let mut parts = normalized.split('/').filter(|p| !p.is_empty()).peekable();
    let mut file_name = "";
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            file_name = part;
            break;
        }
        if part.starts_with('.') || is_ignored_dir_name(part) {
            return true;
        }
    }

    if file_name.is_empty() || file_name.starts_with('.') {
        return true;
    }
    if language.is_test_file(Path::new(file_name)) {
        return true;
    }
    match language {
        Language::Python => matches!(file_name, "conftest.py" | "setup.py") || normalized.starts_with("tests/"),
        Language::JavaScript => file_name.contains(".config.") || file_name.ends_with("rc.js"),
        Language::Go => file_name.ends_with("_test.go"),
        _ => false,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  PYTHON
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct CoveragePyReport {
    #[serde(default)]
    files: HashMap<String, CoveragePyFile>,
}

#[derive(Deserialize)]
struct CoveragePyFile {
    summary: CoveragePySummary,
}

#[derive(Deserialize)]
struct CoveragePySummary {
    #[serde(default)]
    covered_lines: u64,
    #[serde(default)]
    num_statements: u64,
}

/// coverage.py JSON (`--cov-report=json`), per file.
pub fn coverage_py_json(json: &str) -> Option<f64> {
    let report: CoveragePyReport = serde_json::from_str(json).ok()?;
    let (covered, total) = report
        .files
        .iter()
        .filter(|(path, _)| !is_excluded_source(Language::Python, path))
        .fold((0, 0), |(c, t), (_, file)| {
            (c + file.summary.covered_lines, t + file.summary.num_statements)
        });
    Some(percentage(covered, total))
}

static HTMLCOV_TOTAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"class="pc_cov">\s*([\d.]+)%"#).expect("static regex pattern")
});

/// The headline figure from `htmlcov/index.html`.
pub fn htmlcov_index(html: &str) -> Option<f64> {
    let caps = HTMLCOV_TOTAL.captures(html)?;
    clamp_percent(caps[1].parse().ok()?)
}

// ═══════════════════════════════════════════════════════════════════════════
//  JAVASCRIPT
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct IstanbulFile {
    #[serde(default)]
    s: HashMap<String, u64>,
}

/// Istanbul `coverage-final.json` statement hit maps.
pub fn istanbul_json(json: &str, root: &Path) -> Option<f64> {
    let report: HashMap<String, IstanbulFile> = serde_json::from_str(json).ok()?;
    let mut covered = 0u64;
    let mut total = 0u64;
    for (path, file) in &report {
        let relative = Path::new(path)
            .strip_prefix(root)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| path.clone());
        if is_excluded_source(Language::JavaScript, &relative) {
            continue;
        }
        total += file.s.len() as u64;
        covered += file.s.values().filter(|hits| **hits > 0).count() as u64;
    }
    Some(percentage(covered, total))
}

// ═══════════════════════════════════════════════════════════════════════════
//  JAVA / C# / PHP (XML)
// ═══════════════════════════════════════════════════════════════════════════

/// JaCoCo XML: the report-level `LINE` counter.
pub fn jacoco_xml(xml: &str) -> Option<f64> {
    let counter = xml_elements(xml).into_iter().find(|e| {
        e.name == "counter"
            && e.parent.as_deref() == Some("report")
            && e.attrs.get("type").map(String::as_str) == Some("LINE")
    })?;
    let covered = counter.attr_usize("covered") as u64;
    let missed = counter.attr_usize("missed") as u64;
    Some(percentage(covered, covered + missed))
}

/// Cobertura XML (coverlet): `lines-covered / lines-valid`, else `line-rate`.
pub fn cobertura_xml(xml: &str) -> Option<f64> {
    let root = xml_elements(xml).into_iter().find(|e| e.name == "coverage")?;
    if root.attrs.contains_key("lines-valid") {
        return Some(percentage(
            root.attr_usize("lines-covered") as u64,
            root.attr_usize("lines-valid") as u64,
        ));
    }
    clamp_percent(root.attr_f64("line-rate")? * 100.0)
}

/// Clover XML: the project-level `metrics` element.
pub fn clover_xml(xml: &str) -> Option<f64> {
    let metrics = xml_elements(xml)
        .into_iter()
        .find(|e| e.name == "metrics" && e.parent.as_deref() == Some("project"))?;
    Some(percentage(
        metrics.attr_usize("coveredstatements") as u64,
        metrics.attr_usize("statements") as u64,
    ))
}

static PHPUNIT_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Lines:\s*([\d.]+)%").expect("static regex pattern"));

/// PHPUnit `--coverage-text` summary.
pub fn phpunit_text(output: &str) -> Option<f64> {
    let caps = PHPUNIT_LINES.captures(output)?;
    clamp_percent(caps[1].parse().ok()?)
}

// ═══════════════════════════════════════════════════════════════════════════
//  GO
// ═══════════════════════════════════════════════════════════════════════════

/// A `go test -coverprofile` file. Blocks reported by several packages are
/// merged, keeping the highest hit count.
pub fn go_profile(profile: &str) -> Option<f64> {
    let mut lines = profile.lines();
    if !lines.next()?.starts_with("mode:") {
        return None;
    }

    let mut blocks: HashMap<&str, (u64, u64)> = HashMap::new();
    for line in lines {
        let mut fields = line.rsplitn(3, ' ');
        let (Some(count), Some(statements), Some(block)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let (Ok(count), Ok(statements)) = (count.parse::<u64>(), statements.parse::<u64>()) else {
            continue;
        };
        let file = block.split(':').next().unwrap_or(block);
        if file.contains("/vendor/") || file.ends_with("_test.go") {
            continue;
        }
        let entry = blocks.entry(block).or_insert((statements, 0));
        entry.1 = entry.1.max(count);
    }

    let (covered, total) = blocks.values().fold((0, 0), |(c, t), (statements, hits)| {
        (c + if *hits > 0 { *statements } else { 0 }, t + statements)
    });
    Some(percentage(covered, total))
}

// ═══════════════════════════════════════════════════════════════════════════
//  RUBY
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct SimpleCovLastRun {
    result: SimpleCovResult,
}

#[derive(Deserialize)]
struct SimpleCovResult {
    line: Option<f64>,
    covered_percent: Option<f64>,
}

/// SimpleCov `coverage/.last_run.json`.
pub fn simplecov_last_run(json: &str) -> Option<f64> {
    let last_run: SimpleCovLastRun = serde_json::from_str(json).ok()?;
    clamp_percent(last_run.result.line.or(last_run.result.covered_percent)?)
}

/// Read `path` and apply `reader`, treating a missing file as no data.
pub fn read_report(path: &Path, reader: impl FnOnce(&str) -> Option<f64>) -> Option<f64> {
    let content = fs::read_to_string(path).ok()?;
    reader(&content)
}
