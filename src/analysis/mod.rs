//! Repository analysis
//!
//! Classifies every visible file of a working tree by language, separates
//! test files from sources, and records the build configuration each
//! detected language uses. The result is a pure function of the tree
//! contents, so analysing an unchanged tree twice yields equal values.

pub mod scanner;

use crate::catalog::Language;
use crate::error::AnalyzeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub use scanner::{is_ignored_dir_name, RepoScanner, VENDOR_DIRS};

/// Default cap on how much of one source file is sent to the model.
pub const DEFAULT_MAX_FILE_BYTES: usize = 100_000;

const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Files of one language inside the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageFiles {
    /// Relative paths, tests included, in walk order
    pub files: Vec<String>,
    pub count: usize,
    pub framework: String,
    /// Relative path of the first matching build/config file at the root
    pub config_file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryAnalysis {
    pub total_files: usize,
    pub languages: BTreeMap<Language, LanguageFiles>,
    /// Non-test source files across all languages
    pub main_files: Vec<String>,
}

impl RepositoryAnalysis {
    /// Languages with at least one file, in catalog order.
    pub fn languages_detected(&self) -> Vec<Language> {
        self.languages.keys().copied().collect()
    }

    /// Non-test source files of one language.
    pub fn source_files(&self, language: Language) -> Vec<&str> {
        self.languages
            .get(&language)
            .map(|entry| {
                entry
                    .files
                    .iter()
                    .filter(|f| !language.is_test_file(Path::new(f.as_str())))
                    .map(String::as_str)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Analyze the tree rooted at `root`.
pub fn analyze(root: &Path) -> Result<RepositoryAnalysis, AnalyzeError> {
    let meta = fs::metadata(root).map_err(|_| AnalyzeError::InaccessibleRoot {
        path: root.to_path_buf(),
    })?;
    if !meta.is_dir() {
        return Err(AnalyzeError::InaccessibleRoot {
            path: root.to_path_buf(),
        });
    }

    let files = RepoScanner::new().visible_files(root);
    let mut analysis = RepositoryAnalysis {
        total_files: files.len(),
        ..Default::default()
    };

    for rel in files {
        let path = Path::new(&rel);
        let Some(language) = Language::from_path(path) else {
            continue;
        };

        if !language.is_test_file(path) {
            analysis.main_files.push(rel.clone());
        }

        let entry = analysis
            .languages
            .entry(language)
            .or_insert_with(|| LanguageFiles {
                files: Vec::new(),
                count: 0,
                framework: language.framework().to_string(),
                config_file: None,
            });
        entry.files.push(rel);
        entry.count += 1;
    }

    let root_names = root_file_names(root);
    for (language, entry) in analysis.languages.iter_mut() {
        entry.config_file = detect_config_file(*language, &root_names);
    }

    tracing::debug!(
        total_files = analysis.total_files,
        languages = analysis.languages.len(),
        main_files = analysis.main_files.len(),
        "Repository analyzed"
    );

    Ok(analysis)
}

fn root_file_names(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(root) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

/// First config file present, in the catalog's priority order.
fn detect_config_file(language: Language, root_names: &[String]) -> Option<String> {
    for pattern in language.config_files() {
        let found = match pattern.strip_prefix('*') {
            Some(suffix) => root_names
                .iter()
                .find(|name| name.ends_with(suffix) && name.len() > suffix.len()),
            None => root_names.iter().find(|name| name.as_str() == *pattern),
        };
        if let Some(name) = found {
            return Some(name.clone());
        }
    }
    None
}

/// Read one source file, keeping at most `max_bytes` bytes.
pub fn read_source(root: &Path, rel: &str, max_bytes: usize) -> std::io::Result<String> {
    let bytes = fs::read(root.join(rel))?;
    if bytes.len() <= max_bytes {
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }
    let mut content = String::from_utf8_lossy(&bytes[..max_bytes]).into_owned();
    // Lossy decoding of a split code point leaves a replacement char at the end
    if content.ends_with('\u{FFFD}') {
        content.pop();
    }
    content.push_str(TRUNCATION_MARKER);
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_single_python_file() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "calc.py", "def add(a, b):\n    return a + b\n");

        let analysis = analyze(root.path()).unwrap();
        assert_eq!(analysis.total_files, 1);
        assert_eq!(analysis.languages.len(), 1);
        let python = &analysis.languages[&Language::Python];
        assert_eq!(python.count, 1);
        assert_eq!(python.framework, "pytest");
        assert_eq!(analysis.main_files, vec!["calc.py".to_string()]);
    }

    #[test]
    fn test_tests_counted_but_not_main() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "src/app.js", "module.exports = 1;\n");
        write(root.path(), "src/app.test.js", "test('x', () => {});\n");
        write(root.path(), "README.md", "# readme\n");
        write(root.path(), "package.json", "{}\n");

        let analysis = analyze(root.path()).unwrap();
        assert_eq!(analysis.total_files, 4);
        let js = &analysis.languages[&Language::JavaScript];
        assert_eq!(js.count, 2);
        assert_eq!(js.config_file.as_deref(), Some("package.json"));
        assert_eq!(analysis.main_files, vec!["src/app.js".to_string()]);
        assert_eq!(analysis.source_files(Language::JavaScript), vec!["src/app.js"]);
    }

    #[test]
    fn test_config_glob_detection() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "Lib.cs", "class Lib {}\n");
        write(root.path(), "Lib.csproj", "<Project />\n");

        let analysis = analyze(root.path()).unwrap();
        assert_eq!(
            analysis.languages[&Language::CSharp].config_file.as_deref(),
            Some("Lib.csproj")
        );
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "b/mod.go", "package b\n");
        write(root.path(), "a/util.py", "x = 1\n");
        write(root.path(), "a/test_util.py", "def test_x(): pass\n");
        write(root.path(), "go.mod", "module example\n");

        let first = analyze(root.path()).unwrap();
        let second = analyze(root.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("nope");
        assert!(matches!(
            analyze(&missing),
            Err(AnalyzeError::InaccessibleRoot { .. })
        ));
    }

    #[test]
    fn test_read_source_truncates() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "big.py", &"x".repeat(50));

        let content = read_source(root.path(), "big.py", 10).unwrap();
        assert!(content.starts_with("xxxxxxxxxx"));
        assert!(content.ends_with("(truncated)"));

        let whole = read_source(root.path(), "big.py", 100).unwrap();
        assert_eq!(whole.len(), 50);
    }
}
