//! Test generation stage
//!
//! For one language at a time: read each source file, ask the model for its
//! structure and then for a test file, write the test where the language's
//! tooling expects it, and count the cases it defines. Per-file failures are
//! recorded and skipped; a language succeeds when at least one test file was
//! written.

pub mod count;

use crate::ai::GenerationClient;
use crate::analysis::{read_source, RepositoryAnalysis};
use crate::catalog::Language;
use crate::util::resolve_in_tree;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedTestUnit {
    pub source_file: String,
    pub test_file: String,
    pub test_cases: usize,
    pub language: Language,
    /// Mock definitions for the file's dependencies, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub source_file: String,
    pub error: String,
}

/// Generation outcome for one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageGeneration {
    pub language: Language,
    pub framework: String,
    pub units: Vec<GeneratedTestUnit>,
    pub tests_generated: usize,
    pub success: bool,
    pub error: Option<String>,
    #[serde(default)]
    pub failures: Vec<FileFailure>,
}

impl LanguageGeneration {
    fn new(language: Language) -> Self {
        Self {
            language,
            framework: language.framework().to_string(),
            units: Vec::new(),
            tests_generated: 0,
            success: false,
            error: None,
            failures: Vec::new(),
        }
    }

    /// A language whose generation could not start at all.
    pub fn failed(language: Language, error: impl Into<String>) -> Self {
        let mut result = Self::new(language);
        result.error = Some(error.into());
        result
    }

    fn record_failure(&mut self, source_file: &str, error: String) {
        tracing::warn!(file = %source_file, error = %error, "Test generation failed for file");
        self.failures.push(FileFailure {
            source_file: source_file.to_string(),
            error,
        });
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub max_file_bytes: usize,
    pub max_files: Option<usize>,
    pub generate_mocks: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_file_bytes: crate::analysis::DEFAULT_MAX_FILE_BYTES,
            max_files: None,
            generate_mocks: false,
        }
    }
}

/// Generate tests for every source file of `language`.
pub async fn generate_for_language(
    client: &GenerationClient,
    root: &Path,
    analysis: &RepositoryAnalysis,
    language: Language,
    options: &GenerationOptions,
) -> LanguageGeneration {
    let mut result = LanguageGeneration::new(language);
    let mut sources = analysis.source_files(language);
    if let Some(limit) = options.max_files {
        sources.truncate(limit);
    }

    if sources.is_empty() {
        result.error = Some("No source files to generate tests for".to_string());
        return result;
    }

    // Sources sharing a stem map onto one test file; the first one written keeps it
    let mut claimed: HashMap<PathBuf, &str> = HashMap::new();
    for source in sources {
        let target = language.test_file_path(Path::new(source));
        if let Some(owner) = claimed.get(&target) {
            result.record_failure(
                source,
                format!(
                    "Test file {} was already generated for {}",
                    target.display(),
                    owner
                ),
            );
            continue;
        }

        match generate_for_file(client, root, language, source, options).await {
            Ok(unit) => {
                claimed.insert(target, source);
                tracing::info!(
                    file = %unit.source_file,
                    test_file = %unit.test_file,
                    cases = unit.test_cases,
                    "Generated tests"
                );
                result.tests_generated += unit.test_cases;
                result.units.push(unit);
            }
            Err(err) => result.record_failure(source, err),
        }
    }

    result.success = !result.units.is_empty();
    if !result.success {
        result.error = Some(
            result
                .failures
                .last()
                .map(|f| f.error.clone())
                .unwrap_or_else(|| "No tests generated".to_string()),
        );
    }
    result
}

async fn generate_for_file(
    client: &GenerationClient,
    root: &Path,
    language: Language,
    source: &str,
    options: &GenerationOptions,
) -> Result<GeneratedTestUnit, String> {
    let code = read_source(root, source, options.max_file_bytes)
        .map_err(|e| format!("Failed to read {}: {}", source, e))?;
    if code.trim().is_empty() {
        return Err("Source file is empty".to_string());
    }

    let structure = match client.analyze_structure(&code, language, source).await {
        Ok(structure) => structure,
        Err(err) => {
            // Generation still runs without structure hints
            tracing::warn!(file = %source, error = %err, "Structural analysis unavailable");
            Default::default()
        }
    };
    let dependencies = structure.all_dependencies();

    let test_code = client
        .generate_tests(&code, language, language.framework(), source, &dependencies)
        .await
        .map_err(|e| e.to_string())?;
    if test_code.trim().is_empty() {
        return Err("Model returned no test code".to_string());
    }

    let mock_code = if options.generate_mocks {
        match client.generate_mocks(&code, language, &dependencies).await {
            Ok(mocks) => mocks,
            Err(err) => {
                tracing::warn!(file = %source, error = %err, "Mock generation failed");
                None
            }
        }
    } else {
        None
    };

    let target = language.test_file_path(Path::new(source));
    let resolved = resolve_in_tree(root, &target)?;
    if let Some(parent) = resolved.absolute.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    fs::write(&resolved.absolute, &test_code)
        .map_err(|e| format!("Failed to write {}: {}", resolved.absolute.display(), e))?;

    Ok(GeneratedTestUnit {
        source_file: source.to_string(),
        test_file: resolved.relative,
        test_cases: language.count_test_cases(&test_code, &target),
        language,
        mock_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::tests::ScriptedTransport;
    use crate::ai::AttemptOutcome;
    use crate::analysis::analyze;
    use crate::config::AiConfig;
    use std::sync::Arc;

    fn client(script: Vec<AttemptOutcome>) -> (GenerationClient, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(script));
        let config = AiConfig {
            models: vec!["m".to_string()],
            rate_limit_cooldown_secs: 0,
            ..AiConfig::default()
        };
        (GenerationClient::new(transport.clone(), &config).unwrap(), transport)
    }

    #[tokio::test]
    async fn test_generates_python_unit() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("src")).unwrap();
        fs::write(root.path().join("src/calc.py"), "def add(a, b):\n    return a + b\n").unwrap();
        let analysis = analyze(root.path()).unwrap();

        let (client, _) = client(vec![
            AttemptOutcome::Success(r#"{"functions": [{"name": "add"}], "dependencies": []}"#.into()),
            AttemptOutcome::Success(
                "```python\nfrom src.calc import add\n\ndef test_add():\n    assert add(1, 2) == 3\n\ndef test_add_negative():\n    assert add(-1, -1) == -2\n```".into(),
            ),
        ]);

        let result = generate_for_language(
            &client,
            root.path(),
            &analysis,
            Language::Python,
            &GenerationOptions::default(),
        )
        .await;

        assert!(result.success);
        assert_eq!(result.units.len(), 1);
        assert_eq!(result.units[0].test_file, "tests/test_calc.py");
        assert_eq!(result.units[0].test_cases, 2);
        assert_eq!(result.tests_generated, 2);
        let written = fs::read_to_string(root.path().join("tests/test_calc.py")).unwrap();
        assert!(written.contains("def test_add_negative"));
    }

    #[tokio::test]
    async fn test_failed_structure_still_generates() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("main.go"), "package main\n\nfunc Add(a, b int) int { return a + b }\n").unwrap();
        let analysis = analyze(root.path()).unwrap();

        let (client, transport) = client(vec![
            AttemptOutcome::RateLimited("busy".into()),
            AttemptOutcome::Success("package main\n\nimport \"testing\"\n\nfunc TestAdd(t *testing.T) {}\n".into()),
        ]);

        let result = generate_for_language(
            &client,
            root.path(),
            &analysis,
            Language::Go,
            &GenerationOptions::default(),
        )
        .await;

        assert!(result.success);
        assert_eq!(result.units[0].test_file, "main_test.go");
        assert_eq!(result.units[0].test_cases, 1);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_provider_exhaustion_fails_language() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("app.rb"), "class App; end\n").unwrap();
        let analysis = analyze(root.path()).unwrap();

        let (client, _) = client(vec![
            AttemptOutcome::Failed("down".into()),
            AttemptOutcome::Failed("down".into()),
        ]);

        let result = generate_for_language(
            &client,
            root.path(),
            &analysis,
            Language::Ruby,
            &GenerationOptions::default(),
        )
        .await;

        assert!(!result.success);
        assert!(result.units.is_empty());
        assert_eq!(result.failures.len(), 1);
        assert!(result.error.unwrap().contains("All AI models failed"));
    }

    #[tokio::test]
    async fn test_max_files_limits_work() {
        let root = tempfile::tempdir().unwrap();
        for name in ["a.py", "b.py", "c.py"] {
            fs::write(root.path().join(name), "x = 1\n").unwrap();
        }
        let analysis = analyze(root.path()).unwrap();
        let (client, transport) = client(vec![
            AttemptOutcome::Success("{}".into()),
            AttemptOutcome::Success("def test_a():\n    pass\n".into()),
        ]);
        let options = GenerationOptions {
            max_files: Some(1),
            ..GenerationOptions::default()
        };

        let result =
            generate_for_language(&client, root.path(), &analysis, Language::Python, &options).await;
        assert_eq!(result.units.len(), 1);
        assert_eq!(result.units[0].source_file, "a.py");
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_same_stem_sources_keep_first_test_file() {
        let root = tempfile::tempdir().unwrap();
        for dir in ["src", "lib"] {
            fs::create_dir_all(root.path().join(dir)).unwrap();
            fs::write(root.path().join(dir).join("calc.py"), "def add(a, b):\n    return a + b\n").unwrap();
        }
        let analysis = analyze(root.path()).unwrap();
        let (client, transport) = client(vec![
            AttemptOutcome::Success("{}".into()),
            AttemptOutcome::Success("def test_add():\n    pass\n\ndef test_add_zero():\n    pass\n".into()),
        ]);

        let result = generate_for_language(
            &client,
            root.path(),
            &analysis,
            Language::Python,
            &GenerationOptions::default(),
        )
        .await;

        assert!(result.success);
        assert_eq!(result.units.len(), 1);
        assert_eq!(result.units[0].test_file, "tests/test_calc.py");
        assert_eq!(result.tests_generated, 2);
        assert_eq!(result.failures.len(), 1);
        assert_ne!(result.failures[0].source_file, result.units[0].source_file);
        assert!(result.failures[0].error.contains("already generated"));
        // The second source never reached the model
        assert_eq!(transport.calls().len(), 2);
    }
}
