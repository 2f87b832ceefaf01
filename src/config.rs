//! Configuration management for testforge
//!
//! Stores settings in ~/.config/testforge/config.toml. Environment variables
//! override file values; the OpenRouter API key is never written to the file
//! and is read from the environment or the system keychain.

use crate::util::write_atomic;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const KEYRING_SERVICE: &str = "testforge";
const KEYRING_USERNAME: &str = "openrouter_api_key";

pub const DEFAULT_MODELS: [&str; 3] = [
    "deepseek/deepseek-r1:free",
    "deepseek/deepseek-v3:free",
    "qwen/qwen-2.5-coder-32b-instruct:free",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ai: AiConfig,
    pub execution: ExecutionConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// Model provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub base_url: String,
    /// Ordered candidates: primary, secondary, backup
    pub models: Vec<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub attempt_timeout_secs: u64,
    pub rate_limit_cooldown_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            max_tokens: 8000,
            temperature: 0.1,
            attempt_timeout_secs: 30,
            rate_limit_cooldown_secs: 5,
        }
    }
}

/// Per-phase budgets for external toolchains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub probe_timeout_secs: u64,
    pub bootstrap_timeout_secs: u64,
    pub test_timeout_secs: u64,
    pub fallback_timeout_secs: u64,
    /// Whether missing test frameworks may be installed into the working tree
    pub allow_bootstrap: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 10,
            bootstrap_timeout_secs: 180,
            test_timeout_secs: 300,
            fallback_timeout_secs: 60,
            allow_bootstrap: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Whole-task ceiling
    pub task_timeout_secs: u64,
    pub max_file_bytes: usize,
    pub max_files_per_language: Option<usize>,
    /// Ask the model for mock definitions of each file's dependencies
    pub generate_mocks: bool,
    pub workspace_dir: Option<PathBuf>,
    pub store_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            task_timeout_secs: 3600,
            max_file_bytes: crate::analysis::DEFAULT_MAX_FILE_BYTES,
            max_files_per_language: None,
            generate_mocks: false,
            workspace_dir: None,
            store_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

fn keyring_entry() -> Result<Entry, keyring::Error> {
    Entry::new(KEYRING_SERVICE, KEYRING_USERNAME)
}

fn read_keyring_key() -> Result<Option<String>, keyring::Error> {
    let entry = keyring_entry()?;
    match entry.get_password() {
        Ok(key) => Ok(Some(key)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(err),
    }
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("testforge"))
    }

    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    /// Load config from disk and the environment, or return defaults
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load a config file without applying environment overrides.
    pub fn load_from(path: &Path) -> Self {
        if let Ok(content) = fs::read_to_string(path) {
            match toml::from_str(&content) {
                Ok(config) => return config,
                Err(err) => {
                    preserve_corrupt_config(path, &content);
                    eprintln!(
                        "  Warning: Config file was corrupted ({}). A backup was saved and defaults were loaded.",
                        err
                    );
                }
            }
        }
        Self::default()
    }

    /// Apply overrides from environment-style lookups.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        let slots = ["PRIMARY_MODEL", "SECONDARY_MODEL", "BACKUP_MODEL"];
        for (idx, key) in slots.iter().enumerate() {
            if let Some(model) = get(key).filter(|m| !m.trim().is_empty()) {
                if idx < self.ai.models.len() {
                    self.ai.models[idx] = model.trim().to_string();
                } else {
                    self.ai.models.push(model.trim().to_string());
                }
            }
        }
        if let Some(v) = get("MAX_TOKENS_PER_REQUEST").and_then(|v| v.trim().parse().ok()) {
            self.ai.max_tokens = v;
        }
        if let Some(v) = get("TEMPERATURE").and_then(|v| v.trim().parse().ok()) {
            self.ai.temperature = v;
        }
        if let Some(v) = get("MAX_ANALYSIS_TIME").and_then(|v| v.trim().parse().ok()) {
            self.pipeline.task_timeout_secs = v;
        }
        if let Some(v) = get("LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            self.logging.level = v.trim().to_ascii_lowercase();
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<(), String> {
        let dir = Self::config_dir()
            .ok_or_else(|| "Could not determine config directory".to_string())?;
        fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        self.save_to(&dir.join("config.toml"))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {}", e))?;
        write_atomic(path, &content).map_err(|e| format!("Failed to write config: {}", e))
    }

    /// Get the OpenRouter API key (from environment or keychain)
    pub fn api_key(&self) -> Option<String> {
        // Environment variable takes precedence
        if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
            if !key.trim().is_empty() {
                return Some(key.trim().to_string());
            }
        }

        match read_keyring_key() {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to read API key from system keychain");
                None
            }
        }
    }

    /// Store the API key in the system keychain and verify it reads back
    pub fn set_api_key(key: &str) -> Result<(), String> {
        let entry = keyring_entry().map_err(|e| e.to_string())?;
        entry.set_password(key).map_err(|e| {
            format!(
                "Failed to store API key in system keychain: {}. \
                 You can set the OPENROUTER_API_KEY environment variable instead.",
                e
            )
        })?;
        match read_keyring_key() {
            Ok(Some(stored)) if stored == key => Ok(()),
            Ok(_) => Err("API key verification failed: key was not persisted to keychain".to_string()),
            Err(e) => Err(format!("API key verification failed: {}", e)),
        }
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/testforge/config.toml".to_string())
    }

    fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("testforge")
    }

    /// Directory under which working trees are created
    pub fn workspace_dir(&self) -> PathBuf {
        self.pipeline
            .workspace_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("workspaces"))
    }

    /// Directory holding persisted tasks and result bundles
    pub fn store_dir(&self) -> PathBuf {
        self.pipeline
            .store_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("tasks"))
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.task_timeout_secs)
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    let corrupt_path = path.with_extension(format!("toml.corrupt-{}", stamp));
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.ai.models.len(), 3);
        assert_eq!(config.ai.models[0], "deepseek/deepseek-r1:free");
        assert_eq!(config.ai.max_tokens, 8000);
        assert_eq!(config.execution.probe_timeout_secs, 10);
        assert_eq!(config.pipeline.max_file_bytes, 100_000);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SECONDARY_MODEL", "openai/gpt-4o-mini"),
            ("MAX_ANALYSIS_TIME", "120"),
            ("LOG_LEVEL", "DEBUG"),
            ("TEMPERATURE", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.ai.models[1], "openai/gpt-4o-mini");
        assert_eq!(config.pipeline.task_timeout_secs, 120);
        assert_eq!(config.logging.level, "debug");
        assert!((config.ai.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[pipeline]\ntask_timeout_secs = 42\n").unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.pipeline.task_timeout_secs, 42);
        assert_eq!(config.ai, AiConfig::default());
    }

    #[test]
    fn test_corrupt_file_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[ai\nmodels = ").unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config, Config::default());
        let backups = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("corrupt"))
            .count();
        assert_eq!(backups, 1);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.pipeline.max_files_per_language = Some(5);
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path), config);
    }
}
