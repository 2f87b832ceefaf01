//! Error types for the testforge library
//!
//! Per-file and per-language failures are recorded as strings inside the
//! result bundle. Only the variants that can end a task (acquisition and
//! timeout) travel up to the orchestrator as values of these types.

use crate::task::TaskStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the model request primitive.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AiError {
    #[error("No API key configured. Set OPENROUTER_API_KEY or store a key in the system keychain.")]
    MissingApiKey,

    #[error("No models configured")]
    NoModels,

    #[error("All AI models failed to respond ({attempts} attempts): {last_error}")]
    ProvidersExhausted { attempts: usize, last_error: String },
}

/// Failures while producing a working tree for a task.
#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("Invalid repository source '{source_ref}': {reason}")]
    InvalidSource { source_ref: String, reason: String },

    #[error("Failed to clone {url}: {message}")]
    Clone { url: String, message: String },

    #[error("Failed to copy {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Acquisition task failed: {0}")]
    Join(String),
}

/// Failures of the repository walk.
#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Repository root is not accessible: {path}")]
    InaccessibleRoot { path: PathBuf },
}

/// Persistent store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store record is corrupt at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Timed out waiting for store lock ({0}s)")]
    LockTimeout(u64),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Store worker failed: {0}")]
    Join(String),
}

/// Task lifecycle failures.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Invalid task transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Progress can only be reported while running (status: {0})")]
    NotRunning(TaskStatus),

    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Analyze(#[from] AnalyzeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Analysis timed out after {0} seconds")]
    Timeout(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhaustion_message_names_attempts() {
        let err = AiError::ProvidersExhausted {
            attempts: 3,
            last_error: "rate limited".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("All AI models failed"));
        assert!(message.contains("3 attempts"));
    }

    #[test]
    fn test_timeout_message_is_specific() {
        let err = TaskError::Timeout(300);
        assert_eq!(err.to_string(), "Analysis timed out after 300 seconds");
    }
}
