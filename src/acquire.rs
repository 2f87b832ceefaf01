//! Working-tree acquisition
//!
//! Turns a task's source (a local directory or a git URL) into a directory
//! owned exclusively by that task. Remote sources are shallow-cloned with
//! the `git` CLI; local ones are copied without vendor or hidden
//! directories. Cleaning the workspace up afterwards is the caller's job.

use crate::analysis::scanner::is_ignored_dir_name;
use crate::error::AcquireError;
use crate::execute::runner::{run_command, CommandSpec};
use crate::execute::Budget;
use crate::util::tail_chars;
use futures::future::BoxFuture;
use git2::Repository;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use uuid::Uuid;
use walkdir::WalkDir;

const REMOTE_SCHEMES: &[&str] = &["http", "https", "ssh", "git"];

/// Where a task's tree comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Local(PathBuf),
    Remote(String),
}

/// A tree ready for analysis
#[derive(Debug, Clone)]
pub struct AcquiredTree {
    pub root: PathBuf,
    /// HEAD commit of the source, when it is a git repository
    pub revision: Option<String>,
}

/// Produces working trees for tasks.
pub trait TreeSource: Send + Sync {
    /// Cheap check before the task starts running.
    fn validate(&self, source: &str) -> Result<(), AcquireError>;

    fn acquire<'a>(
        &'a self,
        source: &'a str,
        task_id: Uuid,
    ) -> BoxFuture<'a, Result<AcquiredTree, AcquireError>>;
}

fn invalid(source: &str, reason: impl Into<String>) -> AcquireError {
    AcquireError::InvalidSource {
        source_ref: source.to_string(),
        reason: reason.into(),
    }
}

/// Classify and validate a source string.
pub fn parse_source(source: &str) -> Result<SourceRef, AcquireError> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(invalid(source, "source is empty"));
    }

    if trimmed.contains("://") {
        let url = Url::parse(trimmed).map_err(|e| invalid(source, e.to_string()))?;
        if !REMOTE_SCHEMES.contains(&url.scheme()) {
            return Err(invalid(
                source,
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if url.host_str().map(str::is_empty).unwrap_or(true) {
            return Err(invalid(source, "URL has no host"));
        }
        return Ok(SourceRef::Remote(trimmed.to_string()));
    }

    // scp-like syntax: git@github.com:owner/repo.git
    if let Some((user_host, path)) = trimmed.split_once(':') {
        if user_host.contains('@') && !user_host.contains('/') && !path.is_empty() {
            return Ok(SourceRef::Remote(trimmed.to_string()));
        }
    }

    let path = PathBuf::from(trimmed);
    if !path.is_dir() {
        return Err(invalid(source, "not a URL and not an existing directory"));
    }
    Ok(SourceRef::Local(path))
}

/// Short HEAD commit id of the repository at `path`, if any.
pub fn head_revision(path: &Path) -> Option<String> {
    let repo = Repository::open(path).ok()?;
    let head = repo.head().ok()?;
    let commit = head.peel_to_commit().ok()?;
    let id = commit.id().to_string();
    Some(id.chars().take(12).collect())
}

/// Copy `src` into `dest`, skipping vendor and hidden directories.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<usize, AcquireError> {
    let copy_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| AcquireError::Copy { path, source }
    };
    fs::create_dir_all(dest).map_err(copy_err(dest))?;

    let mut copied = 0;
    for entry in WalkDir::new(src)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !e.file_name().to_str().map(is_ignored_dir_name).unwrap_or(false)
        })
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "Skipping unreadable entry while copying");
                continue;
            }
        };
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(copy_err(&target))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target).map_err(copy_err(entry.path()))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Local copies and git clones under one workspace directory
pub struct WorkspaceSource {
    workspace_dir: PathBuf,
    clone_timeout: Duration,
}

impl WorkspaceSource {
    pub fn new(workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
            clone_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_clone_timeout(mut self, timeout: Duration) -> Self {
        self.clone_timeout = timeout;
        self
    }

    fn prepare_dest(&self, task_id: Uuid) -> Result<PathBuf, AcquireError> {
        let dest = self.workspace_dir.join(task_id.to_string());
        if dest.exists() {
            fs::remove_dir_all(&dest).map_err(|source| AcquireError::Copy {
                path: dest.clone(),
                source,
            })?;
        }
        fs::create_dir_all(&self.workspace_dir).map_err(|source| AcquireError::Copy {
            path: self.workspace_dir.clone(),
            source,
        })?;
        Ok(dest)
    }

    async fn clone_remote(&self, url: &str, dest: &Path) -> Result<AcquiredTree, AcquireError> {
        tracing::info!(url = %url, dest = %dest.display(), "Cloning repository");
        let dest_str = dest.to_string_lossy().into_owned();
        let spec = CommandSpec::new("git clone", &self.workspace_dir, "git")
            .args(&["clone", "--depth", "1", "--quiet", url, dest_str.as_str()])
            .timeout(self.clone_timeout)
            .with_env_overrides(&[("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())]);
        let outcome = run_command(&spec, &Budget::unbounded()).await;

        if !outcome.success {
            let message = outcome
                .execution_failure()
                .unwrap_or_else(|| tail_chars(outcome.stderr.trim(), 500));
            return Err(AcquireError::Clone {
                url: url.to_string(),
                message,
            });
        }
        Ok(AcquiredTree {
            root: dest.to_path_buf(),
            revision: head_revision(dest),
        })
    }

    async fn copy_local(&self, src: &Path, dest: PathBuf) -> Result<AcquiredTree, AcquireError> {
        tracing::info!(src = %src.display(), dest = %dest.display(), "Copying local tree");
        let revision = head_revision(src);
        let src = src.to_path_buf();
        let target = dest.clone();
        let copied = tokio::task::spawn_blocking(move || copy_tree(&src, &target))
            .await
            .map_err(|e| AcquireError::Join(e.to_string()))??;
        tracing::debug!(files = copied, "Copied local tree");
        Ok(AcquiredTree {
            root: dest,
            revision,
        })
    }
}

impl TreeSource for WorkspaceSource {
    fn validate(&self, source: &str) -> Result<(), AcquireError> {
        parse_source(source).map(|_| ())
    }

    fn acquire<'a>(
        &'a self,
        source: &'a str,
        task_id: Uuid,
    ) -> BoxFuture<'a, Result<AcquiredTree, AcquireError>> {
        Box::pin(async move {
            let source_ref = parse_source(source)?;
            let dest = self.prepare_dest(task_id)?;
            match source_ref {
                SourceRef::Remote(url) => self.clone_remote(&url, &dest).await,
                SourceRef::Local(path) => self.copy_local(&path, dest).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_urls() {
        assert_eq!(
            parse_source("https://github.com/acme/calc.git").unwrap(),
            SourceRef::Remote("https://github.com/acme/calc.git".into())
        );
        assert_eq!(
            parse_source("git@github.com:acme/calc.git").unwrap(),
            SourceRef::Remote("git@github.com:acme/calc.git".into())
        );
        assert!(parse_source("ftp://example.com/repo").is_err());
        assert!(parse_source("https://").is_err());
        assert!(parse_source("   ").is_err());
    }

    #[test]
    fn test_parse_source_local() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().into_owned();
        assert_eq!(parse_source(&path).unwrap(), SourceRef::Local(dir.path().to_path_buf()));

        let err = parse_source("/definitely/not/here/42").unwrap_err();
        assert!(err.to_string().contains("not an existing directory"));
    }

    #[test]
    fn test_copy_tree_skips_vendor_and_hidden_dirs() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("src")).unwrap();
        fs::create_dir_all(src.path().join("node_modules/pkg")).unwrap();
        fs::create_dir_all(src.path().join(".git")).unwrap();
        fs::write(src.path().join("src/app.py"), "x = 1\n").unwrap();
        fs::write(src.path().join(".env.example"), "A=1\n").unwrap();
        fs::write(src.path().join("node_modules/pkg/index.js"), "").unwrap();
        fs::write(src.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();

        let out = dest.path().join("tree");
        let copied = copy_tree(src.path(), &out).unwrap();
        assert_eq!(copied, 2);
        assert!(out.join("src/app.py").is_file());
        assert!(out.join(".env.example").is_file());
        assert!(!out.join("node_modules").exists());
        assert!(!out.join(".git").exists());
    }

    #[test]
    fn test_head_revision_of_plain_dir_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(head_revision(dir.path()), None);
    }

    #[tokio::test]
    async fn test_acquire_local_into_task_dir() {
        let src = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        fs::write(src.path().join("main.go"), "package main\n").unwrap();

        let source = WorkspaceSource::new(workspace.path());
        let id = Uuid::new_v4();
        let src_str = src.path().to_string_lossy().into_owned();
        source.validate(&src_str).unwrap();
        let tree = source.acquire(&src_str, id).await.unwrap();

        assert_eq!(tree.root, workspace.path().join(id.to_string()));
        assert!(tree.root.join("main.go").is_file());
        assert!(tree.revision.is_none());
    }
}
