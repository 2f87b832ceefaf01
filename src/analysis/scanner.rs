use crate::util::relative_slash_path;
use std::path::Path;
use walkdir::WalkDir;

/// Directories that never contain first-party sources.
pub const VENDOR_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    "vendor",
    "venv",
    "target",
    "dist",
    "bower_components",
    "site-packages",
];

/// Walks a working tree, skipping hidden entries and vendor directories
pub struct RepoScanner {
    ignore_dirs: Vec<String>,
}

impl RepoScanner {
    pub fn new() -> Self {
        Self {
            ignore_dirs: VENDOR_DIRS.iter().map(|d| d.to_string()).collect(),
        }
    }

    /// Relative (`/`-separated) paths of every visible file, in sorted order.
    pub fn visible_files(&self, root: &Path) -> Vec<String> {
        let mut files = Vec::new();

        for entry in WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.should_ignore(e))
        {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping unreadable entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            files.push(relative_slash_path(root, entry.path()));
        }

        files
    }

    fn should_ignore(&self, entry: &walkdir::DirEntry) -> bool {
        entry
            .file_name()
            .to_str()
            .map(|name| {
                name.starts_with('.')
                    || (entry.file_type().is_dir() && self.ignore_dirs.iter().any(|d| d == name))
            })
            .unwrap_or(false)
    }
}

impl Default for RepoScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a directory name should be skipped when copying or walking trees.
pub fn is_ignored_dir_name(name: &str) -> bool {
    name.starts_with('.') || VENDOR_DIRS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_skips_hidden_and_vendor_entries() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("src")).unwrap();
        fs::create_dir_all(root.path().join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.path().join(".git")).unwrap();
        fs::write(root.path().join("src/app.py"), "x = 1\n").unwrap();
        fs::write(root.path().join("src/.hidden.py"), "x = 1\n").unwrap();
        fs::write(root.path().join("node_modules/pkg/index.js"), "").unwrap();
        fs::write(root.path().join(".git/config"), "").unwrap();

        let files = RepoScanner::new().visible_files(root.path());
        assert_eq!(files, vec!["src/app.py".to_string()]);
    }

    #[test]
    fn test_hidden_root_is_still_walked() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join(".checkout");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("main.go"), "package main\n").unwrap();

        let files = RepoScanner::new().visible_files(&root);
        assert_eq!(files, vec!["main.go".to_string()]);
    }
}
