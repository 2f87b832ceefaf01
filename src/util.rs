use std::fs;
use std::path::{Component, Path, PathBuf};

/// Cap `s` at `max` characters, marking the cut with `...` when there is
/// room for it.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    match max {
        0..=3 => s.chars().take(max).collect(),
        _ => s.chars().take(max - 3).chain("...".chars()).collect(),
    }
}

/// Keep the last `max_chars` characters of `text` (Unicode-safe).
pub fn tail_chars(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    text.chars().skip(total - max_chars).collect::<String>()
}

/// Render a path relative to `root` with forward slashes.
pub fn relative_slash_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// A location inside a working tree, as both an absolute path and the
/// slash-separated path relative to the tree root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreePath {
    pub absolute: PathBuf,
    pub relative: String,
}

/// Place `relative` under `root` without leaving the tree.
///
/// The target may not exist yet. Absolute paths, `..` components and
/// symlinked parents that point outside the tree are rejected.
pub fn resolve_in_tree(root: &Path, relative: &Path) -> Result<TreePath, String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(format!("{} climbs out of the tree", relative.display()))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("{} is not a relative path", relative.display()))
            }
        }
    }
    if parts.is_empty() {
        return Err("Empty path".to_string());
    }

    let root = root
        .canonicalize()
        .map_err(|e| format!("Working tree {} is not accessible: {}", root.display(), e))?;
    let absolute = parts.iter().fold(root.clone(), |acc, part| acc.join(part));

    // Walk up to the deepest existing ancestor; symlinks resolve there.
    let anchor = absolute
        .ancestors()
        .skip(1)
        .find(|p| p.exists())
        .unwrap_or(root.as_path())
        .canonicalize()
        .map_err(|e| format!("Failed to resolve {}: {}", relative.display(), e))?;
    if !anchor.starts_with(&root) {
        return Err(format!("{} resolves outside the tree", relative.display()));
    }

    Ok(TreePath {
        absolute,
        relative: parts.join("/"),
    })
}

/// Replace `path` with `content` via a temp file in the same directory.
pub fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));
    fs::write(&tmp, content)?;

    #[cfg(windows)]
    {
        if path.exists() {
            let _ = fs::remove_file(path);
        }
    }

    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_unicode_safe() {
        let input = "ééééé";
        assert_eq!(truncate(input, 4), "é...");
    }

    #[test]
    fn test_truncate_small_max() {
        let input = "こんにちは";
        assert_eq!(truncate(input, 3), "こんに");
        assert_eq!(truncate(input, 0), "");
    }

    #[test]
    fn test_tail_chars_keeps_end() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("abc", 0), "");
    }

    #[test]
    fn test_relative_slash_path() {
        let root = Path::new("/work/repo");
        let path = Path::new("/work/repo/src/pkg/mod.py");
        assert_eq!(relative_slash_path(root, path), "src/pkg/mod.py");
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(66.666_666), 66.67);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn test_resolve_in_tree_allows_new_dirs() {
        let root = tempfile::tempdir().unwrap();
        let placed = resolve_in_tree(root.path(), Path::new("./pkg/Tests/CalcTests.cs")).unwrap();
        assert_eq!(placed.relative, "pkg/Tests/CalcTests.cs");
        assert!(placed.absolute.ends_with("pkg/Tests/CalcTests.cs"));
        assert!(!placed.absolute.exists());
    }

    #[test]
    fn test_resolve_in_tree_rejects_escapes() {
        let root = tempfile::tempdir().unwrap();
        assert!(resolve_in_tree(root.path(), Path::new("../escape.py")).is_err());
        assert!(resolve_in_tree(root.path(), Path::new("/etc/passwd")).is_err());
        assert!(resolve_in_tree(root.path(), Path::new("")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_in_tree_rejects_symlinked_parent() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.path().join("link")).unwrap();
        assert!(resolve_in_tree(root.path(), Path::new("link/test_x.py")).is_err());
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.json");
        write_atomic(&path, "one").unwrap();
        write_atomic(&path, "two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
