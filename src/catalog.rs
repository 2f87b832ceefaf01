//! Language catalog
//!
//! The closed set of languages testforge understands, with everything the
//! other components need to know about each one: extensions, test naming,
//! default framework, build configuration files, and where generated tests
//! are placed. Adding a language means adding one variant here and one
//! toolchain under `execute::toolchains`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Supported languages, in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Java,
    CSharp,
    Go,
    Ruby,
    Php,
}

impl Language {
    pub const ALL: [Language; 7] = [
        Language::Python,
        Language::JavaScript,
        Language::Java,
        Language::CSharp,
        Language::Go,
        Language::Ruby,
        Language::Php,
    ];

    /// Stable identifier used in serialized output and configuration.
    pub fn id(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Java => "java",
            Language::CSharp => "csharp",
            Language::Go => "go",
            Language::Ruby => "ruby",
            Language::Php => "php",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::JavaScript => "JavaScript",
            Language::Java => "Java",
            Language::CSharp => "C#",
            Language::Go => "Go",
            Language::Ruby => "Ruby",
            Language::Php => "PHP",
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py"],
            Language::JavaScript => &["js", "ts", "jsx", "tsx"],
            Language::Java => &["java"],
            Language::CSharp => &["cs"],
            Language::Go => &["go"],
            Language::Ruby => &["rb"],
            Language::Php => &["php"],
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|lang| lang.extensions().contains(&ext.as_str()))
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Default test framework identifier.
    pub fn framework(&self) -> &'static str {
        match self {
            Language::Python => "pytest",
            Language::JavaScript => "jest",
            Language::Java => "junit5",
            Language::CSharp => "xunit",
            Language::Go => "go_testing",
            Language::Ruby => "rspec",
            Language::Php => "phpunit",
        }
    }

    /// Coverage tool paired with the default framework, if it is a separate tool.
    pub fn coverage_tool(&self) -> Option<&'static str> {
        match self {
            Language::Python => Some("pytest-cov"),
            Language::Java => Some("jacoco"),
            Language::CSharp => Some("coverlet"),
            Language::Ruby => Some("simplecov"),
            Language::JavaScript | Language::Go | Language::Php => None,
        }
    }

    /// Build/config files whose presence signals this language's build system.
    /// Entries starting with `*` are suffix globs.
    pub fn config_files(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &[
                "pytest.ini",
                "pyproject.toml",
                "setup.cfg",
                "setup.py",
                "requirements.txt",
            ],
            Language::JavaScript => &["package.json", "jest.config.js"],
            Language::Java => &["pom.xml", "build.gradle", "build.gradle.kts"],
            Language::CSharp => &["*.csproj", "*.sln"],
            Language::Go => &["go.mod", "go.sum"],
            Language::Ruby => &["Gemfile", "Rakefile"],
            Language::Php => &["composer.json", "phpunit.xml"],
        }
    }

    /// Whether a root-level file name matches one of the config patterns.
    pub fn matches_config(&self, file_name: &str) -> bool {
        self.config_files()
            .iter()
            .any(|pattern| match pattern.strip_prefix('*') {
                Some(suffix) => file_name.ends_with(suffix) && file_name.len() > suffix.len(),
                None => file_name == *pattern,
            })
    }

    /// Language-specific test-file naming rule.
    pub fn is_test_file(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return false;
        };
        if Language::from_path(path) != Some(*self) {
            return false;
        }

        match self {
            Language::Python => name.starts_with("test_") || stem.ends_with("_test"),
            Language::JavaScript => {
                stem.ends_with(".test")
                    || stem.ends_with(".spec")
                    || path
                        .components()
                        .any(|c| matches!(c, Component::Normal(p) if p == "__tests__"))
            }
            Language::Java => stem.ends_with("Test") || stem.ends_with("Tests"),
            Language::CSharp => stem.ends_with("Tests") || stem.ends_with("Test"),
            Language::Go => stem.ends_with("_test"),
            Language::Ruby => stem.ends_with("_spec") || stem.ends_with("_test"),
            Language::Php => stem.ends_with("Test"),
        }
    }

    /// Where the generated test for `source` (relative to the tree root) goes.
    pub fn test_file_path(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("module");
        let parent = source.parent().unwrap_or_else(|| Path::new(""));

        match self {
            Language::Python => PathBuf::from("tests").join(format!("test_{}.py", stem)),
            Language::JavaScript => {
                let ext = source.extension().and_then(|e| e.to_str()).unwrap_or("js");
                parent.join(format!("{}.test.{}", stem, ext))
            }
            Language::Java => parent.join("test").join(format!("{}Test.java", stem)),
            Language::CSharp => parent.join("Tests").join(format!("{}Tests.cs", stem)),
            Language::Go => parent.join(format!("{}_test.go", stem)),
            Language::Ruby => PathBuf::from("spec").join(format!("{}_spec.rb", stem)),
            Language::Php => {
                PathBuf::from("tests").join(format!("{}Test.php", capitalize(stem)))
            }
        }
    }

    /// Count test cases in generated test code.
    pub fn count_test_cases(&self, code: &str, path: &Path) -> usize {
        crate::generate::count::count_test_cases(*self, code, path)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" | "typescript" | "ts" => Ok(Language::JavaScript),
            "java" => Ok(Language::Java),
            "csharp" | "c#" | "cs" => Ok(Language::CSharp),
            "go" | "golang" => Ok(Language::Go),
            "ruby" | "rb" => Ok(Language::Ruby),
            "php" => Ok(Language::Php),
            _ => Err(format!("Unknown language: {}", s)),
        }
    }
}
