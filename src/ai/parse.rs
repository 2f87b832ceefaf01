//! Payload extraction from model completions
//!
//! Models wrap answers in Markdown fences, add prose around JSON, and drift
//! from the requested schema. Everything here is tolerant: code extraction
//! falls back to the trimmed text and structural analysis falls back to a
//! neutral default.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Neutral complexity used when the model gives none.
pub const DEFAULT_COMPLEXITY: u8 = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub parameters: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub return_type: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub complexity: String,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub methods: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub properties: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub inheritance: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub dependencies: Vec<String>,
}

/// Functions, classes and dependencies the model found in one source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralAnalysis {
    #[serde(default)]
    pub functions: Vec<FunctionInfo>,
    #[serde(default)]
    pub classes: Vec<ClassInfo>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub dependencies: Vec<String>,
    #[serde(default = "default_complexity", deserialize_with = "lenient_score")]
    pub complexity_score: u8,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub test_scenarios: Vec<String>,
}

fn default_complexity() -> u8 {
    DEFAULT_COMPLEXITY
}

impl Default for StructuralAnalysis {
    fn default() -> Self {
        Self {
            functions: Vec::new(),
            classes: Vec::new(),
            dependencies: Vec::new(),
            complexity_score: DEFAULT_COMPLEXITY,
            test_scenarios: Vec::new(),
        }
    }
}

impl StructuralAnalysis {
    /// Every dependency mentioned anywhere in the analysis, deduplicated in order.
    pub fn all_dependencies(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let nested = self
            .functions
            .iter()
            .flat_map(|f| f.dependencies.iter())
            .chain(self.classes.iter().flat_map(|c| c.dependencies.iter()));
        for dep in self.dependencies.iter().chain(nested) {
            let dep = dep.trim();
            if !dep.is_empty() && !out.iter().any(|d| d == dep) {
                out.push(dep.to_string());
            }
        }
        out
    }
}

fn value_to_label(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Object(map) => match map.get("name").and_then(Value::as_str) {
            Some(name) => Some(name.to_string()),
            None => Some(Value::Object(map).to_string()),
        },
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(value.and_then(value_to_label).unwrap_or_default())
}

fn lenient_strings<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(match value {
        Some(Value::Array(items)) => items.into_iter().filter_map(value_to_label).collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    })
}

fn lenient_score<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    let score = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(score
        .filter(|s| s.is_finite())
        .map(|s| s.round().clamp(1.0, 10.0) as u8)
        .unwrap_or(DEFAULT_COMPLEXITY))
}

/// Strip markdown code fences from a response
pub fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = if trimmed.starts_with("```json") {
        trimmed.strip_prefix("```json").unwrap_or(trimmed)
    } else if trimmed.starts_with("```") {
        trimmed.strip_prefix("```").unwrap_or(trimmed)
    } else {
        trimmed
    };
    let clean = if clean.ends_with("```") {
        clean.strip_suffix("```").unwrap_or(clean)
    } else {
        clean
    };
    clean.trim()
}

/// Extract a JSON fragment between matching delimiters
fn extract_json_fragment(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if start <= end {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Try to fix common JSON issues from LLM responses
fn fix_json_issues(json: &str) -> String {
    let mut fixed = json.to_string();

    // Remove trailing commas before ] or }
    fixed = fixed.replace(",]", "]");
    fixed = fixed.replace(",}", "}");

    // Smart quotes to regular quotes
    fixed = fixed.replace(['\u{201C}', '\u{201D}'], "\"");
    fixed = fixed.replace(['\u{2018}', '\u{2019}'], "'");

    fixed
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Parse a structural analysis, degrading to the default on any mismatch.
pub fn parse_structural_analysis(response: &str) -> StructuralAnalysis {
    let clean = strip_markdown_fences(response);
    let Some(fragment) = extract_json_fragment(clean, '{', '}') else {
        tracing::debug!("Structural analysis response had no JSON object");
        return StructuralAnalysis::default();
    };

    if let Ok(parsed) = serde_json::from_str::<StructuralAnalysis>(fragment) {
        return parsed;
    }
    match serde_json::from_str::<StructuralAnalysis>(&fix_json_issues(fragment)) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::debug!(error = %err, "Structural analysis response did not match schema");
            StructuralAnalysis::default()
        }
    }
}

/// Pull the code out of a completion.
///
/// Returns the body of the first fenced block (the fence may carry a
/// language tag). Without a complete fence the trimmed text is returned.
pub fn extract_code(response: &str) -> String {
    let mut in_block = false;
    let mut saw_block = false;
    let mut lines: Vec<&str> = Vec::new();

    for line in response.lines() {
        if line.trim_start().starts_with("```") {
            if in_block {
                saw_block = true;
                break;
            }
            in_block = true;
            continue;
        }
        if in_block {
            lines.push(line);
        }
    }

    if saw_block || (in_block && !lines.is_empty()) {
        let mut code = lines.join("\n");
        code.push('\n');
        return code;
    }
    response.trim().to_string()
}
