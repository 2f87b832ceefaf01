use serde::Deserialize;

/// Round-robin cursor over the configured models.
///
/// Each request starts at the cursor and walks the list at most once. The
/// cursor always moves past the model used by the last attempt, so a model
/// that just failed (or just served) is not the first one tried next time.
#[derive(Debug, Clone)]
pub struct ModelRotation {
    models: Vec<String>,
    cursor: usize,
}

impl ModelRotation {
    pub fn new(models: Vec<String>) -> Self {
        Self { models, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn model(&self, idx: usize) -> Option<&str> {
        self.models.get(idx).map(String::as_str)
    }

    /// Indices in the order one request should try them.
    pub fn attempt_order(&self) -> Vec<usize> {
        let n = self.models.len();
        (0..n).map(|offset| (self.cursor + offset) % n).collect()
    }

    /// Move the cursor past `idx`.
    pub fn advance_past(&mut self, idx: usize) {
        if !self.models.is_empty() {
            self.cursor = (idx + 1) % self.models.len();
        }
    }
}

/// API usage information from OpenRouter
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
    #[serde(default, alias = "total_cost")]
    pub cost: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotation() -> ModelRotation {
        ModelRotation::new(vec!["a".into(), "b".into(), "c".into()])
    }

    #[test]
    fn test_attempt_order_starts_at_cursor() {
        let mut r = rotation();
        assert_eq!(r.attempt_order(), vec![0, 1, 2]);
        r.advance_past(0);
        assert_eq!(r.attempt_order(), vec![1, 2, 0]);
    }

    #[test]
    fn test_advance_wraps() {
        let mut r = rotation();
        r.advance_past(2);
        assert_eq!(r.cursor(), 0);
    }

    #[test]
    fn test_empty_rotation() {
        let mut r = ModelRotation::new(Vec::new());
        assert!(r.is_empty());
        assert!(r.attempt_order().is_empty());
        r.advance_past(3);
        assert_eq!(r.cursor(), 0);
    }

    #[test]
    fn test_usage_accepts_total_cost_alias() {
        let usage: Usage = serde_json::from_str(r#"{"prompt_tokens": 3, "total_cost": 0.5}"#).unwrap();
        assert_eq!(usage.prompt_tokens, 3);
        assert_eq!(usage.cost, Some(0.5));
    }
}
