use super::models::{ModelRotation, Usage};
use super::parse::{extract_code, parse_structural_analysis, StructuralAnalysis};
use super::prompts;
use crate::catalog::Language;
use crate::config::AiConfig;
use crate::error::AiError;
use crate::util::truncate;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One request as sent to a single model
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Result of one bounded attempt against one model
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(String),
    RateLimited(String),
    Failed(String),
}

/// Sends a completion request to a provider.
///
/// Implementations map every failure into an [`AttemptOutcome`]; the
/// fallback policy lives in [`GenerationClient`].
pub trait CompletionTransport: Send + Sync {
    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> BoxFuture<'a, AttemptOutcome>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    content: Option<String>,
}

/// OpenRouter chat-completions transport
pub struct OpenRouterTransport {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl OpenRouterTransport {
    pub fn new(config: &AiConfig, api_key: String) -> Result<Self, AiError> {
        if api_key.trim().is_empty() {
            return Err(AiError::MissingApiKey);
        }
        // The per-attempt timeout is enforced by the client; this is a backstop.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.attempt_timeout_secs.saturating_add(5)))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Ok(Self {
            http,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
        })
    }

    async fn send(&self, request: &CompletionRequest) -> AttemptOutcome {
        let body = ChatRequest {
            model: &request.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &request.system,
                },
                Message {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };

        let response = match self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", "https://github.com/testforge/testforge")
            .header("X-Title", "testforge")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return AttemptOutcome::Failed(format!("Network error: {}", err)),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => return AttemptOutcome::Failed(format!("Failed to read response: {}", err)),
        };

        if status.as_u16() == 429 {
            return AttemptOutcome::RateLimited(format!(
                "Rate limited: {}",
                truncate(&text, 200)
            ));
        }
        if !status.is_success() {
            return AttemptOutcome::Failed(format!(
                "API error {}: {}",
                status,
                truncate(&text, 200)
            ));
        }

        match serde_json::from_str::<ChatResponse>(&text) {
            Ok(parsed) => {
                if let Some(usage) = &parsed.usage {
                    tracing::debug!(
                        model = %request.model,
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        "Completion usage"
                    );
                }
                match parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                {
                    Some(content) => AttemptOutcome::Success(content),
                    None => AttemptOutcome::Failed("Response contained no completion".to_string()),
                }
            }
            Err(err) => AttemptOutcome::Failed(format!(
                "Failed to parse response: {} ({})",
                err,
                truncate(&text, 200)
            )),
        }
    }
}

impl CompletionTransport for OpenRouterTransport {
    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> BoxFuture<'a, AttemptOutcome> {
        Box::pin(self.send(request))
    }
}

/// Model-fallback client. One instance per task; the rotation cursor is
/// not shared across tasks.
pub struct GenerationClient {
    transport: Arc<dyn CompletionTransport>,
    rotation: Mutex<ModelRotation>,
    max_tokens: u32,
    temperature: f32,
    attempt_timeout: Duration,
    cooldown: Duration,
}

impl GenerationClient {
    pub fn new(transport: Arc<dyn CompletionTransport>, config: &AiConfig) -> Result<Self, AiError> {
        let models: Vec<String> = config
            .models
            .iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if models.is_empty() {
            return Err(AiError::NoModels);
        }
        Ok(Self {
            transport,
            rotation: Mutex::new(ModelRotation::new(models)),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
            cooldown: Duration::from_secs(config.rate_limit_cooldown_secs),
        })
    }

    /// Override the per-attempt timeout and the rate-limit cooldown.
    pub fn with_timings(mut self, attempt_timeout: Duration, cooldown: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self.cooldown = cooldown;
        self
    }

    /// Index of the model the next request will try first.
    pub fn cursor(&self) -> usize {
        self.rotation().cursor()
    }

    fn rotation(&self) -> std::sync::MutexGuard<'_, ModelRotation> {
        self.rotation.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Send one system/user pair, walking the model list once.
    pub async fn request(&self, system: &str, user: &str) -> Result<String, AiError> {
        let plan: Vec<(usize, String)> = {
            let rotation = self.rotation();
            rotation
                .attempt_order()
                .into_iter()
                .filter_map(|idx| rotation.model(idx).map(|m| (idx, m.to_string())))
                .collect()
        };
        let attempts = plan.len();
        let mut last_error = String::from("no attempt made");

        for (n, (idx, model)) in plan.into_iter().enumerate() {
            let request = CompletionRequest {
                model: model.clone(),
                system: system.to_string(),
                user: user.to_string(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            };

            let outcome =
                match tokio::time::timeout(self.attempt_timeout, self.transport.complete(&request))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => AttemptOutcome::Failed(format!(
                        "Timed out after {}s",
                        self.attempt_timeout.as_secs()
                    )),
                };

            self.rotation().advance_past(idx);

            match outcome {
                AttemptOutcome::Success(content) if !content.trim().is_empty() => {
                    tracing::debug!(model = %model, "Model request succeeded");
                    return Ok(content);
                }
                AttemptOutcome::Success(_) => {
                    tracing::warn!(model = %model, "Model returned an empty completion");
                    last_error = format!("{}: empty completion", model);
                }
                AttemptOutcome::RateLimited(message) => {
                    tracing::warn!(model = %model, "Model rate limited, moving to next model");
                    last_error = format!("{}: {}", model, message);
                    if n + 1 < attempts && !self.cooldown.is_zero() {
                        tokio::time::sleep(self.cooldown).await;
                    }
                }
                AttemptOutcome::Failed(message) => {
                    tracing::warn!(model = %model, error = %message, "Model request failed");
                    last_error = format!("{}: {}", model, message);
                }
            }
        }

        Err(AiError::ProvidersExhausted {
            attempts,
            last_error,
        })
    }

    /// Ask the model for the functions, classes and dependencies of a file.
    pub async fn analyze_structure(
        &self,
        code: &str,
        language: Language,
        path: &str,
    ) -> Result<StructuralAnalysis, AiError> {
        let prompt = prompts::structure_prompt(code, language, path);
        let response = self.request(prompts::SYSTEM_PROMPT, &prompt).await?;
        Ok(parse_structural_analysis(&response))
    }

    /// Generate a complete test file for one source file.
    pub async fn generate_tests(
        &self,
        code: &str,
        language: Language,
        framework: &str,
        path: &str,
        dependencies: &[String],
    ) -> Result<String, AiError> {
        let prompt = prompts::generation_prompt(code, language, framework, path, dependencies);
        let response = self.request(prompts::SYSTEM_PROMPT, &prompt).await?;
        Ok(extract_code(&response))
    }

    /// Generate mock definitions for the given dependencies.
    pub async fn generate_mocks(
        &self,
        code: &str,
        language: Language,
        dependencies: &[String],
    ) -> Result<Option<String>, AiError> {
        if dependencies.is_empty() {
            return Ok(None);
        }
        let prompt = prompts::mock_prompt(code, language, dependencies);
        let response = self.request(prompts::SYSTEM_PROMPT, &prompt).await?;
        Ok(Some(extract_code(&response)))
    }
}
