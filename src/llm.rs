//! Answer generation with a hosted language model.
//!
//! Two backends are supported:
//! - **Gemini**: `POST {base_url}/{model}:generateContent`
//! - **Groq**: OpenAI-compatible `POST {base_url}/chat/completions`
//!
//! [`generate_answer`] never fails. A missing API key or a provider error
//! becomes the answer text, so the chat endpoint can always respond.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::config::{Config, LlmProviderConfig};

const INSTRUCTION: &str = "You are a helpful RAG assistant. Use the provided context to answer the user. If the answer is not in the context, say you are not certain.";

/// Assemble the single-turn prompt sent to the model.
///
/// ```rust
/// let prompt = docqa::llm::build_prompt("What is X?", "X is a letter.");
/// assert!(prompt.ends_with("Context:\nX is a letter.\n\nUser:\nWhat is X?"));
/// ```
pub fn build_prompt(query: &str, context: &str) -> String {
    format!("{}\n\nContext:\n{}\n\nUser:\n{}", INSTRUCTION, context, query)
}

/// A hosted model that turns a prompt into text.
#[async_trait]
pub trait AnswerBackend: Send + Sync {
    /// Display name used in error answers, e.g. `"Groq"`.
    fn name(&self) -> &'static str;

    async fn complete(&self, prompt: &str, model: &str) -> Result<String>;
}

/// Generate an answer for `query` grounded in `context`.
///
/// `provider` is matched case-insensitively; `"groq"` selects Groq and any
/// other value selects Gemini. `model` overrides the configured model.
pub async fn generate_answer(
    config: &Config,
    query: &str,
    context: &str,
    provider: &str,
    model: Option<&str>,
) -> String {
    let prompt = build_prompt(query, context);
    let provider = provider.trim().to_lowercase();

    let settings = if provider == "groq" {
        &config.llm.groq
    } else {
        &config.llm.gemini
    };
    let label = if provider == "groq" { "Groq" } else { "Gemini" };

    let api_key = match settings.resolve_api_key() {
        Some(key) => key,
        None => return format!("{} API key not configured.", label),
    };

    let backend: Result<Box<dyn AnswerBackend>> = if provider == "groq" {
        GroqBackend::new(config, settings, api_key).map(|b| Box::new(b) as Box<dyn AnswerBackend>)
    } else {
        GeminiBackend::new(config, settings, api_key).map(|b| Box::new(b) as Box<dyn AnswerBackend>)
    };

    let model = model
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(settings.model.as_str());

    let result = match backend {
        Ok(backend) => {
            tracing::debug!(backend = backend.name(), model, "generating answer");
            backend.complete(&prompt, model).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(provider = label, model, error = %e, "answer generation failed");
            format!("{} error: {}", label, e)
        }
    }
}

// ============ Gemini ============

pub struct GeminiBackend {
    client: Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl GeminiBackend {
    pub fn new(config: &Config, settings: &LlmProviderConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.llm.timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            api_key,
            max_retries: config.llm.max_retries,
        })
    }
}

#[async_trait]
impl AnswerBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    async fn complete(&self, prompt: &str, model: &str) -> Result<String> {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };
        let url = format!(
            "{}/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body);

        let response = send_with_retry(request, self.max_retries).await?;
        parse_gemini_response(&response)
    }
}

/// Concatenated text of the first candidate; empty when there is none.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    if let Some(err) = json.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        anyhow::bail!("{}", message);
    }

    let text = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.pointer("/content/parts"))
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default();

    Ok(text)
}

// ============ Groq ============

pub struct GroqBackend {
    client: Client,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
}

impl GroqBackend {
    pub fn new(config: &Config, settings: &LlmProviderConfig, api_key: String) -> Result<Self> {
        // Proxy variables from the environment are ignored for Groq
        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(config.llm.timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            api_key,
            temperature: config.llm.temperature,
            max_retries: config.llm.max_retries,
        })
    }
}

#[async_trait]
impl AnswerBackend for GroqBackend {
    fn name(&self) -> &'static str {
        "Groq"
    }

    async fn complete(&self, prompt: &str, model: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
        });

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);

        let response = send_with_retry(request, self.max_retries).await?;
        parse_groq_response(&response)
    }
}

fn parse_groq_response(json: &serde_json::Value) -> Result<String> {
    let choices = json
        .get("choices")
        .and_then(|c| c.as_array())
        .cloned()
        .unwrap_or_default();

    let first = match choices.first() {
        Some(choice) => choice,
        None => return Ok("No response choices returned from Groq.".to_string()),
    };

    let content = first
        .pointer("/message/content")
        .and_then(|c| c.as_str())
        .unwrap_or("");

    if content.is_empty() {
        Ok("No response generated.".to_string())
    } else {
        Ok(content.to_string())
    }
}

// ============ Transport ============

/// Send a prepared request, retrying rate limits, server errors, and
/// network failures with exponential backoff starting at 500ms.
async fn send_with_retry(
    request: reqwest::RequestBuilder,
    max_retries: u32,
) -> Result<serde_json::Value> {
    let mut last_error = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_millis(500 << (attempt - 1).min(5));
            tracing::info!(attempt, ?delay, "retrying LLM request");
            tokio::time::sleep(delay).await;
        }

        let req = request
            .try_clone()
            .ok_or_else(|| anyhow::anyhow!("request body can not be retried"))?;

        match req.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let body = response.text().await?;
                    tracing::debug!(%status, body_len = body.len(), "LLM response received");
                    return Ok(serde_json::from_str(&body)?);
                }

                let is_transient = status.is_server_error() || status.as_u16() == 429;
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "could not read body".to_string());

                if is_transient && attempt < max_retries {
                    tracing::warn!(%status, attempt, "transient LLM API error: {}", body);
                    last_error = Some(anyhow::anyhow!("API error ({}): {}", status, body));
                    continue;
                }
                anyhow::bail!("API error ({}): {}", status, body);
            }
            Err(e) if attempt < max_retries => {
                tracing::warn!(error = %e, attempt, "network error during LLM request");
                last_error = Some(anyhow::Error::from(e));
            }
            Err(e) => return Err(anyhow::Error::from(e)),
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("LLM request failed after {} attempts", max_retries + 1)))
}
