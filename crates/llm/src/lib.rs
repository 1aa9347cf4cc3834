use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    Local,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::Local => "local",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "ollama" => Some(Provider::Ollama),
            "local" => Some(Provider::Local),
            _ => None,
        }
    }
}

/// One generation call: a textual prompt plus an optional image payload
/// (raw encoded bytes, e.g. a JPEG, base64-wrapped on the wire).
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    pub image: Option<Vec<u8>>,
}

/// Bounded exponential backoff: attempt `n` failing sleeps
/// `base_delay * 2^(n-1)` before the next try.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1500),
        }
    }
}

pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    policy.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
}

/// Runs `call` until it succeeds or `policy.max_attempts` is exhausted.
///
/// Every failed attempt short of the last is logged with its computed
/// delay and retried; the final failure is surfaced to the caller.
pub fn invoke_with_retry<T>(
    policy: &RetryPolicy,
    mut call: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match call() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_attempts {
                    return Err(err).with_context(|| {
                        format!("model invocation failed after {attempt} attempts")
                    });
                }
                let delay = backoff_delay(policy, attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "model call failed, retrying"
                );
                thread::sleep(delay);
            }
        }
    }
}

/// Client for the generation model, with transient failures retried under
/// the configured policy.
#[derive(Clone)]
pub struct GenerationClient {
    http: Client,
    provider: Provider,
    model: String,
    base_url: String,
    policy: RetryPolicy,
}

impl GenerationClient {
    pub fn new(provider: Provider, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            provider,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn generate(&self, request: &GenerationRequest) -> Result<String> {
        invoke_with_retry(&self.policy, || self.dispatch(request))
    }

    fn dispatch(&self, request: &GenerationRequest) -> Result<String> {
        match self.provider {
            Provider::Ollama => self.chat_ollama(request),
            Provider::Local => Ok(synthesize_local_response(request)),
        }
    }

    fn chat_ollama(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let mut message = json!({
            "role": "user",
            "content": request.prompt,
        });
        if let Some(image) = &request.image {
            let encoded = base64::engine::general_purpose::STANDARD.encode(image);
            message["images"] = json!([encoded]);
        }
        let payload = json!({
            "model": self.model,
            "stream": false,
            "messages": [message],
        });
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .with_context(|| format!("ollama request to {url} failed"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("ollama returned error (status {status}): {body}"));
        }
        let parsed: OllamaChatResponse = response
            .json()
            .context("failed to decode ollama response")?;
        Ok(parsed.message.content)
    }
}

/// Deterministic offline response used for dry runs and tests: a fenced
/// JSON document in the shape the analysis pipeline expects.
fn synthesize_local_response(request: &GenerationRequest) -> String {
    let snippet = summarize_text(&request.prompt, 40);
    let body = json!({
        "riassunto": snippet,
        "tags": ["documento"],
    });
    format!("```json\n{body}\n```")
}

fn summarize_text(text: &str, max_words: usize) -> String {
    let cleaned = text
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<&str>>()
        .join(" ");
    cleaned
        .split_whitespace()
        .take(max_words)
        .collect::<Vec<&str>>()
        .join(" ")
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatMessage,
}

#[derive(Deserialize)]
struct OllamaChatMessage {
    content: String,
}
