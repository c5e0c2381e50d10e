//! Reasoning collaborator client.
//!
//! Every prompt in the pipeline goes through [`ReasoningClient`]. The
//! production implementation talks to Ollama's chat API; tests swap in a
//! scripted double.

use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Prompt in, free-form text out. Responses are never trusted.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Run one collaborator call bounded by `timeout`.
///
/// A timeout is reported as [`LlmError::Timeout`] so callers can treat it
/// like any other parse or resolution failure.
pub async fn ask(
    client: &dyn ReasoningClient,
    prompt: &str,
    timeout: Duration,
) -> Result<String, LlmError> {
    match tokio::time::timeout(timeout, client.complete(prompt)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Collaborator call exceeded {}s", timeout.as_secs());
            Err(LlmError::Timeout(timeout.as_secs()))
        }
    }
}

/// Configuration for the Ollama-backed client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub ollama_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
    pub retries: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "llama3.2:latest".to_string(),
            temperature: 0.0,
            timeout_seconds: 120,
            retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Reasoning collaborator backed by a local or remote Ollama server.
pub struct OllamaClient {
    config: LlmConfig,
    http_client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    async fn send_once(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.config.ollama_url.trim_end_matches('/'));

        let request = OllamaChatRequest {
            model: self.config.model_name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.config.timeout_seconds)
                } else if e.is_connect() {
                    LlmError::Connect(self.config.ollama_url.clone())
                } else {
                    LlmError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        let content = chat_response.message.content;
        if content.trim().is_empty() {
            return Err(LlmError::Empty);
        }
        Ok(content)
    }
}

#[async_trait]
impl ReasoningClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            debug!("Sending prompt ({} chars), attempt {}", prompt.len(), attempt + 1);
            match self.send_once(prompt).await {
                Ok(content) => return Ok(content),
                Err(e) if is_retryable(&e) && attempt < self.config.retries => {
                    warn!("Model call failed ({}), retrying", e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Failures worth another attempt. A timeout has already spent the whole
/// per-call budget that [`ask`] allows, so it is final.
fn is_retryable(error: &LlmError) -> bool {
    matches!(error, LlmError::Connect(_) | LlmError::Request(_))
}

const SYSTEM_PROMPT: &str = r#"You are AIRA, an AI research assistant.
Follow the output format requested in each message exactly.
When JSON is requested, output only JSON."#;

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowClient;

    #[async_trait]
    impl ReasoningClient for SlowClient {
        async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    #[tokio::test]
    async fn test_ask_converts_timeout() {
        let result = ask(&SlowClient, "hello", Duration::from_millis(20)).await;
        assert!(matches!(result, Err(LlmError::Timeout(_))));
    }

    #[test]
    fn test_timeouts_are_not_retried() {
        assert!(!is_retryable(&LlmError::Timeout(120)));
        assert!(!is_retryable(&LlmError::Empty));
        assert!(is_retryable(&LlmError::Connect("http://localhost:11434".to_string())));
        assert!(is_retryable(&LlmError::Request("reset".to_string())));
    }

    #[test]
    fn test_llm_config_default() {
        let config = LlmConfig::default();
        assert_eq!(config.model_name, "llama3.2:latest");
        assert!(config.ollama_url.starts_with("http://"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let client = OllamaClient::new(LlmConfig {
            ollama_url: "http://127.0.0.1:9".to_string(),
            timeout_seconds: 2,
            retries: 0,
            ..LlmConfig::default()
        })
        .unwrap();
        assert!(client.complete("ping").await.is_err());
    }
}
