//! Ollama LLM client.
//!
//! Implements the [`LlmPort`] against a local Ollama instance. Structured
//! generation uses Ollama's JSON format mode with the caller's schema
//! appended to the prompt by the shell; this client never adds prompt
//! content of its own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::infrastructure::ports::{LlmError, LlmPort, LLM_TIMEOUT_MS};

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1:8b";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Ollama-backed [`LlmPort`].
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(LLM_TIMEOUT_MS))
            .build()
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    async fn generate(&self, prompt: &str, json_mode: bool) -> Result<String, LlmError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: json_mode.then_some("json"),
        };
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(LLM_TIMEOUT_MS)
                } else {
                    LlmError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(LlmError::RequestFailed(format!(
                "ollama returned {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        if body.response.trim().is_empty() {
            return Err(LlmError::InvalidResponse("empty response".into()));
        }
        Ok(body.response)
    }
}

#[async_trait]
impl LlmPort for OllamaClient {
    async fn generate_structured(&self, prompt: &str, _schema: &Value) -> Result<Value, LlmError> {
        let raw = self.generate(prompt, true).await?;
        serde_json::from_str(&raw).map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    async fn generate_narrative(&self, prompt: &str) -> Result<String, LlmError> {
        self.generate(prompt, false).await
    }
}
