//! Ollama `/api/generate` reasoning adapter.

use crate::config::ReasonerConfig;
use crate::services::{ReasoningService, ServiceError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Reasoning service backed by a local Ollama server.
pub struct OllamaReasoner {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

impl OllamaReasoner {
    /// Create an adapter from the `[reasoner]` config section.
    pub fn new(config: &ReasonerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }

    fn build_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
            },
        })
    }

    fn map_transport_error(e: &reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            ServiceError::Timeout
        } else if e.is_decode() {
            ServiceError::InvalidResponse(e.to_string())
        } else {
            ServiceError::Unavailable(e.to_string())
        }
    }
}

#[async_trait]
impl ReasoningService for OllamaReasoner {
    async fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, ServiceError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(model = %self.model, prompt_chars = prompt.len(), "sending generate request");

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&self.build_body(prompt))
            .send()
            .await
            .map_err(|e| Self::map_transport_error(&e))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ServiceError::Unavailable(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(ServiceError::InvalidResponse(format!("HTTP {status}")));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Self::map_transport_error(&e))?;

        body.response
            .ok_or_else(|| ServiceError::InvalidResponse("missing `response` field".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn body_carries_model_prompt_and_temperature() {
        let reasoner = OllamaReasoner::new(&ReasonerConfig {
            base_url: "http://localhost:11434/".to_owned(),
            model: "llama3.2".to_owned(),
            temperature: 0.5,
        });
        assert_eq!(reasoner.base_url, "http://localhost:11434");

        let body = reasoner.build_body("what now?");
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["prompt"], "what now?");
        assert_eq!(body["stream"], false);
        assert!((body["options"]["temperature"].as_f64().unwrap() - 0.5).abs() < 1e-6);
    }
}
