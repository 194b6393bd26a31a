//! Text-generation service client
//!
//! Anthropic-style messages API. Error kinds are classified from status
//! codes so the retry helper only retries transport-class failures; a
//! response stopped for hitting the token ceiling is surfaced via
//! `stop_reason` and treated as a hard failure by the orchestrator.

use async_trait::async_trait;
use briefcast_common::config::TextGenConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Text-generation client errors
#[derive(Debug, Error)]
pub enum TextGenError {
    #[error("rate limited by text generation service")]
    RateLimited,

    #[error("text generation server error {0}: {1}")]
    Server(u16, String),

    #[error("text generation request failed: {0}")]
    Transport(String),

    #[error("text generation rejected request ({0}): {1}")]
    Rejected(u16, String),

    #[error("text generation returned an unusable response: {0}")]
    InvalidResponse(String),
}

impl TextGenError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TextGenError::RateLimited | TextGenError::Server(_, _) | TextGenError::Transport(_)
        )
    }

    pub(crate) fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => TextGenError::RateLimited,
            500..=599 => TextGenError::Server(status, body),
            _ => TextGenError::Rejected(status, body),
        }
    }
}

/// One generation request
#[derive(Debug, Clone)]
pub struct TextGenRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    /// Use the small/fast model (topic classification) instead of the
    /// synthesis model
    pub fast: bool,
}

/// Raw generation result with the provider's stop reason
#[derive(Debug, Clone)]
pub struct GeneratedText {
    pub text: String,
    pub stop_reason: Option<String>,
}

impl GeneratedText {
    /// The provider stopped because the response hit its token ceiling
    pub fn truncated_by_length(&self) -> bool {
        matches!(self.stop_reason.as_deref(), Some("max_tokens") | Some("length"))
    }
}

/// Seam for test doubles
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &TextGenRequest) -> Result<GeneratedText, TextGenError>;
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiContentBlock>,
    stop_reason: Option<String>,
}

/// HTTP client for the messages API
#[derive(Debug, Clone)]
pub struct AnthropicTextGen {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    fast_model: String,
}

impl AnthropicTextGen {
    pub fn new(config: &TextGenConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            fast_model: config.fast_model.clone(),
        }
    }
}

#[async_trait]
impl TextGenerator for AnthropicTextGen {
    async fn generate(&self, request: &TextGenRequest) -> Result<GeneratedText, TextGenError> {
        let model = if request.fast {
            self.fast_model.clone()
        } else {
            self.model.clone()
        };

        let body = ApiRequest {
            model,
            max_tokens: request.max_tokens,
            system: request.system.clone(),
            messages: vec![ApiMessage {
                role: "user",
                content: request.prompt.clone(),
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| TextGenError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TextGenError::from_status(status.as_u16(), body));
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| TextGenError::InvalidResponse(e.to_string()))?;

        let text: String = parsed
            .content
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(TextGenError::InvalidResponse(
                "response contained no text content".to_string(),
            ));
        }

        Ok(GeneratedText {
            text,
            stop_reason: parsed.stop_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(TextGenError::from_status(429, String::new()).is_retryable());
        assert!(TextGenError::from_status(503, String::new()).is_retryable());
        assert!(!TextGenError::from_status(400, String::new()).is_retryable());
        assert!(!TextGenError::from_status(401, String::new()).is_retryable());
    }

    #[test]
    fn length_stop_reason_detected() {
        let out = GeneratedText {
            text: "partial".to_string(),
            stop_reason: Some("max_tokens".to_string()),
        };
        assert!(out.truncated_by_length());

        let out = GeneratedText {
            text: "full".to_string(),
            stop_reason: Some("end_turn".to_string()),
        };
        assert!(!out.truncated_by_length());
    }
}
