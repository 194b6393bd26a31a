//! Storage publisher
//!
//! Uploads the final episode audio to object storage under a deterministic
//! key and returns the public URL. Unlike mixing, publish failure is fatal
//! to generation: it propagates to the orchestrator's failure path.

use async_trait::async_trait;
use briefcast_common::config::StorageConfig;
use briefcast_common::retry::{retry_with_backoff, RetryPolicy};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Upload errors
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("rate limited by object storage")]
    RateLimited,

    #[error("object storage error {0}: {1}")]
    Server(u16, String),

    #[error("upload request failed: {0}")]
    Transport(String),

    #[error("object storage rejected upload ({0}): {1}")]
    Rejected(u16, String),
}

impl PublishError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PublishError::RateLimited | PublishError::Server(_, _) | PublishError::Transport(_)
        )
    }

    fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => PublishError::RateLimited,
            500..=599 => PublishError::Server(status, body),
            _ => PublishError::Rejected(status, body),
        }
    }
}

/// Seam for test doubles
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// PUT `bytes` at `key` with the given content type
    async fn put(&self, key: &str, content_type: &str, bytes: &[u8]) -> Result<(), PublishError>;

    /// Public URL the key is served under
    fn public_url(&self, key: &str) -> String;
}

/// HTTP object store (S3-compatible presigned-style PUT endpoint)
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
    public_base: String,
}

impl HttpObjectStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            public_base: config.public_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, key: &str, content_type: &str, bytes: &[u8]) -> Result<(), PublishError> {
        let response = self
            .client
            .put(format!("{}/{}", self.endpoint, key))
            .bearer_auth(&self.api_token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::from_status(status.as_u16(), body));
        }
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }
}

/// Deterministic storage key for an episode's audio
pub fn episode_audio_key(episode_id: Uuid) -> String {
    format!("episodes/{episode_id}.mp3")
}

/// Upload episode audio with retry; returns the public URL
pub async fn publish_episode_audio(
    store: &dyn ObjectStore,
    episode_id: Uuid,
    audio: &[u8],
) -> Result<String, PublishError> {
    let key = episode_audio_key(episode_id);
    let policy = RetryPolicy::upload();

    retry_with_backoff("audio_upload", &policy, PublishError::is_retryable, || {
        store.put(&key, "audio/mpeg", audio)
    })
    .await?;

    tracing::info!(episode_id = %episode_id, bytes = audio.len(), key, "Episode audio published");
    Ok(store.public_url(&key))
}
