//! Script chunking and speech synthesis
//!
//! The speech service enforces a hard per-request character ceiling, so the
//! script is split on paragraph boundaries first, sentence boundaries next,
//! and hard character cuts only as a last resort. Chunks are synthesized
//! sequentially and concatenated positionally.

use async_trait::async_trait;
use briefcast_common::config::TtsConfig;
use briefcast_common::retry::{retry_with_backoff, RetryPolicy};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Speech synthesis errors
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("rate limited by speech service")]
    RateLimited,

    #[error("speech service error {0}: {1}")]
    Server(u16, String),

    #[error("speech request failed: {0}")]
    Transport(String),

    #[error("speech service rejected request ({0}): {1}")]
    Rejected(u16, String),

    #[error("speech service returned empty audio")]
    EmptyAudio,
}

impl TtsError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TtsError::RateLimited | TtsError::Server(_, _) | TtsError::Transport(_)
        )
    }

    fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => TtsError::RateLimited,
            500..=599 => TtsError::Server(status, body),
            _ => TtsError::Rejected(status, body),
        }
    }
}

/// Seam for test doubles
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize one chunk, returning encoded audio bytes
    async fn synthesize_chunk(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, TtsError>;
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    model_id: &'static str,
    voice_settings: VoiceSettings,
}

/// ElevenLabs-style HTTP speech client
#[derive(Debug, Clone)]
pub struct ElevenLabsClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    stability: f32,
    similarity_boost: f32,
}

impl ElevenLabsClient {
    pub fn new(config: &TtsConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            stability: config.stability,
            similarity_boost: config.similarity_boost,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize_chunk(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, TtsError> {
        let body = TtsRequest {
            text,
            model_id: "eleven_turbo_v2_5",
            voice_settings: VoiceSettings {
                stability: self.stability,
                similarity_boost: self.similarity_boost,
            },
        };

        let response = self
            .client
            .post(format!("{}/v1/text-to-speech/{}", self.api_base, voice_id))
            .header("xi-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| TtsError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::from_status(status.as_u16(), body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TtsError::Transport(e.to_string()))?;
        if bytes.is_empty() {
            return Err(TtsError::EmptyAudio);
        }
        Ok(bytes.to_vec())
    }
}

/// Turns a full script into one narration buffer
pub struct Narrator {
    synthesizer: std::sync::Arc<dyn SpeechSynthesizer>,
    chunk_ceiling: usize,
    policy: RetryPolicy,
}

impl Narrator {
    pub fn new(synthesizer: std::sync::Arc<dyn SpeechSynthesizer>, chunk_ceiling: usize) -> Self {
        Self {
            synthesizer,
            chunk_ceiling,
            policy: RetryPolicy::speech(),
        }
    }

    /// Synthesize a whole script, chunked against the service ceiling.
    ///
    /// Chunks are fetched in order, each wrapped in retry; a non-retryable
    /// failure aborts the whole narration.
    pub async fn narrate(&self, script: &str, voice_id: &str) -> Result<Vec<u8>, TtsError> {
        let chunks = chunk_script(script, self.chunk_ceiling);
        tracing::info!(
            chunks = chunks.len(),
            chars = script.len(),
            voice_id,
            "Synthesizing narration"
        );

        let mut audio = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            let bytes = retry_with_backoff(
                "tts_chunk",
                &self.policy,
                TtsError::is_retryable,
                || self.synthesizer.synthesize_chunk(chunk, voice_id),
            )
            .await?;
            tracing::debug!(index, bytes = bytes.len(), "Chunk synthesized");
            audio.extend_from_slice(&bytes);
        }

        if audio.is_empty() {
            return Err(TtsError::EmptyAudio);
        }
        Ok(audio)
    }
}

/// Split a script into chunks no longer than `ceiling` characters.
///
/// Paragraph boundaries first; oversized paragraphs split on sentence
/// boundaries; a single oversized sentence is hard-cut at the ceiling.
pub fn chunk_script(script: &str, ceiling: usize) -> Vec<String> {
    assert!(ceiling > 0);
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for paragraph in script.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let pieces: Vec<String> = if paragraph.len() <= ceiling {
            vec![paragraph.to_string()]
        } else {
            split_oversized_paragraph(paragraph, ceiling)
        };

        for piece in pieces {
            if current.is_empty() {
                current = piece;
            } else if current.len() + 2 + piece.len() <= ceiling {
                current.push_str("\n\n");
                current.push_str(&piece);
            } else {
                chunks.push(std::mem::replace(&mut current, piece));
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_oversized_paragraph(paragraph: &str, ceiling: usize) -> Vec<String> {
    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(paragraph) {
        if sentence.len() > ceiling {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            // Last resort: hard character split
            pieces.extend(hard_split(&sentence, ceiling));
        } else if current.is_empty() {
            current = sentence;
        } else if current.len() + 1 + sentence.len() <= ceiling {
            current.push(' ');
            current.push_str(&sentence);
        } else {
            pieces.push(std::mem::replace(&mut current, sentence));
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Naive sentence splitter keeping terminal punctuation with its sentence
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        let is_terminal = matches!(b, b'.' | b'!' | b'?');
        let at_break = is_terminal && bytes.get(i + 1).map_or(true, |&next| next == b' ');
        if at_break {
            let sentence = text[start..=i].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = i + 1;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Hard split at the ceiling, on char boundaries
fn hard_split(text: &str, ceiling: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if current.len() + ch.len_utf8() > ceiling {
            pieces.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
