//! Shared fixtures and test doubles for integration tests
//!
//! The pipeline is wired against trait seams (text generation, speech,
//! subprocess, object store) so the full orchestration path runs against
//! in-process doubles and a real temp-file SQLite database.

// Each test binary compiles this module separately and uses a subset of it.
#![allow(dead_code)]

use async_trait::async_trait;
use briefcast_common::config::AppConfig;
use briefcast_common::models::{CaptureChannel, SignalKind};
use briefcast_gen::services::llm_client::{
    GeneratedText, TextGenError, TextGenRequest, TextGenerator,
};
use briefcast_gen::services::mixer::AudioMixer;
use briefcast_gen::services::publisher::{ObjectStore, PublishError};
use briefcast_gen::services::subprocess::{SubprocessError, SubprocessOutput, SubprocessRunner};
use briefcast_gen::services::synthesis::EpisodeGenerator;
use briefcast_gen::services::tts_client::{Narrator, SpeechSynthesizer, TtsError};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

/// A valid three-segment episode document, as the synthesis model returns it
pub const SCRIPT_JSON: &str = r#"{
    "title": "Your Tuesday Briefing",
    "intro": "Good morning. Three things caught your eye this week.",
    "segments": [
        {
            "topic": "rust async runtimes",
            "content": "First up, a deep dive into how async runtimes schedule work.",
            "sources": [{"name": "Example Blog", "url": "https://example.com/async", "attribution": "Example Blog reports"}]
        },
        {
            "topic": "housing market",
            "content": "Next, the housing numbers you flagged came in cooler than expected.",
            "sources": []
        },
        {
            "topic": "quantum error correction",
            "content": "Finally, that quantum computing milestone you wanted to follow.",
            "sources": [{"name": "Research Weekly", "url": "https://example.com/qec", "attribution": null}]
        }
    ],
    "summary": "Async runtimes, housing data, and a quantum milestone.",
    "connections": "Two of these touch on long-horizon bets you have been tracking.",
    "outro": "That is your briefing. Talk soon."
}"#;

/// Open a fresh temp-file database. The TempDir must outlive the pool.
pub async fn test_pool() -> (TempDir, SqlitePool) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let pool = briefcast_common::db::init_pool(&dir.path().join("test.db"))
        .await
        .expect("init database");
    (dir, pool)
}

/// Insert one QUEUED topic signal and return its id
pub async fn seed_signal(pool: &SqlitePool, user_id: Uuid, text: &str) -> Uuid {
    briefcast_gen::db::signals::insert_signal(
        pool,
        user_id,
        SignalKind::Topic,
        CaptureChannel::Web,
        text,
        None,
    )
    .await
    .expect("insert signal")
    .id
}

/// Text generator returning a fixed response, counting calls
pub struct CannedGen {
    pub text: String,
    pub stop_reason: &'static str,
    pub calls: AtomicUsize,
}

impl CannedGen {
    pub fn script() -> Self {
        Self::with(SCRIPT_JSON, "end_turn")
    }

    pub fn with(text: &str, stop_reason: &'static str) -> Self {
        Self {
            text: text.to_string(),
            stop_reason,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TextGenerator for CannedGen {
    async fn generate(&self, _request: &TextGenRequest) -> Result<GeneratedText, TextGenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedText {
            text: self.text.clone(),
            stop_reason: Some(self.stop_reason.to_string()),
        })
    }
}

/// Speech synthesizer emitting fixed bytes per chunk
pub struct StubSpeech;

#[async_trait]
impl SpeechSynthesizer for StubSpeech {
    async fn synthesize_chunk(&self, _text: &str, _voice_id: &str) -> Result<Vec<u8>, TtsError> {
        Ok(b"AUDIO".to_vec())
    }
}

/// Speech synthesizer that always fails non-retryably
pub struct BrokenSpeech;

#[async_trait]
impl SpeechSynthesizer for BrokenSpeech {
    async fn synthesize_chunk(&self, _text: &str, _voice_id: &str) -> Result<Vec<u8>, TtsError> {
        Err(TtsError::Rejected(422, "voice not found".to_string()))
    }
}

/// Runner with no ffmpeg; the mixer degrades to unmixed narration
pub struct NoFfmpegRunner;

#[async_trait]
impl SubprocessRunner for NoFfmpegRunner {
    async fn run(
        &self,
        program: &str,
        _args: &[String],
        _timeout: Duration,
    ) -> Result<SubprocessOutput, SubprocessError> {
        Err(SubprocessError::NotFound(program.to_string()))
    }
}

/// In-memory object store recording every upload
#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, _content_type: &str, bytes: &[u8]) -> Result<(), PublishError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://cdn.test/{key}")
    }
}

/// Object store that always rejects uploads
pub struct BrokenStore;

#[async_trait]
impl ObjectStore for BrokenStore {
    async fn put(&self, _key: &str, _content_type: &str, _bytes: &[u8]) -> Result<(), PublishError> {
        Err(PublishError::Rejected(403, "token expired".to_string()))
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://cdn.test/{key}")
    }
}

/// Pipeline wired with the given doubles
pub fn build_generator(
    pool: SqlitePool,
    text_gen: Arc<dyn TextGenerator>,
    speech: Arc<dyn SpeechSynthesizer>,
    store: Arc<dyn ObjectStore>,
) -> EpisodeGenerator {
    let config = Arc::new(AppConfig::default());
    let narrator = Narrator::new(speech, config.tts.chunk_ceiling);
    let mixer = AudioMixer::new(Arc::new(NoFfmpegRunner), config.audio.clone());
    EpisodeGenerator::new(pool, config, text_gen, narrator, mixer, store)
}
