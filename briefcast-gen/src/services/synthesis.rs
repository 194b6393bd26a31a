//! Synthesis orchestrator
//!
//! Drives one episode end to end: atomically claim signals, synthesize the
//! script, persist it, narrate, mix, publish, finalize. Any failure after
//! the claim marks the episode FAILED and releases every claimed signal
//! back to QUEUED so the listener's queue survives for retry.

use anyhow::Context;
use briefcast_common::config::AppConfig;
use briefcast_common::models::{Segment, Signal, UserProfile};
use briefcast_common::retry::{retry_with_backoff, RetryPolicy};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::db;
use crate::db::episodes::SignalSelector;
use super::llm_client::{TextGenError, TextGenRequest, TextGenerator};
use super::mixer::AudioMixer;
use super::publisher::{publish_episode_audio, ObjectStore};
use super::prompt::{build_synthesis_prompt, SYNTHESIS_SYSTEM};
use super::script_parser::{parse_or_repair, EpisodeData, ScriptParseError};
use super::tts_client::Narrator;

/// Prior episode summaries injected for continuity
const CONTINUITY_EPISODES: u32 = 3;

/// One generation request
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// Explicit signal ids; takes precedence over `since`
    pub signal_ids: Option<Vec<Uuid>>,
    /// Time window start when no explicit ids are given
    pub since: Option<DateTime<Utc>>,
    /// On-demand (true) vs scheduled (false) framing
    pub manual: bool,
}

/// Generation errors surfaced to the caller
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("no eligible signals to generate from")]
    NoEligibleSignals,

    #[error("the script hit the model's length limit; reduce the signal set and retry")]
    LengthLimit,

    #[error("script synthesis produced unusable output: {0}")]
    InvalidScript(String),

    #[error("text generation failed: {0}")]
    TextGen(#[from] TextGenError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ScriptParseError> for GenerateError {
    fn from(err: ScriptParseError) -> Self {
        GenerateError::InvalidScript(err.to_string())
    }
}

/// Episode generation pipeline
pub struct EpisodeGenerator {
    db: SqlitePool,
    config: Arc<AppConfig>,
    text_gen: Arc<dyn TextGenerator>,
    narrator: Narrator,
    mixer: AudioMixer,
    store: Arc<dyn ObjectStore>,
}

impl EpisodeGenerator {
    pub fn new(
        db: SqlitePool,
        config: Arc<AppConfig>,
        text_gen: Arc<dyn TextGenerator>,
        narrator: Narrator,
        mixer: AudioMixer,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            db,
            config,
            text_gen,
            narrator,
            mixer,
            store,
        }
    }

    /// Produce exactly one episode from the user's eligible signals.
    ///
    /// The claim is the sole synchronization point: once it commits, the
    /// signals are invisible to concurrent generation attempts regardless
    /// of outcome.
    pub async fn generate(
        &self,
        user_id: Uuid,
        request: &GenerateRequest,
    ) -> Result<Uuid, GenerateError> {
        let selector = match (&request.signal_ids, request.since) {
            (Some(ids), _) => SignalSelector::Ids(ids.clone()),
            (None, Some(since)) => SignalSelector::Since(since),
            (None, None) => SignalSelector::All,
        };

        let claimed = db::episodes::claim_signals(&self.db, user_id, &selector)
            .await
            .context("claiming signals")?;
        let Some((episode_id, signals)) = claimed else {
            return Err(GenerateError::NoEligibleSignals);
        };

        match self
            .run_pipeline(episode_id, user_id, &signals, request.manual)
            .await
        {
            Ok(()) => {
                tracing::info!(episode_id = %episode_id, "Episode ready");
                Ok(episode_id)
            }
            Err(err) => {
                if let Err(release_err) =
                    db::episodes::fail_and_release(&self.db, episode_id, &err.to_string()).await
                {
                    tracing::error!(
                        episode_id = %episode_id,
                        error = %release_err,
                        "Failed to release signals after generation failure"
                    );
                }
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        episode_id: Uuid,
        user_id: Uuid,
        signals: &[Signal],
        manual: bool,
    ) -> Result<(), GenerateError> {
        let profile =
            db::users::get_profile(&self.db, user_id, &self.config.tts.default_voice)
                .await
                .context("loading user profile")?;
        let prior_summaries =
            db::episodes::recent_summaries(&self.db, user_id, CONTINUITY_EPISODES)
                .await
                .context("loading prior summaries")?;

        let data = self
            .synthesize_script(signals, &profile, &prior_summaries, manual)
            .await?;

        let topics = data.topics();
        let segments = build_segments(episode_id, &data);
        let script = data.assemble_script();

        db::episodes::persist_script(
            &self.db,
            episode_id,
            &data.title,
            &script,
            data.summary.as_deref(),
            &topics,
            &segments,
        )
        .await
        .context("persisting script")?;

        tracing::info!(
            episode_id = %episode_id,
            segments = segments.len(),
            script_chars = script.len(),
            "Script persisted, synthesizing audio"
        );

        // Total TTS failure is fatal; everything downstream of it degrades
        let narration = self
            .narrator
            .narrate(&script, &profile.voice_id)
            .await
            .map_err(|e| GenerateError::Other(anyhow::anyhow!("narration failed: {e}")))?;

        let epilogue = self.narrate_epilogue(&profile.voice_id).await;
        let mix = self.mixer.mix_episode(&narration, epilogue.as_deref()).await;

        let audio_url = publish_episode_audio(self.store.as_ref(), episode_id, &mix.audio)
            .await
            .map_err(|e| GenerateError::Other(anyhow::anyhow!("audio upload failed: {e}")))?;

        db::episodes::finalize_ready(
            &self.db,
            episode_id,
            &audio_url,
            mix.duration_secs,
            &profile.voice_id,
        )
        .await
        .context("finalizing episode")?;

        Ok(())
    }

    /// Call the text model (bounded retry on transport-class failures only)
    /// and extract the episode document.
    async fn synthesize_script(
        &self,
        signals: &[Signal],
        profile: &UserProfile,
        prior_summaries: &[String],
        manual: bool,
    ) -> Result<EpisodeData, GenerateError> {
        let request = TextGenRequest {
            system: SYNTHESIS_SYSTEM.to_string(),
            prompt: build_synthesis_prompt(signals, profile, prior_summaries, manual),
            max_tokens: self.config.text_gen.max_tokens,
            fast: false,
        };

        let policy = RetryPolicy::text_generation();
        let output = retry_with_backoff(
            "script_synthesis",
            &policy,
            TextGenError::is_retryable,
            || self.text_gen.generate(&request),
        )
        .await?;

        // A response cut off by the token ceiling is a hard failure, never
        // silently truncated
        if output.truncated_by_length() {
            return Err(GenerateError::LengthLimit);
        }

        let mut data = parse_or_repair(&output.text)?;
        data.validate()?;
        data.drop_unresolvable_sources();
        Ok(data)
    }

    /// Synthesize the configured epilogue script, if any. Epilogue TTS
    /// failure degrades to no epilogue rather than failing generation.
    async fn narrate_epilogue(&self, voice_id: &str) -> Option<Vec<u8>> {
        let script = self.config.audio.epilogue_script.as_deref()?;
        match self.narrator.narrate(script, voice_id).await {
            Ok(audio) => Some(audio),
            Err(err) => {
                tracing::warn!(error = %err, "Epilogue narration failed, omitting epilogue");
                None
            }
        }
    }
}

/// Segment rows from the parsed document, in narration order
fn build_segments(episode_id: Uuid, data: &EpisodeData) -> Vec<Segment> {
    let now = Utc::now();
    data.segments
        .iter()
        .filter(|s| !s.content.trim().is_empty())
        .enumerate()
        .map(|(index, s)| Segment {
            id: Uuid::new_v4(),
            episode_id,
            order_index: index as i64,
            topic: s.topic.clone(),
            content: s.content.clone(),
            sources: s
                .sources
                .iter()
                .map(|src| briefcast_common::models::SegmentSource {
                    name: src.name.clone(),
                    url: src.url.clone(),
                    attribution: src.attribution.clone(),
                })
                .collect(),
            created_at: now,
        })
        .collect()
}
