//! Shared data model for the generation pipeline
//!
//! Signals are captured items of user interest, episodes are generated audio
//! briefings, segments are the topical sections of an episode script. Status
//! enums mirror the lifecycle rules enforced by the orchestrator: a signal is
//! consumed by at most one non-failed episode, and a failed generation
//! releases its signals back to `Queued`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of content a signal carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    Link,
    Topic,
    VoiceNote,
    ForwardedEmail,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Link => "LINK",
            SignalKind::Topic => "TOPIC",
            SignalKind::VoiceNote => "VOICE_NOTE",
            SignalKind::ForwardedEmail => "FORWARDED_EMAIL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LINK" => Some(SignalKind::Link),
            "TOPIC" => Some(SignalKind::Topic),
            "VOICE_NOTE" => Some(SignalKind::VoiceNote),
            "FORWARDED_EMAIL" => Some(SignalKind::ForwardedEmail),
            _ => None,
        }
    }
}

/// Channel a signal was captured through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureChannel {
    Web,
    Email,
    Sms,
    Voice,
}

impl CaptureChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureChannel::Web => "WEB",
            CaptureChannel::Email => "EMAIL",
            CaptureChannel::Sms => "SMS",
            CaptureChannel::Voice => "VOICE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WEB" => Some(CaptureChannel::Web),
            "EMAIL" => Some(CaptureChannel::Email),
            "SMS" => Some(CaptureChannel::Sms),
            "VOICE" => Some(CaptureChannel::Voice),
            _ => None,
        }
    }
}

/// Signal lifecycle status
///
/// `Queued` -> `Enriched` -> `Used`, with `Failed` terminal for enrichment
/// errors. A failed episode generation moves `Used` signals back to `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStatus {
    Queued,
    Enriched,
    Used,
    Failed,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Queued => "QUEUED",
            SignalStatus::Enriched => "ENRICHED",
            SignalStatus::Used => "USED",
            SignalStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(SignalStatus::Queued),
            "ENRICHED" => Some(SignalStatus::Enriched),
            "USED" => Some(SignalStatus::Used),
            "FAILED" => Some(SignalStatus::Failed),
            _ => None,
        }
    }
}

/// Episode lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EpisodeStatus {
    Generating,
    Synthesizing,
    Ready,
    Failed,
}

impl EpisodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeStatus::Generating => "GENERATING",
            EpisodeStatus::Synthesizing => "SYNTHESIZING",
            EpisodeStatus::Ready => "READY",
            EpisodeStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GENERATING" => Some(EpisodeStatus::Generating),
            "SYNTHESIZING" => Some(EpisodeStatus::Synthesizing),
            "READY" => Some(EpisodeStatus::Ready),
            "FAILED" => Some(EpisodeStatus::Failed),
            _ => None,
        }
    }
}

/// One captured item of user interest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: SignalKind,
    pub channel: CaptureChannel,
    /// Raw text as captured
    pub raw_content: String,
    /// Resolved URL (LINK signals)
    pub url: Option<String>,
    /// Extracted page title (or truncated raw text for non-links)
    pub title: Option<String>,
    /// Source label, typically the publishing hostname
    pub source: Option<String>,
    /// Extracted body text, truncated to the prompting word budget
    pub content: Option<String>,
    /// 0-5 short topic tags from classification
    pub topics: Vec<String>,
    pub status: SignalStatus,
    /// Episode that consumed this signal, if any
    pub episode_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One generated audio briefing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    /// Full narration script text
    pub script: Option<String>,
    /// One-paragraph summary, used for continuity callbacks in later episodes
    pub summary: Option<String>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub signal_count: i64,
    pub topics: Vec<String>,
    pub voice_id: Option<String>,
    pub audio_url: Option<String>,
    pub duration_secs: Option<f64>,
    pub status: EpisodeStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One attributed source within a segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentSource {
    pub name: String,
    pub url: String,
    pub attribution: Option<String>,
}

/// One topical section of an episode script
///
/// Created once as a batch with its sibling segments, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: Uuid,
    pub episode_id: Uuid,
    pub order_index: i64,
    pub topic: String,
    pub content: String,
    pub sources: Vec<SegmentSource>,
    pub created_at: DateTime<Utc>,
}

/// Minimal user profile read by the pipeline
///
/// The dashboard owns richer user data; the pipeline only needs what prompt
/// framing and voice selection require. Unknown users get defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    /// Phonetic spelling for narration, when the display name needs one
    pub pronunciation: Option<String>,
    pub voice_id: String,
    /// Target episode length: "short", "standard" or "deep"
    pub length_tier: String,
}

impl UserProfile {
    pub fn default_for(id: Uuid, default_voice: &str) -> Self {
        Self {
            id,
            display_name: "there".to_string(),
            pronunciation: None,
            voice_id: default_voice.to_string(),
            length_tier: "standard".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for s in ["QUEUED", "ENRICHED", "USED", "FAILED"] {
            assert_eq!(SignalStatus::parse(s).unwrap().as_str(), s);
        }
        for s in ["GENERATING", "SYNTHESIZING", "READY", "FAILED"] {
            assert_eq!(EpisodeStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(SignalStatus::parse("UNKNOWN").is_none());
    }

    #[test]
    fn kind_round_trip() {
        for k in ["LINK", "TOPIC", "VOICE_NOTE", "FORWARDED_EMAIL"] {
            assert_eq!(SignalKind::parse(k).unwrap().as_str(), k);
        }
    }
}
