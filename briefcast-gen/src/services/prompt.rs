//! Synthesis prompt assembly
//!
//! Groups claimed signals by kind with framing that keeps the model from
//! reproducing any single source: links are topic indicators to research
//! independently, topics are research targets, forwarded emails are bulk
//! context. User framing (name, pronunciation, length tier) and prior
//! episode summaries ride along for continuity callbacks.

use briefcast_common::models::{Signal, SignalKind, UserProfile};

/// System instructions describing the episode document schema
pub const SYNTHESIS_SYSTEM: &str = "You write personal audio briefing scripts. \
You research topics and synthesize across many sources; never reproduce any single \
source's text. Write conversational spoken-word prose with no stage directions, \
no markdown, no emoji. Respond with exactly one JSON object: \
{\"title\": string, \"intro\": string, \"segments\": [{\"topic\": string, \
\"content\": string, \"sources\": [{\"name\": string, \"url\": string, \
\"attribution\": string}]}], \"summary\": string, \"connections\": string, \
\"outro\": string}. No text outside the JSON object.";

/// Spoken-word target per length tier
fn word_target(length_tier: &str) -> &'static str {
    match length_tier {
        "short" => "600-900 words (about 5 minutes)",
        "deep" => "2200-3000 words (about 18 minutes)",
        _ => "1200-1800 words (about 10 minutes)",
    }
}

/// Build the user prompt for episode synthesis
pub fn build_synthesis_prompt(
    signals: &[Signal],
    profile: &UserProfile,
    prior_summaries: &[String],
    manual: bool,
) -> String {
    let mut prompt = String::new();

    let framing = if manual {
        "This episode was requested on demand; acknowledge it covers what the listener queued up just now."
    } else {
        "This is a scheduled briefing covering the listener's recent captures."
    };
    prompt.push_str(framing);
    prompt.push_str("\n\n");

    prompt.push_str(&format!(
        "Listener: {}{}. Target length: {}.\n\n",
        profile.display_name,
        profile
            .pronunciation
            .as_deref()
            .map(|p| format!(" (pronounced {p})"))
            .unwrap_or_default(),
        word_target(&profile.length_tier),
    ));

    let links: Vec<&Signal> = signals.iter().filter(|s| s.kind == SignalKind::Link).collect();
    let topics: Vec<&Signal> = signals
        .iter()
        .filter(|s| matches!(s.kind, SignalKind::Topic | SignalKind::VoiceNote))
        .collect();
    let emails: Vec<&Signal> = signals
        .iter()
        .filter(|s| s.kind == SignalKind::ForwardedEmail)
        .collect();

    if !links.is_empty() {
        prompt.push_str(
            "Saved links. Treat each as a topic indicator, not content to reproduce: \
research the subject broadly and synthesize.\n",
        );
        for signal in &links {
            prompt.push_str(&format!(
                "- {}{}{}\n",
                signal.title.as_deref().unwrap_or("(untitled)"),
                signal
                    .source
                    .as_deref()
                    .map(|s| format!(" — {s}"))
                    .unwrap_or_default(),
                signal
                    .content
                    .as_deref()
                    .map(|c| {
                        let preview: String = c.chars().take(300).collect();
                        format!("\n  Context: {preview}")
                    })
                    .unwrap_or_default(),
            ));
        }
        prompt.push('\n');
    }

    if !topics.is_empty() {
        prompt.push_str("Topics the listener asked about. Research each independently:\n");
        for signal in &topics {
            prompt.push_str(&format!("- {}\n", signal.raw_content.trim()));
        }
        prompt.push('\n');
    }

    if !emails.is_empty() {
        prompt.push_str("Forwarded emails, as bulk context:\n");
        for signal in &emails {
            let preview: String = signal.raw_content.chars().take(1000).collect();
            prompt.push_str(&format!("---\n{preview}\n"));
        }
        prompt.push_str("---\n\n");
    }

    if !prior_summaries.is_empty() {
        prompt.push_str(
            "Previous episode summaries, for continuity. Refer back casually when a new \
topic connects to one:\n",
        );
        for summary in prior_summaries {
            prompt.push_str(&format!("- {summary}\n"));
        }
        prompt.push('\n');
    }

    prompt.push_str("Produce the episode JSON now.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use briefcast_common::models::{CaptureChannel, SignalStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn signal(kind: SignalKind, raw: &str, title: Option<&str>) -> Signal {
        Signal {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind,
            channel: CaptureChannel::Web,
            raw_content: raw.to_string(),
            url: None,
            title: title.map(String::from),
            source: None,
            content: None,
            topics: Vec::new(),
            status: SignalStatus::Enriched,
            episode_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn profile() -> UserProfile {
        UserProfile {
            id: Uuid::new_v4(),
            display_name: "Ada".to_string(),
            pronunciation: Some("AY-duh".to_string()),
            voice_id: "v1".to_string(),
            length_tier: "short".to_string(),
        }
    }

    #[test]
    fn groups_signals_by_kind() {
        let signals = vec![
            signal(SignalKind::Link, "https://example.com/a", Some("Article A")),
            signal(SignalKind::Topic, "fusion energy", None),
            signal(SignalKind::ForwardedEmail, "Begin forwarded message\nhello", None),
        ];
        let prompt = build_synthesis_prompt(&signals, &profile(), &[], true);

        assert!(prompt.contains("topic indicator, not content to reproduce"));
        assert!(prompt.contains("Article A"));
        assert!(prompt.contains("fusion energy"));
        assert!(prompt.contains("Forwarded emails"));
        assert!(prompt.contains("requested on demand"));
        assert!(prompt.contains("Ada (pronounced AY-duh)"));
        assert!(prompt.contains("600-900 words"));
    }

    #[test]
    fn scheduled_framing_and_continuity() {
        let signals = vec![signal(SignalKind::Topic, "rust releases", None)];
        let summaries = vec!["Last time we covered the 1.80 release.".to_string()];
        let prompt = build_synthesis_prompt(&signals, &profile(), &summaries, false);

        assert!(prompt.contains("scheduled briefing"));
        assert!(prompt.contains("Last time we covered"));
        assert!(!prompt.contains("requested on demand"));
    }
}
