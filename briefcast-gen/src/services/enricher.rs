//! Signal classification and background enrichment
//!
//! `classify_input` turns raw captured text into one or more new signals.
//! Enrichment runs in a bounded worker pool consuming a signal-id channel,
//! decoupled from signal creation: the capture request returns immediately
//! and an enrichment failure only affects that signal's status.

use anyhow::{Context, Result};
use briefcast_common::models::{CaptureChannel, SignalKind, SignalStatus};
use regex::Regex;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use super::classifier::TopicClassifier;
use super::fetcher::SafeFetcher;

/// Queue capacity before captures start reporting enrichment backpressure
const QUEUE_CAPACITY: usize = 256;
/// Worker pool size
const WORKER_COUNT: usize = 2;
/// Title length for non-link signals, from the raw text
const RAW_TITLE_CHARS: usize = 80;
/// Body preview length fed to the topic classifier
const CLASSIFY_PREVIEW_CHARS: usize = 500;

const FORWARD_MARKERS: &[&str] = &[
    "begin forwarded message",
    "---------- forwarded message",
    "-----original message-----",
];

/// One signal to create from a capture
#[derive(Debug, Clone, PartialEq)]
pub struct NewSignal {
    pub kind: SignalKind,
    pub raw_content: String,
    pub url: Option<String>,
}

/// Classify raw captured text into the signals it should produce.
///
/// Priority order: forwarded-email header markers short-circuit (no URL
/// splitting); embedded URLs yield one LINK signal per URL, except the
/// EMAIL channel which always yields exactly one signal; otherwise the text
/// passes through as TOPIC (VOICE channel: VOICE_NOTE).
pub fn classify_input(raw: &str, channel: CaptureChannel) -> Vec<NewSignal> {
    let lowered = raw.to_lowercase();
    if FORWARD_MARKERS.iter().any(|m| lowered.contains(m)) {
        return vec![NewSignal {
            kind: SignalKind::ForwardedEmail,
            raw_content: raw.to_string(),
            url: None,
        }];
    }

    let urls = extract_urls(raw);
    if !urls.is_empty() {
        if channel == CaptureChannel::Email {
            // Email captures stay whole regardless of embedded URL count
            return vec![NewSignal {
                kind: SignalKind::Link,
                raw_content: raw.to_string(),
                url: Some(urls[0].clone()),
            }];
        }
        return urls
            .into_iter()
            .map(|url| NewSignal {
                kind: SignalKind::Link,
                raw_content: raw.to_string(),
                url: Some(url),
            })
            .collect();
    }

    let kind = if channel == CaptureChannel::Voice {
        SignalKind::VoiceNote
    } else {
        SignalKind::Topic
    };
    vec![NewSignal {
        kind,
        raw_content: raw.to_string(),
        url: None,
    }]
}

/// Pull http(s) URLs out of free text, trimming trailing punctuation
pub fn extract_urls(text: &str) -> Vec<String> {
    let re = Regex::new(r#"https?://[^\s<>"']+"#).expect("static regex");
    re.find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', ')', ']']).to_string())
        .filter(|u| !u.is_empty())
        .collect()
}

/// Handle for enqueuing enrichment work
#[derive(Clone)]
pub struct EnrichmentQueue {
    tx: mpsc::Sender<Uuid>,
}

impl EnrichmentQueue {
    /// Enqueue a signal for background enrichment. A full queue is reported
    /// but not fatal: the signal stays QUEUED and can be re-enqueued.
    pub fn enqueue(&self, signal_id: Uuid) {
        if let Err(err) = self.tx.try_send(signal_id) {
            tracing::warn!(signal_id = %signal_id, error = %err, "Enrichment queue full, signal left queued");
        }
    }
}

/// Enrichment worker logic
pub struct SignalEnricher {
    db: SqlitePool,
    fetcher: SafeFetcher,
    classifier: Arc<dyn TopicClassifier>,
}

impl SignalEnricher {
    pub fn new(db: SqlitePool, fetcher: SafeFetcher, classifier: Arc<dyn TopicClassifier>) -> Self {
        Self {
            db,
            fetcher,
            classifier,
        }
    }

    /// Start the worker pool, returning the enqueue handle
    pub fn spawn_workers(self: Arc<Self>) -> EnrichmentQueue {
        let (tx, rx) = mpsc::channel::<Uuid>(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));

        for worker in 0..WORKER_COUNT {
            let rx = Arc::clone(&rx);
            let enricher = Arc::clone(&self);
            tokio::spawn(async move {
                loop {
                    let signal_id = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(signal_id) = signal_id else {
                        tracing::debug!(worker, "Enrichment channel closed, worker exiting");
                        break;
                    };

                    if let Err(err) = enricher.enrich(signal_id).await {
                        tracing::error!(worker, signal_id = %signal_id, error = %err, "Enrichment failed");
                        if let Err(err) = crate::db::signals::mark_failed(&enricher.db, signal_id).await {
                            tracing::error!(signal_id = %signal_id, error = %err, "Could not mark signal failed");
                        }
                    }
                }
            });
        }

        EnrichmentQueue { tx }
    }

    /// Enrich one signal. Idempotent: only QUEUED signals get work;
    /// enriched, consumed and failed signals return untouched (FAILED is
    /// terminal).
    pub async fn enrich(&self, signal_id: Uuid) -> Result<()> {
        let signal = crate::db::signals::get_signal(&self.db, signal_id)
            .await?
            .with_context(|| format!("signal {signal_id} not found"))?;

        if signal.status != SignalStatus::Queued {
            tracing::debug!(
                signal_id = %signal_id,
                status = signal.status.as_str(),
                "Signal not eligible for enrichment, skipping"
            );
            return Ok(());
        }

        let (title, source, content) = match (&signal.kind, signal.url.as_deref()) {
            (SignalKind::Link, Some(url)) => {
                let page = self.fetcher.fetch_page(url).await;
                (page.title, page.source, page.content)
            }
            _ => {
                // Non-link signals get a truncated-raw-text title
                let title: String = signal.raw_content.chars().take(RAW_TITLE_CHARS).collect();
                (Some(title), None, Some(signal.raw_content.clone()))
            }
        };

        crate::db::signals::store_enrichment(
            &self.db,
            signal_id,
            title.as_deref(),
            source.as_deref(),
            content.as_deref(),
        )
        .await?;

        tracing::info!(signal_id = %signal_id, kind = signal.kind.as_str(), "Signal enriched");

        // Topic tags are best-effort; failures leave them empty
        let context = classify_context(title.as_deref(), source.as_deref(), content.as_deref());
        if !context.is_empty() {
            match self.classifier.classify(&context).await {
                Ok(result) => {
                    if let Err(err) =
                        crate::db::signals::set_topics(&self.db, signal_id, &result.topics).await
                    {
                        tracing::debug!(signal_id = %signal_id, error = %err, "Failed to store topics");
                    }
                }
                Err(err) => {
                    tracing::debug!(signal_id = %signal_id, error = %err, "Topic classification skipped");
                }
            }
        }

        Ok(())
    }
}

/// Context string fed to the topic classifier
fn classify_context(title: Option<&str>, source: Option<&str>, content: Option<&str>) -> String {
    let mut parts = Vec::new();
    if let Some(title) = title {
        parts.push(format!("Title: {title}"));
    }
    if let Some(source) = source {
        parts.push(format!("Source: {source}"));
    }
    if let Some(content) = content {
        let preview: String = content.chars().take(CLASSIFY_PREVIEW_CHARS).collect();
        parts.push(format!("Content: {preview}"));
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_message_short_circuits() {
        let raw = "Begin forwarded message\nFrom: a@b.c\nCheck https://example.com/a and https://example.com/b";
        let signals = classify_input(raw, CaptureChannel::Email);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::ForwardedEmail);
        assert!(signals[0].url.is_none());
    }

    #[test]
    fn forwarded_marker_case_insensitive() {
        let signals = classify_input(
            "---------- Forwarded Message ----------\nhttps://example.com",
            CaptureChannel::Web,
        );
        assert_eq!(signals[0].kind, SignalKind::ForwardedEmail);
    }

    #[test]
    fn n_urls_yield_n_signals() {
        let raw = "Read https://example.com/one and https://example.com/two, also https://example.com/three.";
        let signals = classify_input(raw, CaptureChannel::Web);
        assert_eq!(signals.len(), 3);
        let urls: Vec<_> = signals.iter().filter_map(|s| s.url.as_deref()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/one",
                "https://example.com/two",
                "https://example.com/three"
            ]
        );
        assert!(signals.iter().all(|s| s.kind == SignalKind::Link));
    }

    #[test]
    fn email_channel_yields_exactly_one_signal() {
        let raw = "https://example.com/one https://example.com/two";
        let signals = classify_input(raw, CaptureChannel::Email);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].url.as_deref(), Some("https://example.com/one"));
    }

    #[test]
    fn plain_text_passthrough() {
        let signals = classify_input("quantum error correction progress", CaptureChannel::Web);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::Topic);
        assert!(signals[0].url.is_none());

        let signals = classify_input("remind me about the housing market", CaptureChannel::Voice);
        assert_eq!(signals[0].kind, SignalKind::VoiceNote);
    }

    #[test]
    fn url_extraction_trims_trailing_punctuation() {
        let urls = extract_urls("see (https://example.com/path), or https://example.com/x.");
        assert_eq!(urls, vec!["https://example.com/path", "https://example.com/x"]);
    }
}
