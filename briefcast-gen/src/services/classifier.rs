//! Topic classification
//!
//! Secondary enrichment step: a small/fast model derives 2-5 topic tags
//! plus a one-line summary and importance from an enriched signal's
//! context. Classification is an enhancement, not a correctness
//! requirement; callers swallow failures and leave tags empty.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use super::llm_client::{TextGenError, TextGenRequest, TextGenerator};
use super::script_parser::extract_object_str;

const MAX_TOPICS: usize = 5;

const CLASSIFY_SYSTEM: &str = "You tag captured content for a personal audio briefing. \
Respond with exactly one JSON object: \
{\"topics\": [2-5 short lowercase tags], \"summary\": \"one sentence\", \
\"importance\": \"high\"|\"medium\"|\"low\"}. No other text.";

/// Classification errors
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    TextGen(#[from] TextGenError),

    #[error("classification output unusable: {0}")]
    InvalidOutput(String),
}

/// Classifier result
#[derive(Debug, Clone, Deserialize)]
pub struct TopicClassification {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub importance: String,
}

/// Seam for test doubles
#[async_trait]
pub trait TopicClassifier: Send + Sync {
    async fn classify(&self, context: &str) -> Result<TopicClassification, ClassifyError>;
}

/// Classifier backed by the fast text-generation model
pub struct LlmTopicClassifier {
    generator: Arc<dyn TextGenerator>,
}

impl LlmTopicClassifier {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl TopicClassifier for LlmTopicClassifier {
    async fn classify(&self, context: &str) -> Result<TopicClassification, ClassifyError> {
        let request = TextGenRequest {
            system: CLASSIFY_SYSTEM.to_string(),
            prompt: context.to_string(),
            max_tokens: 512,
            fast: true,
        };

        let output = self.generator.generate(&request).await?;
        let object = extract_object_str(&output.text)
            .ok_or_else(|| ClassifyError::InvalidOutput("no JSON object".to_string()))?;

        let mut parsed: TopicClassification = serde_json::from_str(&object)
            .map_err(|e| ClassifyError::InvalidOutput(e.to_string()))?;

        parsed.topics.retain(|t| !t.trim().is_empty());
        parsed.topics.truncate(MAX_TOPICS);
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm_client::GeneratedText;

    struct CannedGen(String);

    #[async_trait]
    impl TextGenerator for CannedGen {
        async fn generate(&self, _req: &TextGenRequest) -> Result<GeneratedText, TextGenError> {
            Ok(GeneratedText {
                text: self.0.clone(),
                stop_reason: Some("end_turn".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn parses_and_caps_topics() {
        let raw = r#"Sure! ```json
        {"topics": ["rust", "async", "tokio", "db", "audio", "extra", "more"],
         "summary": "A piece about async Rust.", "importance": "medium"}
        ```"#;
        let classifier = LlmTopicClassifier::new(Arc::new(CannedGen(raw.to_string())));
        let result = classifier.classify("some context").await.unwrap();
        assert_eq!(result.topics.len(), 5);
        assert_eq!(result.importance, "medium");
    }

    #[tokio::test]
    async fn rejects_non_json_output() {
        let classifier = LlmTopicClassifier::new(Arc::new(CannedGen("no json".to_string())));
        assert!(classifier.classify("ctx").await.is_err());
    }
}
