//! Structured script extraction from model output
//!
//! The text model is asked for one JSON object but answers in free text:
//! code fences, prose around the object, and occasionally raw control
//! characters inside string values. `parse_or_repair` strips fencing,
//! brace-matches the first top-level object, parses, and on failure makes
//! exactly one repair pass that escapes control characters inside strings
//! before the final parse attempt.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parse errors for model script output
#[derive(Debug, Error)]
pub enum ScriptParseError {
    #[error("no JSON object found in model output")]
    NoJsonObject,

    #[error("model output failed to parse after repair: {0}")]
    Unparseable(String),

    #[error("script is missing required content: {0}")]
    InvalidScript(String),
}

/// One attributed source in a segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub attribution: Option<String>,
}

/// One topical segment of the script
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentData {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sources: Vec<SourceData>,
}

/// The episode document the model is asked to produce
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeData {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub intro: Option<String>,
    #[serde(default)]
    pub segments: Vec<SegmentData>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub connections: Option<String>,
    #[serde(default)]
    pub outro: Option<String>,
}

impl EpisodeData {
    /// Minimal validation: title and at least one segment. Everything else
    /// downgrades gracefully (missing intro/outro are simply omitted).
    pub fn validate(&self) -> Result<(), ScriptParseError> {
        if self.title.trim().is_empty() {
            return Err(ScriptParseError::InvalidScript("empty title".to_string()));
        }
        if self.segments.iter().all(|s| s.content.trim().is_empty()) {
            return Err(ScriptParseError::InvalidScript(
                "no segments with content".to_string(),
            ));
        }
        Ok(())
    }

    /// Drop any source without a resolvable URL before persistence
    pub fn drop_unresolvable_sources(&mut self) {
        for segment in &mut self.segments {
            segment.sources.retain(|source| {
                url::Url::parse(&source.url)
                    .map(|u| u.scheme() == "http" || u.scheme() == "https")
                    .unwrap_or(false)
            });
        }
    }

    /// Concatenate the narration script in spoken order
    pub fn assemble_script(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(intro) = self.intro.as_deref() {
            if !intro.trim().is_empty() {
                parts.push(intro);
            }
        }
        for segment in &self.segments {
            if !segment.content.trim().is_empty() {
                parts.push(&segment.content);
            }
        }
        if let Some(connections) = self.connections.as_deref() {
            if !connections.trim().is_empty() {
                parts.push(connections);
            }
        }
        if let Some(outro) = self.outro.as_deref() {
            if !outro.trim().is_empty() {
                parts.push(outro);
            }
        }
        parts.join("\n\n")
    }

    /// Topic labels of non-empty segments
    pub fn topics(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter(|s| !s.topic.trim().is_empty())
            .map(|s| s.topic.trim().to_string())
            .collect()
    }
}

/// Extract and parse the episode document from raw model output
pub fn parse_or_repair(raw: &str) -> Result<EpisodeData, ScriptParseError> {
    let stripped = strip_code_fences(raw);
    let object = extract_first_object(&stripped).ok_or(ScriptParseError::NoJsonObject)?;

    match serde_json::from_str(object) {
        Ok(data) => Ok(data),
        Err(first_err) => {
            let repaired = escape_control_chars(object);
            serde_json::from_str(&repaired).map_err(|_| {
                ScriptParseError::Unparseable(first_err.to_string())
            })
        }
    }
}

/// Extract the first JSON object from free-form model output without
/// parsing it. Shared with the topic classifier, whose schema differs.
pub(crate) fn extract_object_str(raw: &str) -> Option<String> {
    let stripped = strip_code_fences(raw);
    extract_first_object(&stripped).map(|s| s.to_string())
}

/// Remove markdown code fencing around the payload
fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let without_open = trimmed
        .trim_start_matches("```")
        .trim_start_matches(|c: char| c.is_ascii_alphanumeric())
        .trim_start();
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
        .to_string()
}

/// Locate the first top-level `{...}` via brace matching that respects
/// string literals and escapes
fn extract_first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Escape raw control characters that appear inside string values.
/// Best-effort sanitizer for the common failure where the model emits a
/// literal newline mid-string.
fn escape_control_chars(json: &str) -> String {
    let mut out = String::with_capacity(json.len() + 16);
    let mut in_string = false;
    let mut escaped = false;

    for ch in json.chars() {
        if escaped {
            out.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => {
                out.push(ch);
                escaped = true;
            }
            '"' => {
                out.push(ch);
                in_string = !in_string;
            }
            '\n' if in_string => out.push_str("\\n"),
            '\r' if in_string => out.push_str("\\r"),
            '\t' if in_string => out.push_str("\\t"),
            c if in_string && (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_object() {
        let raw = r#"{"title": "Morning Brief", "segments": [{"topic": "Rust", "content": "Hello."}]}"#;
        let data = parse_or_repair(raw).unwrap();
        assert_eq!(data.title, "Morning Brief");
        assert_eq!(data.segments.len(), 1);
    }

    #[test]
    fn strips_code_fences() {
        let raw = "```json\n{\"title\": \"T\", \"segments\": [{\"topic\": \"a\", \"content\": \"b\"}]}\n```";
        let data = parse_or_repair(raw).unwrap();
        assert_eq!(data.title, "T");
    }

    #[test]
    fn extracts_object_from_surrounding_prose() {
        let raw = "Here is your episode:\n{\"title\": \"T\", \"segments\": [{\"content\": \"x\"}]}\nHope that helps!";
        let data = parse_or_repair(raw).unwrap();
        assert_eq!(data.title, "T");
    }

    #[test]
    fn brace_matching_ignores_braces_in_strings() {
        let raw = r#"{"title": "curly } brace", "segments": [{"content": "ok"}]}"#;
        let data = parse_or_repair(raw).unwrap();
        assert_eq!(data.title, "curly } brace");
    }

    #[test]
    fn repairs_unescaped_newline_in_string() {
        let raw = "{\"title\": \"Line one\nline two\", \"segments\": [{\"content\": \"x\"}]}";
        let data = parse_or_repair(raw).unwrap();
        assert_eq!(data.title, "Line one\nline two");
    }

    #[test]
    fn repair_preserves_already_escaped_sequences() {
        let raw = r#"{"title": "a\nb", "segments": [{"content": "x"}]}"#;
        let data = parse_or_repair(raw).unwrap();
        assert_eq!(data.title, "a\nb");
    }

    #[test]
    fn fails_without_object() {
        assert!(matches!(
            parse_or_repair("no json here at all"),
            Err(ScriptParseError::NoJsonObject)
        ));
    }

    #[test]
    fn fails_when_still_unparseable() {
        let raw = r#"{"title": "T", "segments": [{"content": }]}"#;
        assert!(matches!(
            parse_or_repair(raw),
            Err(ScriptParseError::Unparseable(_))
        ));
    }

    #[test]
    fn validation_requires_title_and_segments() {
        let empty_title: EpisodeData =
            serde_json::from_str(r#"{"title": " ", "segments": [{"content": "x"}]}"#).unwrap();
        assert!(empty_title.validate().is_err());

        let no_segments: EpisodeData =
            serde_json::from_str(r#"{"title": "T", "segments": []}"#).unwrap();
        assert!(no_segments.validate().is_err());
    }

    #[test]
    fn drops_sources_without_resolvable_urls() {
        let mut data: EpisodeData = serde_json::from_str(
            r#"{"title": "T", "segments": [{"content": "x", "sources": [
                {"name": "Good", "url": "https://example.com/a"},
                {"name": "Bad", "url": "not a url"},
                {"name": "Empty", "url": ""}
            ]}]}"#,
        )
        .unwrap();
        data.drop_unresolvable_sources();
        assert_eq!(data.segments[0].sources.len(), 1);
        assert_eq!(data.segments[0].sources[0].name, "Good");
    }

    #[test]
    fn assembles_script_omitting_missing_parts() {
        let data: EpisodeData = serde_json::from_str(
            r#"{"title": "T", "intro": "Welcome.", "segments": [
                {"topic": "One", "content": "First."},
                {"topic": "Two", "content": "Second."}
            ], "outro": "Goodbye."}"#,
        )
        .unwrap();
        assert_eq!(data.assemble_script(), "Welcome.\n\nFirst.\n\nSecond.\n\nGoodbye.");

        let bare: EpisodeData =
            serde_json::from_str(r#"{"title": "T", "segments": [{"content": "Only."}]}"#).unwrap();
        assert_eq!(bare.assemble_script(), "Only.");
    }
}
