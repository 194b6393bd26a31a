//! Database access for briefcast-gen
//!
//! One module per table, hand-written SQL via sqlx. Uuids and timestamps are
//! stored as TEXT; list columns as JSON text.

pub mod episodes;
pub mod segments;
pub mod signals;
pub mod users;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Parse a TEXT uuid column
pub(crate) fn parse_uuid(raw: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| anyhow::anyhow!("invalid uuid {raw:?}: {e}"))
}

/// Parse a TEXT RFC 3339 timestamp column
pub(crate) fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow::anyhow!("invalid timestamp {raw:?}: {e}"))
}

/// Parse a JSON string-array column, tolerating malformed rows
pub(crate) fn parse_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Current timestamp in the stored format
pub(crate) fn now_text() -> String {
    Utc::now().to_rfc3339()
}
