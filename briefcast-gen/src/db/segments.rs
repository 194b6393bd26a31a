//! Segment persistence
//!
//! Segments are written once as a batch inside the caller's transaction and
//! never updated. Deleting an episode cascades to its segments.

use anyhow::Result;
use briefcast_common::models::{Segment, SegmentSource};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use super::{parse_timestamp, parse_uuid};

fn segment_from_row(row: &SqliteRow) -> Result<Segment> {
    let id_raw: String = row.try_get("id")?;
    let episode_raw: String = row.try_get("episode_id")?;
    let sources_raw: String = row.try_get("sources")?;
    let created_raw: String = row.try_get("created_at")?;

    let sources: Vec<SegmentSource> = serde_json::from_str(&sources_raw).unwrap_or_default();

    Ok(Segment {
        id: parse_uuid(&id_raw)?,
        episode_id: parse_uuid(&episode_raw)?,
        order_index: row.try_get("order_index")?,
        topic: row.try_get("topic")?,
        content: row.try_get("content")?,
        sources,
        created_at: parse_timestamp(&created_raw)?,
    })
}

/// Insert a segment batch within an open transaction
pub async fn insert_batch(tx: &mut Transaction<'_, Sqlite>, segments: &[Segment]) -> Result<()> {
    for segment in segments {
        sqlx::query(
            r#"
            INSERT INTO segments (id, episode_id, order_index, topic, content, sources, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(segment.id.to_string())
        .bind(segment.episode_id.to_string())
        .bind(segment.order_index)
        .bind(&segment.topic)
        .bind(&segment.content)
        .bind(serde_json::to_string(&segment.sources)?)
        .bind(segment.created_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// List an episode's segments in narration order
pub async fn list_for_episode(pool: &SqlitePool, episode_id: uuid::Uuid) -> Result<Vec<Segment>> {
    let rows = sqlx::query("SELECT * FROM segments WHERE episode_id = ? ORDER BY order_index")
        .bind(episode_id.to_string())
        .fetch_all(pool)
        .await?;
    rows.iter().map(segment_from_row).collect()
}
