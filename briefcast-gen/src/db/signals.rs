//! Signal persistence

use anyhow::Result;
use briefcast_common::models::{CaptureChannel, Signal, SignalKind, SignalStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{now_text, parse_string_list, parse_timestamp, parse_uuid};

/// Map a signals row to the model
pub(crate) fn signal_from_row(row: &SqliteRow) -> Result<Signal> {
    let kind_raw: String = row.try_get("kind")?;
    let channel_raw: String = row.try_get("channel")?;
    let status_raw: String = row.try_get("status")?;
    let id_raw: String = row.try_get("id")?;
    let user_raw: String = row.try_get("user_id")?;
    let episode_raw: Option<String> = row.try_get("episode_id")?;
    let topics_raw: String = row.try_get("topics")?;
    let created_raw: String = row.try_get("created_at")?;
    let updated_raw: String = row.try_get("updated_at")?;

    Ok(Signal {
        id: parse_uuid(&id_raw)?,
        user_id: parse_uuid(&user_raw)?,
        kind: SignalKind::parse(&kind_raw)
            .ok_or_else(|| anyhow::anyhow!("unknown signal kind {kind_raw:?}"))?,
        channel: CaptureChannel::parse(&channel_raw)
            .ok_or_else(|| anyhow::anyhow!("unknown capture channel {channel_raw:?}"))?,
        raw_content: row.try_get("raw_content")?,
        url: row.try_get("url")?,
        title: row.try_get("title")?,
        source: row.try_get("source")?,
        content: row.try_get("content")?,
        topics: parse_string_list(&topics_raw),
        status: SignalStatus::parse(&status_raw)
            .ok_or_else(|| anyhow::anyhow!("unknown signal status {status_raw:?}"))?,
        episode_id: episode_raw.as_deref().map(parse_uuid).transpose()?,
        created_at: parse_timestamp(&created_raw)?,
        updated_at: parse_timestamp(&updated_raw)?,
    })
}

/// Insert a newly captured signal (status QUEUED)
pub async fn insert_signal(
    pool: &SqlitePool,
    user_id: Uuid,
    kind: SignalKind,
    channel: CaptureChannel,
    raw_content: &str,
    url: Option<&str>,
) -> Result<Signal> {
    let id = Uuid::new_v4();
    let now = now_text();

    sqlx::query(
        r#"
        INSERT INTO signals (
            id, user_id, kind, channel, raw_content, url,
            topics, status, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, '[]', 'QUEUED', ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(user_id.to_string())
    .bind(kind.as_str())
    .bind(channel.as_str())
    .bind(raw_content)
    .bind(url)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_signal(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("signal {id} vanished after insert"))
}

/// Fetch one signal by id
pub async fn get_signal(pool: &SqlitePool, id: Uuid) -> Result<Option<Signal>> {
    let row = sqlx::query("SELECT * FROM signals WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(signal_from_row).transpose()
}

/// List a user's signals, newest first
pub async fn list_for_user(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<Signal>> {
    let rows = sqlx::query("SELECT * FROM signals WHERE user_id = ? ORDER BY created_at DESC")
        .bind(user_id.to_string())
        .fetch_all(pool)
        .await?;
    rows.iter().map(signal_from_row).collect()
}

/// Store enrichment results and flip the signal to ENRICHED
pub async fn store_enrichment(
    pool: &SqlitePool,
    id: Uuid,
    title: Option<&str>,
    source: Option<&str>,
    content: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE signals
        SET title = ?, source = ?, content = ?, status = 'ENRICHED', updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(title)
    .bind(source)
    .bind(content)
    .bind(now_text())
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Store classification tags. Best-effort: topics are an enhancement only.
pub async fn set_topics(pool: &SqlitePool, id: Uuid, topics: &[String]) -> Result<()> {
    sqlx::query("UPDATE signals SET topics = ?, updated_at = ? WHERE id = ?")
        .bind(serde_json::to_string(topics)?)
        .bind(now_text())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Mark a signal's enrichment as failed (terminal)
pub async fn mark_failed(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE signals SET status = 'FAILED', updated_at = ? WHERE id = ?")
        .bind(now_text())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}
