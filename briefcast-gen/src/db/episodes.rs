//! Episode persistence and the atomic signal claim
//!
//! The claim is the pipeline's sole synchronization point: one transaction
//! inserts the episode row and flips every eligible signal to USED via a
//! conditional `UPDATE ... RETURNING`. Concurrent generation requests racing
//! over overlapping signals see each other's claims; the loser finds zero
//! eligible rows and the transaction rolls back without leaving an episode.

use anyhow::Result;
use briefcast_common::models::{Episode, EpisodeStatus, Segment, Signal};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{now_text, parse_string_list, parse_timestamp, parse_uuid};
use super::signals::signal_from_row;

/// Which signals a generation request targets
#[derive(Debug, Clone)]
pub enum SignalSelector {
    /// Explicit id set
    Ids(Vec<Uuid>),
    /// Everything captured at or after this instant
    Since(DateTime<Utc>),
    /// Every eligible signal the user has
    All,
}

fn episode_from_row(row: &SqliteRow) -> Result<Episode> {
    let id_raw: String = row.try_get("id")?;
    let user_raw: String = row.try_get("user_id")?;
    let status_raw: String = row.try_get("status")?;
    let topics_raw: String = row.try_get("topics")?;
    let period_start: Option<String> = row.try_get("period_start")?;
    let period_end: Option<String> = row.try_get("period_end")?;
    let created_raw: String = row.try_get("created_at")?;
    let updated_raw: String = row.try_get("updated_at")?;

    Ok(Episode {
        id: parse_uuid(&id_raw)?,
        user_id: parse_uuid(&user_raw)?,
        title: row.try_get("title")?,
        script: row.try_get("script")?,
        summary: row.try_get("summary")?,
        period_start: period_start.as_deref().map(parse_timestamp).transpose()?,
        period_end: period_end.as_deref().map(parse_timestamp).transpose()?,
        signal_count: row.try_get("signal_count")?,
        topics: parse_string_list(&topics_raw),
        voice_id: row.try_get("voice_id")?,
        audio_url: row.try_get("audio_url")?,
        duration_secs: row.try_get("duration_secs")?,
        status: EpisodeStatus::parse(&status_raw)
            .ok_or_else(|| anyhow::anyhow!("unknown episode status {status_raw:?}"))?,
        error: row.try_get("error")?,
        created_at: parse_timestamp(&created_raw)?,
        updated_at: parse_timestamp(&updated_raw)?,
    })
}

/// Atomically create a GENERATING episode and claim eligible signals for it.
///
/// Returns `None` (with nothing persisted) when the selector matches no
/// QUEUED/ENRICHED signal for the user.
pub async fn claim_signals(
    pool: &SqlitePool,
    user_id: Uuid,
    selector: &SignalSelector,
) -> Result<Option<(Uuid, Vec<Signal>)>> {
    let episode_id = Uuid::new_v4();
    let now = now_text();

    let mut tx = pool.begin().await?;

    // Episode row first so claimed signals can reference it
    sqlx::query(
        r#"
        INSERT INTO episodes (id, user_id, signal_count, topics, status, created_at, updated_at)
        VALUES (?, ?, 0, '[]', 'GENERATING', ?, ?)
        "#,
    )
    .bind(episode_id.to_string())
    .bind(user_id.to_string())
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    let base = r#"
        UPDATE signals
        SET status = 'USED', episode_id = ?, updated_at = ?
        WHERE user_id = ? AND status IN ('QUEUED', 'ENRICHED')
    "#;

    let rows = match selector {
        SignalSelector::Ids(ids) => {
            if ids.is_empty() {
                tx.rollback().await?;
                return Ok(None);
            }
            let placeholders = vec!["?"; ids.len()].join(", ");
            let sql = format!("{base} AND id IN ({placeholders}) RETURNING *");
            let mut query = sqlx::query(&sql)
                .bind(episode_id.to_string())
                .bind(&now)
                .bind(user_id.to_string());
            for id in ids {
                query = query.bind(id.to_string());
            }
            query.fetch_all(&mut *tx).await?
        }
        SignalSelector::Since(since) => {
            let sql = format!("{base} AND created_at >= ? RETURNING *");
            sqlx::query(&sql)
                .bind(episode_id.to_string())
                .bind(&now)
                .bind(user_id.to_string())
                .bind(since.to_rfc3339())
                .fetch_all(&mut *tx)
                .await?
        }
        SignalSelector::All => {
            let sql = format!("{base} RETURNING *");
            sqlx::query(&sql)
                .bind(episode_id.to_string())
                .bind(&now)
                .bind(user_id.to_string())
                .fetch_all(&mut *tx)
                .await?
        }
    };

    if rows.is_empty() {
        tx.rollback().await?;
        return Ok(None);
    }

    let signals: Vec<Signal> = rows
        .iter()
        .map(signal_from_row)
        .collect::<Result<Vec<_>>>()?;

    let period_start = signals.iter().map(|s| s.created_at).min();
    let period_end = signals.iter().map(|s| s.created_at).max();

    sqlx::query(
        r#"
        UPDATE episodes
        SET signal_count = ?, period_start = ?, period_end = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(signals.len() as i64)
    .bind(period_start.map(|t| t.to_rfc3339()))
    .bind(period_end.map(|t| t.to_rfc3339()))
    .bind(&now)
    .bind(episode_id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        episode_id = %episode_id,
        user_id = %user_id,
        signal_count = signals.len(),
        "Claimed signals for episode"
    );

    Ok(Some((episode_id, signals)))
}

/// Persist the synthesized script: segment batch + episode update to
/// SYNTHESIZING, in one transaction so the segment set is never partial.
pub async fn persist_script(
    pool: &SqlitePool,
    episode_id: Uuid,
    title: &str,
    script: &str,
    summary: Option<&str>,
    topics: &[String],
    segments: &[Segment],
) -> Result<()> {
    let now = now_text();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE episodes
        SET title = ?, script = ?, summary = ?, topics = ?, status = 'SYNTHESIZING', updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(title)
    .bind(script)
    .bind(summary)
    .bind(serde_json::to_string(topics)?)
    .bind(&now)
    .bind(episode_id.to_string())
    .execute(&mut *tx)
    .await?;

    super::segments::insert_batch(&mut tx, segments).await?;

    tx.commit().await?;
    Ok(())
}

/// Finalize a READY episode with its published audio
pub async fn finalize_ready(
    pool: &SqlitePool,
    episode_id: Uuid,
    audio_url: &str,
    duration_secs: f64,
    voice_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE episodes
        SET status = 'READY', audio_url = ?, duration_secs = ?, voice_id = ?, error = NULL,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(audio_url)
    .bind(duration_secs)
    .bind(voice_id)
    .bind(now_text())
    .bind(episode_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark the episode FAILED and release every claimed signal back to QUEUED
/// with its episode link cleared, in one transaction. The user's queue stays
/// intact for retry.
pub async fn fail_and_release(pool: &SqlitePool, episode_id: Uuid, error: &str) -> Result<()> {
    let now = now_text();
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE episodes SET status = 'FAILED', error = ?, updated_at = ? WHERE id = ?")
        .bind(error)
        .bind(&now)
        .bind(episode_id.to_string())
        .execute(&mut *tx)
        .await?;

    let released = sqlx::query(
        r#"
        UPDATE signals
        SET status = 'QUEUED', episode_id = NULL, updated_at = ?
        WHERE episode_id = ?
        "#,
    )
    .bind(&now)
    .bind(episode_id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::warn!(
        episode_id = %episode_id,
        released = released.rows_affected(),
        error,
        "Episode failed, signals released"
    );
    Ok(())
}

/// Fetch one episode by id
pub async fn get_episode(pool: &SqlitePool, id: Uuid) -> Result<Option<Episode>> {
    let row = sqlx::query("SELECT * FROM episodes WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(episode_from_row).transpose()
}

/// Recent READY episode summaries for continuity callbacks, newest first
pub async fn recent_summaries(pool: &SqlitePool, user_id: Uuid, limit: u32) -> Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT summary FROM episodes
        WHERE user_id = ? AND status = 'READY' AND summary IS NOT NULL
        ORDER BY created_at DESC
        LIMIT ?
        "#,
    )
    .bind(user_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .filter_map(|row| row.try_get::<Option<String>, _>("summary").ok().flatten())
        .collect())
}
