//! User profile reads
//!
//! The dashboard owns user records; the pipeline reads the few fields it
//! needs for prompt framing and voice selection, falling back to defaults
//! when no row exists.

use anyhow::Result;
use briefcast_common::models::UserProfile;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

/// Fetch a user's profile, or defaults when unknown
pub async fn get_profile(pool: &SqlitePool, user_id: Uuid, default_voice: &str) -> Result<UserProfile> {
    let row = sqlx::query("SELECT * FROM users WHERE id = ?")
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(UserProfile::default_for(user_id, default_voice));
    };

    let id_raw: String = row.try_get("id")?;
    let voice: Option<String> = row.try_get("voice_id")?;

    Ok(UserProfile {
        id: parse_uuid(&id_raw)?,
        display_name: row.try_get("display_name")?,
        pronunciation: row.try_get("pronunciation")?,
        voice_id: voice.unwrap_or_else(|| default_voice.to_string()),
        length_tier: row.try_get("length_tier")?,
    })
}

/// Insert or update a profile (used by collaborators and tests)
pub async fn upsert_profile(pool: &SqlitePool, profile: &UserProfile) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (id, display_name, pronunciation, voice_id, length_tier)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            display_name = excluded.display_name,
            pronunciation = excluded.pronunciation,
            voice_id = excluded.voice_id,
            length_tier = excluded.length_tier
        "#,
    )
    .bind(profile.id.to_string())
    .bind(&profile.display_name)
    .bind(&profile.pronunciation)
    .bind(&profile.voice_id)
    .bind(&profile.length_tier)
    .execute(pool)
    .await?;
    Ok(())
}
