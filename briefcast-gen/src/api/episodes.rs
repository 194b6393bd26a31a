//! Episode generation API handlers
//!
//! POST /episodes/generate, GET /episodes/:id

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use briefcast_common::models::Episode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::services::synthesis::{GenerateError, GenerateRequest};
use crate::AppState;

/// POST /episodes/generate request
#[derive(Debug, Deserialize)]
pub struct GenerateEpisodeRequest {
    pub user_id: Uuid,
    /// Explicit signal ids; takes precedence over `since`
    #[serde(default)]
    pub signal_ids: Option<Vec<Uuid>>,
    /// Time window start when no explicit ids are given
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// On-demand request (true) vs scheduled run (false)
    #[serde(default)]
    pub manual: bool,
}

/// POST /episodes/generate response
#[derive(Debug, Serialize)]
pub struct GenerateEpisodeResponse {
    pub episode_id: Uuid,
}

/// POST /episodes/generate
///
/// Runs the full generation pipeline. On failure the claimed signals are
/// already released; the error message is safe to surface to the user.
pub async fn generate_episode(
    State(state): State<AppState>,
    Json(request): Json<GenerateEpisodeRequest>,
) -> ApiResult<Json<GenerateEpisodeResponse>> {
    let generate = GenerateRequest {
        signal_ids: request.signal_ids,
        since: request.since,
        manual: request.manual,
    };

    let episode_id = state
        .generator
        .generate(request.user_id, &generate)
        .await
        .map_err(|err| match err {
            GenerateError::NoEligibleSignals => ApiError::Conflict(err.to_string()),
            GenerateError::LengthLimit | GenerateError::InvalidScript(_) => {
                ApiError::BadRequest(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        })?;

    Ok(Json(GenerateEpisodeResponse { episode_id }))
}

/// GET /episodes/:id
pub async fn get_episode(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Episode>> {
    let episode = crate::db::episodes::get_episode(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("episode {id}")))?;
    Ok(Json(episode))
}

/// Build episode routes
pub fn episode_routes() -> Router<AppState> {
    Router::new()
        .route("/episodes/generate", post(generate_episode))
        .route("/episodes/:id", get(get_episode))
}
