//! Signal capture API handlers
//!
//! POST /signals, POST /signals/:id/enrich, GET /signals

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use briefcast_common::models::{CaptureChannel, Signal, SignalStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::services::enricher::classify_input;
use crate::AppState;

/// POST /signals request
#[derive(Debug, Deserialize)]
pub struct CreateSignalRequest {
    pub user_id: Uuid,
    pub content: String,
    pub channel: CaptureChannel,
}

/// POST /signals response
#[derive(Debug, Serialize)]
pub struct CreateSignalResponse {
    pub signals: Vec<Signal>,
}

/// POST /signals
///
/// Classifies the capture (fanning out one signal per embedded URL on
/// non-email channels), persists the signals, and enqueues background
/// enrichment. Returns immediately; enrichment is asynchronous.
pub async fn create_signal(
    State(state): State<AppState>,
    Json(request): Json<CreateSignalRequest>,
) -> ApiResult<Json<CreateSignalResponse>> {
    if request.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".to_string()));
    }

    let new_signals = classify_input(&request.content, request.channel);
    let mut created = Vec::with_capacity(new_signals.len());

    for new_signal in new_signals {
        let signal = crate::db::signals::insert_signal(
            &state.db,
            request.user_id,
            new_signal.kind,
            request.channel,
            &new_signal.raw_content,
            new_signal.url.as_deref(),
        )
        .await?;

        state.enrichment.enqueue(signal.id);
        created.push(signal);
    }

    tracing::info!(
        user_id = %request.user_id,
        channel = request.channel.as_str(),
        count = created.len(),
        "Signals captured"
    );

    Ok(Json(CreateSignalResponse { signals: created }))
}

/// POST /signals/:id/enrich
///
/// Re-enqueue enrichment for a signal. Idempotent: already-enriched
/// signals are skipped by the worker.
pub async fn enrich_signal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let signal = crate::db::signals::get_signal(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("signal {id}")))?;

    if signal.status == SignalStatus::Used {
        return Err(ApiError::Conflict(format!(
            "signal {id} was already consumed by an episode"
        )));
    }

    state.enrichment.enqueue(id);
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "queued": true }))))
}

#[derive(Debug, Deserialize)]
pub struct ListSignalsQuery {
    pub user_id: Uuid,
}

/// GET /signals?user_id=
pub async fn list_signals(
    State(state): State<AppState>,
    Query(query): Query<ListSignalsQuery>,
) -> ApiResult<Json<Vec<Signal>>> {
    let signals = crate::db::signals::list_for_user(&state.db, query.user_id).await?;
    Ok(Json(signals))
}

/// Build signal routes
pub fn signal_routes() -> Router<AppState> {
    Router::new()
        .route("/signals", post(create_signal).get(list_signals))
        .route("/signals/:id/enrich", post(enrich_signal))
}
