//! briefcast-gen library interface
//!
//! Exposes the pipeline modules and router for integration testing.

pub mod api;
pub mod db;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::services::enricher::EnrichmentQueue;
use crate::services::synthesis::EpisodeGenerator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Handle to the background enrichment worker pool
    pub enrichment: EnrichmentQueue,
    /// Episode generation pipeline
    pub generator: Arc<EpisodeGenerator>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, enrichment: EnrichmentQueue, generator: Arc<EpisodeGenerator>) -> Self {
        Self {
            db,
            enrichment,
            generator,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::signal_routes())
        .merge(api::episode_routes())
        .merge(api::health_routes())
        .with_state(state)
}
