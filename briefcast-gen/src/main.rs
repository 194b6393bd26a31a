//! briefcast-gen - Episode Generation Service
//!
//! Turns captured signals into narrated audio episodes: background signal
//! enrichment, crash-safe script synthesis, chunked speech synthesis, music
//! bed mixing, and storage publishing. Collaborators (dashboard, capture
//! channels, scheduler) talk to it over HTTP.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use briefcast_common::config::AppConfig;
use briefcast_gen::services::classifier::LlmTopicClassifier;
use briefcast_gen::services::enricher::SignalEnricher;
use briefcast_gen::services::fetcher::SafeFetcher;
use briefcast_gen::services::llm_client::AnthropicTextGen;
use briefcast_gen::services::mixer::AudioMixer;
use briefcast_gen::services::publisher::HttpObjectStore;
use briefcast_gen::services::subprocess::TokioRunner;
use briefcast_gen::services::synthesis::EpisodeGenerator;
use briefcast_gen::services::tts_client::{ElevenLabsClient, Narrator};
use briefcast_gen::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting briefcast-gen (Episode Generation)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(AppConfig::load()?);
    info!("Database: {}", config.database_path.display());

    let db = briefcast_common::db::init_pool(&config.database_path).await?;
    info!("Database connection established");

    // Outbound clients, constructed once and injected
    let text_gen = Arc::new(AnthropicTextGen::new(&config.text_gen));
    let speech = Arc::new(ElevenLabsClient::new(&config.tts));
    let narrator = Narrator::new(speech, config.tts.chunk_ceiling);
    let mixer = AudioMixer::new(Arc::new(TokioRunner), config.audio.clone());
    let store = Arc::new(HttpObjectStore::new(&config.storage));

    // Background enrichment worker pool
    let fetcher = SafeFetcher::new(&config.fetch);
    let classifier = Arc::new(LlmTopicClassifier::new(text_gen.clone()));
    let enricher = Arc::new(SignalEnricher::new(db.clone(), fetcher, classifier));
    let enrichment = enricher.spawn_workers();
    info!("Enrichment workers started");

    let generator = Arc::new(EpisodeGenerator::new(
        db.clone(),
        config.clone(),
        text_gen,
        narrator,
        mixer,
        store,
    ));

    let state = AppState::new(db, enrichment, generator);
    let app = briefcast_gen::build_router(state);

    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}");
    info!("Health check: http://{addr}/health");

    axum::serve(listener, app).await?;

    Ok(())
}
