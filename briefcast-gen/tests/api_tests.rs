//! HTTP surface tests
//!
//! Drives the router directly with tower's oneshot: capture fan-out,
//! enrichment re-queueing, generation status mapping, and health.

mod helpers;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use briefcast_common::config::AppConfig;
use briefcast_gen::services::classifier::{ClassifyError, TopicClassification, TopicClassifier};
use briefcast_gen::services::enricher::SignalEnricher;
use briefcast_gen::services::fetcher::SafeFetcher;
use briefcast_gen::AppState;
use helpers::*;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;

struct StubClassifier;

#[async_trait]
impl TopicClassifier for StubClassifier {
    async fn classify(&self, _context: &str) -> Result<TopicClassification, ClassifyError> {
        Ok(TopicClassification {
            topics: vec!["test".to_string()],
            summary: String::new(),
            importance: "low".to_string(),
        })
    }
}

/// Router over a fresh database, with doubles behind every outbound seam
async fn test_app() -> (axum::Router, SqlitePool, TempDir) {
    let (dir, pool) = test_pool().await;
    let config = AppConfig::default();

    let generator = Arc::new(build_generator(
        pool.clone(),
        Arc::new(CannedGen::script()),
        Arc::new(StubSpeech),
        Arc::new(MemoryStore::default()),
    ));

    let enricher = Arc::new(SignalEnricher::new(
        pool.clone(),
        SafeFetcher::new(&config.fetch),
        Arc::new(StubClassifier),
    ));
    let enrichment = enricher.spawn_workers();

    let state = AppState::new(pool.clone(), enrichment, generator);
    (briefcast_gen::build_router(state), pool, dir)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _pool, _dir) = test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "briefcast-gen");
}

#[tokio::test]
async fn capture_fans_out_one_signal_per_url() {
    let (app, pool, _dir) = test_app().await;
    let user_id = Uuid::new_v4();

    let response = app
        .oneshot(post_json(
            "/signals",
            json!({
                "user_id": user_id,
                "channel": "WEB",
                "content": "worth a read: https://a.invalid/one and https://b.invalid/two"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let signals = body["signals"].as_array().unwrap();
    assert_eq!(signals.len(), 2);
    assert!(signals.iter().all(|s| s["kind"] == "LINK"));
    assert_eq!(signals[0]["url"], "https://a.invalid/one");
    assert_eq!(signals[1]["url"], "https://b.invalid/two");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM signals WHERE user_id = ?")
        .bind(user_id.to_string())
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn email_capture_stays_one_signal() {
    let (app, _pool, _dir) = test_app().await;

    let response = app
        .oneshot(post_json(
            "/signals",
            json!({
                "user_id": Uuid::new_v4(),
                "channel": "EMAIL",
                "content": "https://a.invalid/one https://b.invalid/two"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["signals"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_capture_is_rejected() {
    let (app, _pool, _dir) = test_app().await;

    let response = app
        .oneshot(post_json(
            "/signals",
            json!({ "user_id": Uuid::new_v4(), "channel": "WEB", "content": "   " }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn signal_listing_is_scoped_to_the_user() {
    let (app, pool, _dir) = test_app().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    seed_signal(&pool, alice, "alice's topic").await;
    seed_signal(&pool, bob, "bob's topic").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/signals?user_id={alice}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let signals = body.as_array().unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0]["raw_content"], "alice's topic");
}

#[tokio::test]
async fn enrich_requeues_and_accepts() {
    let (app, pool, _dir) = test_app().await;
    let id = seed_signal(&pool, Uuid::new_v4(), "still queued").await;

    let response = app
        .oneshot(post_json(&format!("/signals/{id}/enrich"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = body_json(response).await;
    assert_eq!(body["queued"], true);
}

#[tokio::test]
async fn enriching_unknown_signal_is_not_found() {
    let (app, _pool, _dir) = test_app().await;

    let response = app
        .oneshot(post_json(
            &format!("/signals/{}/enrich", Uuid::new_v4()),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn enriching_consumed_signal_conflicts() {
    let (app, pool, _dir) = test_app().await;
    let id = seed_signal(&pool, Uuid::new_v4(), "already used").await;
    sqlx::query("UPDATE signals SET status = 'USED' WHERE id = ?")
        .bind(id.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(&format!("/signals/{id}/enrich"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn generation_without_signals_conflicts() {
    let (app, _pool, _dir) = test_app().await;

    let response = app
        .oneshot(post_json(
            "/episodes/generate",
            json!({ "user_id": Uuid::new_v4(), "manual": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = body_json(response).await;
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("no eligible signals"));
}

#[tokio::test]
async fn generation_produces_fetchable_episode() {
    let (app, pool, _dir) = test_app().await;
    let user_id = Uuid::new_v4();
    seed_signal(&pool, user_id, "a topic to narrate").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/episodes/generate",
            json!({ "user_id": user_id, "manual": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let episode_id = body["episode_id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/episodes/{episode_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let episode = body_json(response).await;
    assert_eq!(episode["status"], "READY");
    assert_eq!(episode["title"], "Your Tuesday Briefing");
    assert!(episode["audio_url"].as_str().unwrap().ends_with(".mp3"));
}

#[tokio::test]
async fn fetching_unknown_episode_is_not_found() {
    let (app, _pool, _dir) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/episodes/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
