//! Outbound HTTP client tests against mock servers
//!
//! Exercises the real wire shapes: the messages API request/response for
//! text generation, speech synthesis audio bytes, and the storage PUT.

use briefcast_common::config::{StorageConfig, TextGenConfig, TtsConfig};
use briefcast_gen::services::llm_client::{AnthropicTextGen, TextGenRequest, TextGenerator};
use briefcast_gen::services::publisher::{publish_episode_audio, HttpObjectStore};
use briefcast_gen::services::tts_client::{ElevenLabsClient, SpeechSynthesizer, TtsError};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn text_gen_config(server: &MockServer) -> TextGenConfig {
    TextGenConfig {
        api_base: server.uri(),
        api_key: "test-key".to_string(),
        ..TextGenConfig::default()
    }
}

#[tokio::test]
async fn messages_api_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({ "max_tokens": 8192 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                { "type": "text", "text": "Good morning. " },
                { "type": "text", "text": "Here is your briefing." }
            ],
            "stop_reason": "end_turn"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = AnthropicTextGen::new(&text_gen_config(&server));
    let output = client
        .generate(&TextGenRequest {
            system: "You narrate briefings.".to_string(),
            prompt: "Write one.".to_string(),
            max_tokens: 8192,
            fast: false,
        })
        .await
        .unwrap();

    // Content blocks concatenate positionally
    assert_eq!(output.text, "Good morning. Here is your briefing.");
    assert!(!output.truncated_by_length());
}

#[tokio::test]
async fn length_stop_reason_survives_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "cut off mid" }],
            "stop_reason": "max_tokens"
        })))
        .mount(&server)
        .await;

    let client = AnthropicTextGen::new(&text_gen_config(&server));
    let output = client
        .generate(&TextGenRequest {
            system: String::new(),
            prompt: "p".to_string(),
            max_tokens: 16,
            fast: false,
        })
        .await
        .unwrap();
    assert!(output.truncated_by_length());
}

#[tokio::test]
async fn rate_limit_maps_to_retryable_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = AnthropicTextGen::new(&text_gen_config(&server));
    let err = client
        .generate(&TextGenRequest {
            system: String::new(),
            prompt: "p".to_string(),
            max_tokens: 16,
            fast: false,
        })
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn speech_synthesis_returns_audio_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/voice-a"))
        .and(header("xi-api-key", "tts-key"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3audio".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let client = ElevenLabsClient::new(&TtsConfig {
        api_base: server.uri(),
        api_key: "tts-key".to_string(),
        ..TtsConfig::default()
    });

    let audio = client.synthesize_chunk("Hello there.", "voice-a").await.unwrap();
    assert_eq!(audio, b"ID3audio");
}

#[tokio::test]
async fn empty_speech_response_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = ElevenLabsClient::new(&TtsConfig {
        api_base: server.uri(),
        ..TtsConfig::default()
    });

    let err = client.synthesize_chunk("text", "voice-a").await.unwrap_err();
    assert!(matches!(err, TtsError::EmptyAudio));
}

#[tokio::test]
async fn publish_puts_audio_and_returns_public_url() {
    let server = MockServer::start().await;
    let episode_id = Uuid::new_v4();

    Mock::given(method("PUT"))
        .and(path(format!("/episodes/{episode_id}.mp3")))
        .and(header("authorization", "Bearer store-token"))
        .and(header("content-type", "audio/mpeg"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = HttpObjectStore::new(&StorageConfig {
        endpoint: server.uri(),
        api_token: "store-token".to_string(),
        public_base: "https://cdn.test".to_string(),
        timeout_secs: 5,
    });

    let url = publish_episode_audio(&store, episode_id, b"mp3 bytes")
        .await
        .unwrap();
    assert_eq!(url, format!("https://cdn.test/episodes/{episode_id}.mp3"));
}

#[tokio::test]
async fn transient_upload_failure_is_retried() {
    let server = MockServer::start().await;
    let episode_id = Uuid::new_v4();

    // First attempt fails with a server error, the retry succeeds
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = HttpObjectStore::new(&StorageConfig {
        endpoint: server.uri(),
        api_token: String::new(),
        public_base: "https://cdn.test".to_string(),
        timeout_secs: 5,
    });

    let url = publish_episode_audio(&store, episode_id, b"bytes").await.unwrap();
    assert!(url.ends_with(".mp3"));
}
