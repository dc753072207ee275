//! Gemini HTTP contract, exercised against a local wiremock server.

mod common;

use attendance_service::services::analysis::ANALYSIS_PROMPT;
use attendance_service::services::providers::gemini::{GeminiConfig, GeminiVisionProvider};
use attendance_service::services::providers::{ImageInput, ProviderError, VisionProvider};
use common::{image_form, png_bytes, test_config, TestApp};
use reqwest::StatusCode;
use secrecy::Secret;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL_PATH: &str = "/models/gemini-2.5-flash:generateContent";

fn provider_for(server: &MockServer, timeout: Duration) -> GeminiVisionProvider {
    GeminiVisionProvider::new(GeminiConfig {
        api_key: Secret::new("test-key".to_string()),
        model: "gemini-2.5-flash".to_string(),
        api_base: server.uri(),
        timeout,
    })
    .expect("Failed to build provider")
}

fn answer(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }],
        "usageMetadata": { "promptTokenCount": 270, "candidatesTokenCount": 31, "totalTokenCount": 301 }
    })
}

fn sample_image() -> ImageInput {
    ImageInput {
        mime_type: "image/png".to_string(),
        data: vec![0x89, b'P', b'N', b'G'],
    }
}

#[tokio::test]
async fn generate_sends_prompt_and_inline_image_with_key_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer("{\"ok\": true}")))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server, Duration::from_secs(5));
    let response = provider
        .generate("read the timeline", &sample_image())
        .await
        .expect("generate succeeds");

    assert_eq!(response.text, "{\"ok\": true}");
    assert_eq!(response.input_tokens, 270);
    assert_eq!(response.output_tokens, 31);

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
    assert!(requests[0].url.query().is_none(), "key must not be in the URL");

    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let parts = &body["contents"][0]["parts"];
    assert_eq!(body["contents"][0]["role"], "user");
    assert_eq!(parts[0]["text"], "read the timeline");
    assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
    assert_eq!(parts[1]["inline_data"]["data"], "iVBORw==");
}

#[tokio::test]
async fn rate_limit_maps_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota exhausted"))
        .expect(1)
        .mount(&server)
        .await;

    let err = provider_for(&server, Duration::from_secs(5))
        .generate("prompt", &sample_image())
        .await
        .unwrap_err();

    assert_eq!(err, ProviderError::RateLimited);
}

#[tokio::test]
async fn api_error_message_is_extracted_from_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT" }
        })))
        .mount(&server)
        .await;

    let err = provider_for(&server, Duration::from_secs(5))
        .generate("prompt", &sample_image())
        .await
        .unwrap_err();

    match err {
        ProviderError::ApiError(message) => {
            assert!(message.starts_with("Gemini API error 400"));
            assert!(message.ends_with("API key not valid. Please pass a valid API key."));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn slow_upstream_times_out_as_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(answer("late"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = provider_for(&server, Duration::from_secs(1))
        .generate("prompt", &sample_image())
        .await
        .unwrap_err();

    match err {
        ProviderError::NetworkError(message) => assert!(message.contains("timed out")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn service_relays_gemini_answer_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer(
            "```json\n{\"lastPunchIn\": \"01:05:00 PM\", \"syncedEffectiveHours\": \"4h 2m\", \"isActiveSession\": true}\n```",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let config = test_config(&[("GEMINI_API_KEY", "test-key"), ("GEMINI_API_BASE", &uri)]);
    let app = TestApp::spawn_from_config(config).await;

    let response = app.post_analyze(image_form(png_bytes(), "timeline.png")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({ "lastPunchIn": "01:05:00 PM", "syncedEffectiveHours": "4h 2m", "isActiveSession": true })
    );

    let requests = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["contents"][0]["parts"][0]["text"], ANALYSIS_PROMPT);
}

#[tokio::test]
async fn service_makes_exactly_one_call_when_gemini_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let config = test_config(&[("GEMINI_API_KEY", "test-key"), ("GEMINI_API_BASE", &uri)]);
    let app = TestApp::spawn_from_config(config).await;

    let response = app.post_analyze(image_form(png_bytes(), "timeline.png")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({ "error": "API error: Gemini API error 503 Service Unavailable: overloaded" })
    );
}
