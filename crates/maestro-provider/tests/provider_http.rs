//! HTTP round-trip tests for the provider adapters against a mock server.
//!
//! Verifies request shape (headers, paths), response parsing, token
//! accounting, and cost computation for both the cloud and local adapters.

#![allow(clippy::unwrap_used)]

use maestro_provider::{CloudProvider, GenerateOptions, LocalProvider, ModelProvider};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Cloud adapter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cloud_generate_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"type": "text", "text": "Here is the plan."},
                {"type": "text", "text": " Done."}
            ],
            "model": "claude-3-5-sonnet-20241022",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1000, "output_tokens": 2000}
        })))
        .mount(&server)
        .await;

    let provider = CloudProvider::new("test-key").with_base_url(server.uri());
    let options = GenerateOptions {
        model: Some("claude-3-5-sonnet-20241022".to_string()),
        ..Default::default()
    };

    let generation = provider.generate("Plan the work", &options).await.unwrap();

    // Text blocks are concatenated in order.
    assert_eq!(generation.content, "Here is the plan. Done.");
    assert_eq!(generation.model, "claude-3-5-sonnet-20241022");
    assert_eq!(generation.tokens_input, 1000);
    assert_eq!(generation.tokens_output, 2000);
    assert_eq!(generation.finish_reason, "end_turn");
    // 1000 in at $0.003/1K + 2000 out at $0.015/1K
    assert!((generation.cost - 0.033).abs() < 1e-9);
}

#[tokio::test]
async fn test_cloud_sends_prompt_and_defaults() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({
            "max_tokens": 4096,
            "messages": [{"role": "user", "content": "Implement a parser"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "ok"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1, "output_tokens": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = CloudProvider::new("test-key").with_base_url(server.uri());
    provider
        .generate("Implement a parser", &GenerateOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cloud_api_error_surfaces() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"type": "rate_limit_error", "message": "slow down"}
        })))
        .mount(&server)
        .await;

    let provider = CloudProvider::new("test-key").with_base_url(server.uri());
    let err = provider
        .generate("anything", &GenerateOptions::default())
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("429"), "unexpected error: {message}");
    assert!(message.contains("rate_limit_error"));
}

#[tokio::test]
async fn test_cloud_unknown_model_billed_at_default_rates() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "hi"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 5000, "output_tokens": 5000}
        })))
        .mount(&server)
        .await;

    let provider = CloudProvider::new("test-key").with_base_url(server.uri());
    let options = GenerateOptions {
        model: Some("experimental-model".to_string()),
        ..Default::default()
    };
    let generation = provider.generate("hello", &options).await.unwrap();
    // 5000 in at $0.003/1K + 5000 out at $0.015/1K
    assert!((generation.cost - 0.09).abs() < 1e-9);
}

// ---------------------------------------------------------------------------
// Local adapter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_local_generate_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "codellama:7b",
            "stream": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "def add(a, b): return a + b",
            "prompt_eval_count": 40,
            "eval_count": 25,
            "done_reason": "stop"
        })))
        .mount(&server)
        .await;

    let provider = LocalProvider::new().with_base_url(server.uri());
    let generation = provider
        .generate("Write an add function", &GenerateOptions::default())
        .await
        .unwrap();

    assert_eq!(generation.content, "def add(a, b): return a + b");
    assert_eq!(generation.tokens_input, 40);
    assert_eq!(generation.tokens_output, 25);
    assert_eq!(generation.cost, 0.0);
    assert_eq!(generation.finish_reason, "stop");
}

#[tokio::test]
async fn test_local_error_surfaces() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"error": "model not loaded"})),
        )
        .mount(&server)
        .await;

    let provider = LocalProvider::new().with_base_url(server.uri());
    let err = provider
        .generate("anything", &GenerateOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("model not loaded"));
}

#[tokio::test]
async fn test_local_system_prompt_forwarded() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"system": "Be terse."})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "ok",
            "prompt_eval_count": 1,
            "eval_count": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = LocalProvider::new().with_base_url(server.uri());
    let options = GenerateOptions {
        system: Some("Be terse.".to_string()),
        ..Default::default()
    };
    provider.generate("hello", &options).await.unwrap();
}
