//! Integration tests for OllamaClassifier against a mock Ollama server.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use notebot_core::{Classifier, FallbackRules, OllamaClassifier};
use notebot_models::ClassificationSource;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn classifier(base_url: &str, timeout: Duration) -> OllamaClassifier {
    OllamaClassifier::new(
        base_url,
        "llama3.1",
        timeout,
        FallbackRules::new(0.5, "uncategorized"),
    )
    .unwrap()
}

fn existing(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn generate_reply(inner: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": "llama3.1",
        "response": inner,
        "done": true
    }))
}

#[tokio::test]
async fn test_model_classification() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "llama3.1",
            "stream": false,
            "format": "json"
        })))
        .respond_with(generate_reply(r#"{"category": "cooking", "confidence": 0.92}"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = classifier(&mock_server.uri(), Duration::from_secs(5))
        .classify("I tried a new pasta recipe today", &existing(&["cooking"]))
        .await;

    assert_eq!(result.category, "cooking");
    assert_eq!(result.confidence, 0.92);
    assert_eq!(result.source, ClassificationSource::Model);
}

#[tokio::test]
async fn test_server_error_falls_back() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = classifier(&mock_server.uri(), Duration::from_secs(5))
        .classify("Quarterly project deadline moved", &BTreeSet::new())
        .await;

    assert_eq!(result.category, "work");
    assert_eq!(result.confidence, 0.5);
    assert_eq!(result.source, ClassificationSource::Fallback);
}

#[tokio::test]
async fn test_unparseable_answer_falls_back() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(generate_reply("I think this is about cooking"))
        .mount(&mock_server)
        .await;

    let result = classifier(&mock_server.uri(), Duration::from_secs(5))
        .classify("the sky is blue", &BTreeSet::new())
        .await;

    assert_eq!(result.category, "uncategorized");
    assert_eq!(result.confidence, 0.0);
    assert!(result.is_fallback());
}

#[tokio::test]
async fn test_wrong_body_shape_falls_back() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "model not found" })))
        .mount(&mock_server)
        .await;

    let result = classifier(&mock_server.uri(), Duration::from_secs(5))
        .classify("hotel booking for the trip", &BTreeSet::new())
        .await;

    assert_eq!(result.category, "travel");
    assert!(result.is_fallback());
}

#[tokio::test]
async fn test_timeout_falls_back_within_bound() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            generate_reply(r#"{"category": "cooking", "confidence": 0.9}"#)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let started = Instant::now();
    let result = classifier(&mock_server.uri(), Duration::from_millis(300))
        .classify("new recipe idea", &BTreeSet::new())
        .await;

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(result.category, "cooking");
    assert!(result.is_fallback());
}

#[tokio::test]
async fn test_unreachable_endpoint_falls_back() {
    let uri = {
        let mock_server = MockServer::start().await;
        mock_server.uri()
    };

    let result = classifier(&uri, Duration::from_secs(2))
        .classify("remember to call mom", &BTreeSet::new())
        .await;

    assert_eq!(result.category, "ideas");
    assert!(result.is_fallback());
}

#[tokio::test]
async fn test_is_available() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": [] })))
        .mount(&mock_server)
        .await;

    assert!(classifier(&mock_server.uri(), Duration::from_secs(2)).is_available().await);

    let down = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&down)
        .await;

    assert!(!classifier(&down.uri(), Duration::from_secs(2)).is_available().await);
}
