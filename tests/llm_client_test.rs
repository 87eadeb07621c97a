//! Integration tests for the chat completions client
//!
//! Tests HTTP client behavior using wiremock for request/response mocking.

use std::time::Duration;

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use intelliagent::config::{LlmConfig, ModelConfig, RequestConfig};
use intelliagent::error::LlmError;
use intelliagent::llm::{ChatRequest, DecisionModel, GptModel, LlmClient, Message};
use intelliagent::ContextMap;

/// Create a test client pointing to mock server
fn create_test_client(base_url: &str, max_retries: u32) -> LlmClient {
    client_with_timeout(base_url, max_retries, 5000)
}

fn client_with_timeout(base_url: &str, max_retries: u32, timeout_ms: u64) -> LlmClient {
    let config = LlmConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
    };

    let request_config = RequestConfig {
        timeout_ms,
        max_retries,
        retry_delay_ms: 10,
    };

    LlmClient::new(&config, request_config).expect("Failed to create client")
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "model": "gpt-4",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 20, "completion_tokens": 10, "total_tokens": 30}
    })
}

#[tokio::test]
async fn test_successful_chat_call() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test-api-key"))
        .and(body_partial_json(json!({"model": "gpt-4", "temperature": 0.2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Hold.")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri(), 0);
    let request = ChatRequest::new("gpt-4", vec![Message::user("Buy?")]).with_temperature(0.2);
    let response = client.chat(request).await.unwrap();

    assert_eq!(response.completion(), Some("Hold."));
    assert_eq!(response.usage.and_then(|u| u.total_tokens), Some(30));
}

#[tokio::test]
async fn test_api_error_is_reported_after_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri(), 2);
    let err = client
        .chat(ChatRequest::new("gpt-4", vec![Message::user("Buy?")]))
        .await
        .unwrap_err();

    match err {
        LlmError::Unavailable { message, retries } => {
            assert_eq!(retries, 3);
            assert!(message.contains("500"));
            assert!(message.contains("upstream exploded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_response_reported_as_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("too late"))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&mock_server)
        .await;

    let client = client_with_timeout(&mock_server.uri(), 0, 50);
    let err = client
        .chat(ChatRequest::new("gpt-4", vec![Message::user("Buy?")]))
        .await
        .unwrap_err();

    match err {
        LlmError::Unavailable { message, retries } => {
            assert_eq!(retries, 1);
            assert_eq!(message, "Request timeout after 50ms");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_success_body_reported_as_invalid_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri(), 0);
    let err = client
        .chat(ChatRequest::new("gpt-4", vec![Message::user("Buy?")]))
        .await
        .unwrap_err();

    match err {
        LlmError::Unavailable { message, retries } => {
            assert_eq!(retries, 1);
            assert!(message.starts_with("Invalid response: "), "got {message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_retry_recovers_from_transient_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Sell.")))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri(), 1);
    let response = client
        .chat(ChatRequest::new("gpt-4", vec![Message::user("Sell?")]))
        .await
        .unwrap();
    assert_eq!(response.completion(), Some("Sell."));
}

#[tokio::test]
async fn test_gpt_model_parses_structured_decision() {
    let mock_server = MockServer::start().await;
    let content = "```json\n{\"decision\": \"Rebalance\", \"reasoning\": [\"drift is high\"], \"predictions\": [0.8, 0.9], \"confidence\": 0.85}\n```";

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(content)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let model = GptModel::new(
        create_test_client(&mock_server.uri(), 0),
        ModelConfig::default(),
    );
    let response = model
        .process_input("Should I rebalance?", &ContextMap::new())
        .await
        .unwrap();

    assert_eq!(response.decision, "Rebalance");
    assert_eq!(response.reasoning, vec!["drift is high".to_string()]);
    assert_eq!(response.predictions, vec![0.8, 0.9]);
    assert_eq!(response.confidence, Some(0.85));
}

#[tokio::test]
async fn test_gpt_model_plain_text_decision() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("  Wait a week.  ")))
        .mount(&mock_server)
        .await;

    let model = GptModel::new(
        create_test_client(&mock_server.uri(), 0),
        ModelConfig::default(),
    );
    let response = model.process_input("Buy now?", &ContextMap::new()).await.unwrap();

    assert_eq!(response.decision, "Wait a week.");
    assert!(response.reasoning.is_empty());
    assert!(response.predictions.is_empty());
}

#[tokio::test]
async fn test_gpt_model_empty_choices() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&mock_server)
        .await;

    let model = GptModel::new(
        create_test_client(&mock_server.uri(), 0),
        ModelConfig::default(),
    );
    let err = model
        .process_input("Buy now?", &ContextMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::InvalidResponse { .. }));
}
