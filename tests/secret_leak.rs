//! Credential leak checks.
//!
//! Runs the relay through success, error and streaming paths with a known
//! secret configured and asserts the secret never shows up in a response
//! body, a response header, or a captured log line.

mod common;

use axum::response::Response;
use http::StatusCode;
use serde_json::json;
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chat_relay::config::{Environment, RelayProfile};
use common::*;

/// Collect headers and body of a response into one string.
async fn dump(response: Response) -> String {
    let mut out = String::new();
    for (name, value) in response.headers() {
        out.push_str(name.as_str());
        out.push_str(": ");
        out.push_str(&String::from_utf8_lossy(value.as_bytes()));
        out.push('\n');
    }
    out.push_str(&String::from_utf8_lossy(&read_body(response).await));
    out
}

#[tokio::test]
async fn secret_never_leaves_the_server() {
    let (logs, _guard) = capture_logs();

    let server = MockServer::start().await;
    let bearer = format!("Bearer {}", TEST_SECRET);
    Mock::given(method("POST"))
        .and(header("authorization", bearer.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_document()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("authorization", bearer.as_str()))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("authorization", bearer.as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("data: {\"x\":1}\n\ndata: [DONE]\n\n", "text/event-stream"),
        )
        .mount(&server)
        .await;

    let url = format!("{}/v1", server.uri());
    let mut transcripts = Vec::new();

    // Buffered success, upstream error, streaming success.
    for body in [chat_body(), chat_body(), json!({"messages": [], "stream": true})] {
        let mut config = test_config(&url, Some(TEST_SECRET), RelayProfile::buffered());
        config.server.environment = Environment::Development;
        let response = post_json(app(config), &body).await;
        assert!(
            response.status() == StatusCode::OK || response.status() == StatusCode::TOO_MANY_REQUESTS
        );
        transcripts.push(dump(response).await);
    }

    // Local failures: bad JSON, wrong method, unreachable upstream.
    let mut config = test_config(&url, Some(TEST_SECRET), RelayProfile::buffered());
    config.server.environment = Environment::Development;
    transcripts.push(dump(send(app(config.clone()), "POST", "{oops").await).await);
    transcripts.push(dump(send(app(config), "GET", "").await).await);

    let dead_url = format!("http://127.0.0.1:{}/v1", closed_port().await);
    let mut config = test_config(&dead_url, Some(TEST_SECRET), RelayProfile::buffered());
    config.server.environment = Environment::Development;
    transcripts.push(dump(post_json(app(config), &chat_body()).await).await);

    for transcript in &transcripts {
        assert!(
            !transcript.contains(TEST_SECRET),
            "secret leaked in response: {}",
            transcript
        );
    }

    let log_output = logs.contents();
    assert!(
        log_output.contains("Received chat request"),
        "logs should have been captured: {}",
        log_output
    );
    assert!(
        !log_output.contains(TEST_SECRET),
        "secret leaked in logs: {}",
        log_output
    );
}

#[tokio::test]
async fn logs_carry_counts_not_message_content() {
    let (logs, _guard) = capture_logs();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_document()))
        .mount(&server)
        .await;

    let app = app(test_config(
        &format!("{}/v1", server.uri()),
        Some(TEST_SECRET),
        RelayProfile::buffered(),
    ));
    let body = json!({
        "messages": [
            {"role": "user", "content": "my-private-diary-entry"},
            {"role": "assistant", "content": "noted"},
            {"role": "user", "content": "another-private-line"}
        ]
    });
    let response = post_json(app, &body).await;
    assert_eq!(response.status(), StatusCode::OK);

    let output = logs.contents();
    assert!(output.contains("messages=3"), "{}", output);
    assert!(output.contains("stream=false"), "{}", output);
    assert!(!output.contains("my-private-diary-entry"));
    assert!(!output.contains("another-private-line"));
}
