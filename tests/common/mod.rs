//! Shared helpers for relay integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use http::Request;
use tower::ServiceExt;

use chat_relay::config::{ApiKey, Config, Environment, RelayProfile, UpstreamConfig};
use chat_relay::relay::{create_router, AppState};

/// Secret used by every test that configures a key.
pub const TEST_SECRET: &str = "sk-test-0123456789abcdef-secret";

/// Build a config pointing at `upstream_url` (a base URL ending in `/v1`).
pub fn test_config(upstream_url: &str, api_key: Option<&str>, relay: RelayProfile) -> Config {
    let mut config = Config {
        upstream: UpstreamConfig {
            url: upstream_url.to_string(),
            api_key: api_key.map(ApiKey::from),
            ..UpstreamConfig::default()
        },
        relay,
        ..Config::default()
    };
    config.server.environment = Environment::Production;
    config
}

pub fn app(config: Config) -> axum::Router {
    create_router(AppState::new(config).expect("build app state"))
}

/// Send a request with the given method and raw body through the router.
pub async fn send(app: axum::Router, method: &str, body: impl Into<Body>) -> Response {
    let request = Request::builder()
        .method(method)
        .uri("/")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: axum::Router, body: &serde_json::Value) -> Response {
    send(app, "POST", serde_json::to_vec(body).unwrap()).await
}

pub async fn read_body(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
}

/// Parse the response body as JSON and return (status_code, json_value).
pub async fn parse_body(response: Response) -> (http::StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = read_body(response).await;
    let json = serde_json::from_slice(&bytes).unwrap_or_default();
    (status, json)
}

/// Assert the three CORS headers are present.
pub fn assert_cors(response: &Response) {
    let headers = response.headers();
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    assert_eq!(
        headers.get("access-control-allow-headers").unwrap(),
        "Content-Type, Authorization"
    );
    assert_eq!(
        headers.get("access-control-allow-methods").unwrap(),
        "POST, OPTIONS"
    );
}

pub fn chat_body() -> serde_json::Value {
    serde_json::json!({
        "messages": [
            {"role": "system", "content": "You are terse."},
            {"role": "user", "content": "Say hi"}
        ]
    })
}

/// Minimal well-formed completion document.
pub fn completion_document() -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "deepseek-chat",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "hi"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 1, "total_tokens": 11}
    })
}

/// A port nothing is listening on.
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// In-memory sink for tracing output.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Install a thread-local subscriber writing everything into a [`LogCapture`].
pub fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}
