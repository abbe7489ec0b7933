//! HTTP request handlers.

use axum::{
    body::Body,
    extract::{Extension, State},
    http::{header, HeaderName, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::Instrument;

use super::server::{AppState, RequestId};
use super::stream::relay_stream;
use super::types::{validate_completion_shape, ChatRequest, UpstreamRequest};
use crate::config::ApiKey;
use crate::error::{Error, Result};

/// Hint for nginx-style intermediaries not to buffer the event stream.
const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Handle POST on the relay path.
///
/// Every failure is turned into the JSON error envelope here, so nothing
/// escapes as a bare fault.
pub async fn chat(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: Body,
) -> Response {
    let span = tracing::info_span!("chat", request_id = %request_id.0);
    let expose_details = state.config.server.expose_error_details();

    match relay_chat(&state, body).instrument(span.clone()).await {
        Ok(response) => response,
        Err(e) => {
            let _guard = span.enter();
            if e.status_code().is_server_error() {
                tracing::error!(error = %e, status = e.status_code().as_u16(), "Chat request failed");
            } else {
                tracing::warn!(error = %e, status = e.status_code().as_u16(), "Chat request rejected");
            }
            e.into_response_with(expose_details)
        }
    }
}

/// Credential check, parse, forward, relay.
async fn relay_chat(state: &AppState, body: Body) -> Result<Response> {
    let upstream = &state.config.upstream;

    // No key, no work: checked before the body is read or anything is sent.
    let api_key = upstream.api_key.as_ref().ok_or_else(|| Error::MissingApiKey {
        env_var: upstream.key_env_var(),
    })?;

    let raw = axum::body::to_bytes(body, state.config.server.max_body_bytes)
        .await
        .map_err(|e| Error::BadRequest(format!("Failed to read request body: {}", e)))?;

    let request = ChatRequest::from_slice(&raw)?.normalize(&state.config.relay);

    tracing::info!(
        model = %request.model,
        messages = request.messages.len(),
        stream = request.stream,
        "Received chat request"
    );

    let upstream_response = send_upstream(state, api_key, &request).await?;

    if request.stream {
        Ok(streaming_response(
            upstream_response,
            state.config.relay.stream_buffer,
        ))
    } else {
        buffered_response(upstream_response, state.config.relay.validate_upstream_shape).await
    }
}

/// Issue the single upstream attempt and map non-2xx statuses.
async fn send_upstream(
    state: &AppState,
    api_key: &ApiKey,
    request: &UpstreamRequest,
) -> Result<reqwest::Response> {
    let upstream = &state.config.upstream;

    let response = state
        .http_client
        .post(upstream.completions_url())
        .header(header::CONTENT_TYPE, "application/json")
        .bearer_auth(api_key.expose_secret())
        .json(request)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, provider = %upstream.provider, "Failed to reach upstream");
            Error::Http(e)
        })?;

    let status = response.status();
    if !status.is_success() {
        let details = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, status = %status, "Failed to read upstream error body");
                String::new()
            }
        };
        tracing::error!(
            status = %status,
            provider = %upstream.provider,
            body = %details,
            "Upstream returned error"
        );
        return Err(Error::Upstream { status, details });
    }

    Ok(response)
}

/// Read the whole upstream document, optionally check its shape, and
/// re-serialize it for the caller.
async fn buffered_response(upstream: reqwest::Response, validate: bool) -> Result<Response> {
    let raw = upstream.bytes().await?;

    let document: serde_json::Value = serde_json::from_slice(&raw).map_err(|e| {
        tracing::error!(error = %e, bytes = raw.len(), "Upstream body is not JSON");
        Error::InvalidResponseFormat(format!("upstream body is not JSON: {}", e))
    })?;

    if validate {
        validate_completion_shape(&document).inspect_err(|e| {
            tracing::error!(error = %e, "Upstream completion has unexpected shape");
        })?;
    }

    let body = serde_json::to_vec(&document).map_err(|e| Error::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

/// Open the event stream to the caller and hand the upstream body to the relay task.
fn streaming_response(upstream: reqwest::Response, capacity: usize) -> Response {
    let (chunks, _outcome) = relay_stream(upstream.bytes_stream(), capacity);

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Body::from_stream(chunks),
    )
        .into_response()
}

/// Handle OPTIONS on the relay path (CORS preflight).
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Any method other than POST or OPTIONS on the relay path.
pub async fn method_not_allowed(method: Method) -> Response {
    tracing::debug!(method = %method, "Rejected method on relay path");
    Error::MethodNotAllowed.into_response()
}

/// Unknown paths.
pub async fn not_found() -> Response {
    Error::NotFound.into_response()
}

/// Handle GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chat-relay",
        "credential_configured": state.config.upstream.api_key.is_some(),
    }))
}
