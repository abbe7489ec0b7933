//! Error types for chat-relay.
//!
//! Every failure a caller can see is rendered as the same flat JSON envelope:
//! `{error, message?, details?, status?}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Not Found")]
    NotFound,

    #[error("API key not configured: set {env_var}")]
    MissingApiKey { env_var: String },

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Upstream request failed with status {status}")]
    Upstream { status: StatusCode, details: String },

    #[error("Invalid response format: {0}")]
    InvalidResponseFormat(String),

    #[error("Upstream request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error body returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorEnvelope {
    fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
            message: None,
            details: None,
            status: None,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Error {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::InvalidJson(_) | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Upstream { status, .. } => *status,
            Error::MissingApiKey { .. }
            | Error::InvalidResponseFormat(_)
            | Error::Http(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build the caller-facing envelope.
    ///
    /// With `expose_details`, server-side failures also carry the full error
    /// source chain in `details`.
    pub fn envelope(&self, expose_details: bool) -> ErrorEnvelope {
        let mut envelope = match self {
            Error::MethodNotAllowed => ErrorEnvelope::new("Method Not Allowed"),
            Error::NotFound => ErrorEnvelope::new("Not Found"),
            Error::MissingApiKey { env_var } => ErrorEnvelope::new("API key not configured")
                .with_message(format!(
                    "Set the {} environment variable on the server",
                    env_var
                )),
            Error::InvalidJson(e) => ErrorEnvelope::new("Invalid JSON").with_message(e.to_string()),
            Error::BadRequest(message) => {
                ErrorEnvelope::new("Invalid request").with_message(message.clone())
            }
            Error::Upstream { status, details } => ErrorEnvelope {
                status: Some(status.as_u16()),
                details: Some(details.clone()),
                ..ErrorEnvelope::new("Upstream request failed")
            },
            Error::InvalidResponseFormat(message) => {
                ErrorEnvelope::new("Invalid response format").with_message(message.clone())
            }
            Error::Http(e) => ErrorEnvelope::new("Internal server error").with_message(e.to_string()),
            Error::Internal(message) => {
                ErrorEnvelope::new("Internal server error").with_message(message.clone())
            }
        };

        if expose_details && envelope.details.is_none() && self.status_code().is_server_error() {
            envelope.details = Some(source_chain(self));
        }

        envelope
    }

    /// Render as a response, optionally with internal detail.
    pub fn into_response_with(self, expose_details: bool) -> Response {
        let status = self.status_code();
        (status, axum::Json(self.envelope(expose_details))).into_response()
    }
}

/// Render an error and all of its sources, outermost first.
fn source_chain(error: &dyn std::error::Error) -> String {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        self.into_response_with(false)
    }
}
