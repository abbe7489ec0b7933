//! Chat request parsing and upstream body shapes.
//!
//! The relay treats messages and completion documents as opaque JSON; the
//! only structure it cares about is what it needs to pick defaults and to
//! decide whether a buffered upstream body is worth forwarding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RelayProfile;
use crate::error::{Error, Result};

/// Chat request as sent by the browser client. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<Value>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Body sent to the upstream chat-completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamRequest {
    pub model: String,
    pub messages: Vec<Value>,
    pub stream: bool,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// Parse a raw request body.
    ///
    /// Malformed JSON is [`Error::InvalidJson`]; well-formed JSON without a
    /// usable `messages` array, or with mistyped parameters, is
    /// [`Error::BadRequest`].
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body).map_err(Error::InvalidJson)?;

        let object = value
            .as_object()
            .ok_or_else(|| Error::BadRequest("request body must be a JSON object".to_string()))?;

        match object.get("messages") {
            Some(Value::Array(_)) => {}
            Some(_) => return Err(Error::BadRequest("`messages` must be an array".to_string())),
            None => return Err(Error::BadRequest("`messages` is required".to_string())),
        }

        serde_json::from_value(value).map_err(|e| Error::BadRequest(e.to_string()))
    }

    /// Fill in profile defaults for every parameter the client left out.
    pub fn normalize(self, profile: &RelayProfile) -> UpstreamRequest {
        UpstreamRequest {
            model: self
                .model
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| profile.default_model.clone()),
            messages: self.messages,
            stream: self.stream.unwrap_or(profile.default_stream),
            temperature: self.temperature.unwrap_or(profile.default_temperature),
            max_tokens: self.max_tokens.unwrap_or(profile.default_max_tokens),
        }
    }
}

/// Check that a buffered completion document carries at least one choice
/// with a message object.
pub fn validate_completion_shape(document: &Value) -> Result<()> {
    let choices = document
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::InvalidResponseFormat("missing `choices` array".to_string()))?;

    let first = choices
        .first()
        .ok_or_else(|| Error::InvalidResponseFormat("empty `choices` array".to_string()))?;

    if !first.get("message").is_some_and(Value::is_object) {
        return Err(Error::InvalidResponseFormat(
            "first choice has no `message` object".to_string(),
        ));
    }

    Ok(())
}
