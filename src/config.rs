//! Configuration parsing and validation for chat-relay.
//!
//! A [`Config`] is built once at startup (from a TOML file, the environment,
//! or both) and handed to the server by reference. Nothing in the relay reads
//! process environment after that point.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub relay: RelayProfile,
    pub logging: LoggingConfig,
}

/// Deployment environment. Controls how much error detail reaches callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8888")
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Path the relay handler is mounted on
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub environment: Environment,
    /// Largest accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_listen() -> String {
    "127.0.0.1:8888".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            environment: Environment::default(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    /// Whether error responses may carry internal error detail.
    pub fn expose_error_details(&self) -> bool {
        self.environment != Environment::Production
    }
}

const REDACTED: &str = "[REDACTED]";

/// The upstream credential.
///
/// It is attached to the outbound request and nowhere else. Formatting or
/// serializing it yields `[REDACTED]`, so a config dump or a stray `{:?}` in
/// a log line cannot leak it. [`ApiKey::expose_secret`] is the single read
/// path and is called only when building the `Authorization` header.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(REDACTED)
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> serde::Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(ApiKey::from)
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// Where the relay's credential came from, reported by `chat-relay check`
/// and the startup warning. Never carries the key itself.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// `upstream.api_key` written out in the config file.
    Literal,
    /// `upstream.api_key` built from `${VAR}` references.
    EnvExpanded,
    /// No `api_key` in the file; read from the named `<PROVIDER>_API_KEY`.
    Convention(String),
    /// Nothing usable; chat requests will be answered with 500.
    None,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Literal => f.write_str("config file"),
            KeySource::EnvExpanded => f.write_str("config file (${VAR} expanded)"),
            KeySource::Convention(var) => write!(f, "environment ({})", var),
            KeySource::None => f.write_str("not configured"),
        }
    }
}

/// Upstream chat-completion provider.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Provider name, used for the `<PROVIDER>_API_KEY` convention and in logs
    pub provider: String,
    /// Base URL; the relay posts to `{url}/chat/completions`
    pub url: String,
    pub api_key: Option<ApiKey>,
    /// Overall request bound. `None` leaves it to the hosting environment.
    pub timeout: Option<Duration>,
    pub connect_timeout: Duration,
}

const DEFAULT_PROVIDER: &str = "deepseek";
const DEFAULT_UPSTREAM_URL: &str = "https://api.deepseek.com/v1";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            url: DEFAULT_UPSTREAM_URL.to_string(),
            api_key: None,
            timeout: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl UpstreamConfig {
    /// Full URL of the chat-completion endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.url.trim_end_matches('/'))
    }

    /// Name of the env var the key is read from when the config has none.
    pub fn key_env_var(&self) -> String {
        convention_env_var_name(&self.provider)
    }
}

/// Named starting points for a [`RelayProfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    #[default]
    Buffered,
    Streaming,
}

/// Behavioural defaults of one deployment.
///
/// Each field covers a point where deployments of the relay used to differ;
/// picking values here replaces keeping separate handler copies.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayProfile {
    pub default_model: String,
    /// Applied when the request carries no `stream` flag
    pub default_stream: bool,
    /// Reject buffered upstream bodies without a usable `choices[0].message`
    pub validate_upstream_shape: bool,
    pub default_max_tokens: u32,
    pub default_temperature: f64,
    /// Channel capacity, in chunks, between upstream reader and client body
    pub stream_buffer: usize,
}

/// Path of the built-in health endpoint.
pub const HEALTH_PATH: &str = "/health";

pub const MAX_TOKENS_RANGE: std::ops::RangeInclusive<u32> = 800..=2000;

impl RelayProfile {
    /// Streaming off, strict shape validation.
    pub fn buffered() -> Self {
        Self {
            default_model: "chat-default".to_string(),
            default_stream: false,
            validate_upstream_shape: true,
            default_max_tokens: 2000,
            default_temperature: 0.7,
            stream_buffer: 16,
        }
    }

    /// Streaming on by default for lower time-to-first-token.
    pub fn streaming() -> Self {
        Self {
            default_stream: true,
            ..Self::buffered()
        }
    }

    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::Buffered => Self::buffered(),
            Preset::Streaming => Self::streaming(),
        }
    }
}

impl Default for RelayProfile {
    fn default() -> Self {
        Self::buffered()
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' not set for '{field}': {message}")]
    EnvVar {
        var: String,
        field: String,
        message: String,
    },
}

/// Raw upstream section; `url` and `api_key` may still hold `${VAR}` references.
#[derive(Deserialize, Default)]
pub struct RawUpstreamConfig {
    provider: Option<String>,
    url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
}

/// Raw relay section: an optional preset plus per-field overrides.
#[derive(Deserialize, Default)]
pub struct RawRelayConfig {
    preset: Option<Preset>,
    default_model: Option<String>,
    default_stream: Option<bool>,
    validate_upstream_shape: Option<bool>,
    default_max_tokens: Option<u32>,
    default_temperature: Option<f64>,
    stream_buffer: Option<usize>,
}

impl RawRelayConfig {
    fn into_profile(self) -> RelayProfile {
        let mut profile = RelayProfile::from_preset(self.preset.unwrap_or_default());
        if let Some(model) = self.default_model {
            profile.default_model = model;
        }
        if let Some(stream) = self.default_stream {
            profile.default_stream = stream;
        }
        if let Some(validate) = self.validate_upstream_shape {
            profile.validate_upstream_shape = validate;
        }
        if let Some(max_tokens) = self.default_max_tokens {
            profile.default_max_tokens = max_tokens;
        }
        if let Some(temperature) = self.default_temperature {
            profile.default_temperature = temperature;
        }
        if let Some(buffer) = self.stream_buffer {
            profile.stream_buffer = buffer;
        }
        profile
    }
}

/// Raw configuration deserialized directly from TOML.
#[derive(Deserialize, Default)]
pub struct RawConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    upstream: RawUpstreamConfig,
    #[serde(default)]
    relay: RawRelayConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

/// Substitute `${VAR}` references in `upstream.url` or `upstream.api_key`.
///
/// `lookup` stands in for the process environment. A reference to an unset
/// variable is a config error naming `field`; a set-but-empty variable
/// expands to nothing and is left for the caller to judge.
fn expand_env_vars_with<F>(input: &str, field: &str, lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            field: field.to_string(),
            message: format!("Unclosed '${{' in value of '{}'", field),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                field: field.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            field: field.to_string(),
            message: format!("Environment variable '{}' is not set", var_name),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Derive the convention env var name holding a provider's API key.
///
/// - "deepseek" -> "DEEPSEEK_API_KEY"
/// - "open-router" -> "OPEN_ROUTER_API_KEY"
pub fn convention_env_var_name(provider: &str) -> String {
    let upper_snake = provider.to_uppercase().replace(['-', ' ', '.'], "_");
    format!("{}_API_KEY", upper_snake)
}

impl Config {
    /// Convert raw (deserialized) config to final config, resolving `${VAR}`
    /// references and the convention key through `lookup`.
    ///
    /// Key resolution order:
    /// - `api_key` containing `${VAR}`: expanded, source = `EnvExpanded`
    /// - literal `api_key`: used as is, source = `Literal`
    /// - absent: `<PROVIDER>_API_KEY`, source = `Convention(var)` or `None`
    ///
    /// A key that resolves to the empty string is dropped, so the handler
    /// answers `API key not configured` instead of calling upstream.
    pub fn from_raw_with<F>(raw: RawConfig, lookup: F) -> Result<(Self, KeySource), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = raw
            .upstream
            .provider
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());

        let url = match raw.upstream.url {
            Some(url) => expand_env_vars_with(&url, "upstream.url", &lookup)?,
            None => DEFAULT_UPSTREAM_URL.to_string(),
        };

        // An empty key is treated as no key, whichever way it was written.
        let (api_key, source) = match raw.upstream.api_key {
            Some(ref raw_key) if raw_key.contains("${") => {
                let expanded = expand_env_vars_with(raw_key, "upstream.api_key", &lookup)?;
                if expanded.is_empty() {
                    (None, KeySource::None)
                } else {
                    (Some(ApiKey::from(expanded)), KeySource::EnvExpanded)
                }
            }
            Some(raw_key) if raw_key.is_empty() => (None, KeySource::None),
            Some(raw_key) => (Some(ApiKey::from(raw_key)), KeySource::Literal),
            None => {
                let var_name = convention_env_var_name(&provider);
                match lookup(&var_name) {
                    Some(value) if !value.is_empty() => {
                        (Some(ApiKey::from(value)), KeySource::Convention(var_name))
                    }
                    _ => (None, KeySource::None),
                }
            }
        };

        let upstream = UpstreamConfig {
            provider,
            url,
            api_key,
            timeout: raw.upstream.timeout_secs.map(Duration::from_secs),
            connect_timeout: Duration::from_secs(
                raw.upstream
                    .connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
        };

        let config = Config {
            server: raw.server,
            upstream,
            relay: raw.relay.into_profile(),
            logging: raw.logging,
        };
        config.validate()?;

        Ok((config, source))
    }

    /// Parse configuration from a TOML string, resolving env references via `lookup`.
    pub fn parse_str_with<F>(content: &str, lookup: F) -> Result<(Self, KeySource), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
        Self::from_raw_with(raw, lookup)
    }

    /// Load configuration from a TOML file with environment variable expansion.
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<(Self, KeySource), ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str_with(&content, |name| std::env::var(name).ok())
    }

    /// Build configuration from defaults and the environment alone.
    pub fn from_env() -> Result<(Self, KeySource), ConfigError> {
        Self::from_raw_with(RawConfig::default(), |name| std::env::var(name).ok())
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.upstream.url.starts_with("http://") && !self.upstream.url.starts_with("https://")
        {
            return Err(ConfigError::Validation(format!(
                "upstream.url must be an http(s) URL, got '{}'",
                self.upstream.url
            )));
        }

        if !self.server.path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "server.path must start with '/', got '{}'",
                self.server.path
            )));
        }

        if self.server.path == HEALTH_PATH {
            return Err(ConfigError::Validation(format!(
                "server.path cannot be '{}', it is reserved for health checks",
                HEALTH_PATH
            )));
        }

        if !MAX_TOKENS_RANGE.contains(&self.relay.default_max_tokens) {
            return Err(ConfigError::Validation(format!(
                "relay.default_max_tokens must be within {}..={}, got {}",
                MAX_TOKENS_RANGE.start(),
                MAX_TOKENS_RANGE.end(),
                self.relay.default_max_tokens
            )));
        }

        if !(0.0..=2.0).contains(&self.relay.default_temperature) {
            return Err(ConfigError::Validation(format!(
                "relay.default_temperature must be within 0.0..=2.0, got {}",
                self.relay.default_temperature
            )));
        }

        if self.relay.stream_buffer == 0 {
            return Err(ConfigError::Validation(
                "relay.stream_buffer must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
