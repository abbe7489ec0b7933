//! Integration tests for the full Config::from_file_with_env pipeline.
//!
//! These tests exercise the end-to-end flow: TOML file -> raw parse -> env var
//! expansion -> final Config with KeySource metadata.
//!
//! Each test uses unique env var names to avoid parallel test interference.

use std::io::Write;

use chat_relay::config::{Config, ConfigError, Environment, KeySource};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp config");
    file.write_all(content.as_bytes()).expect("write temp config");
    file
}

#[test]
fn test_file_with_expanded_key() {
    let var_name = "CHAT_RELAY_E2E_EXPAND_KEY";
    std::env::set_var(var_name, "sk-expanded-from-env");

    let file = write_config(&format!(
        r#"
[server]
listen = "127.0.0.1:19876"
environment = "development"

[upstream]
provider = "deepseek"
api_key = "${{{}}}"

[relay]
preset = "streaming"
default_model = "deepseek-chat"
"#,
        var_name
    ));

    let (config, source) = Config::from_file_with_env(file.path()).expect("load config");
    assert_eq!(source, KeySource::EnvExpanded);
    assert_eq!(
        config.upstream.api_key.as_ref().unwrap().expose_secret(),
        "sk-expanded-from-env"
    );
    assert_eq!(config.server.environment, Environment::Development);
    assert!(config.relay.default_stream);
    assert_eq!(config.relay.default_model, "deepseek-chat");

    std::env::remove_var(var_name);
}

#[test]
fn test_file_with_convention_key() {
    // Provider name chosen so the convention var is unique to this test.
    let var_name = "RELAYTESTCONV_API_KEY";
    std::env::set_var(var_name, "sk-convention");

    let file = write_config(
        r#"
[upstream]
provider = "relaytestconv"
url = "https://relay-test.example/v1"
"#,
    );

    let (config, source) = Config::from_file_with_env(file.path()).expect("load config");
    assert_eq!(source, KeySource::Convention(var_name.to_string()));
    assert_eq!(
        config.upstream.api_key.as_ref().unwrap().expose_secret(),
        "sk-convention"
    );

    std::env::remove_var(var_name);
}

#[test]
fn test_file_with_missing_expansion_var() {
    let var_name = "CHAT_RELAY_E2E_DEFINITELY_MISSING";
    std::env::remove_var(var_name);

    let file = write_config(&format!(
        r#"
[upstream]
api_key = "${{{}}}"
"#,
        var_name
    ));

    let err = Config::from_file_with_env(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::EnvVar { .. }));
    assert!(err.to_string().contains(var_name));
}

#[test]
fn test_missing_file_is_io_error() {
    let err = Config::from_file_with_env("/nonexistent/chat-relay/config.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_invalid_toml_is_parse_error() {
    let file = write_config("[server\nlisten = ");
    let err = Config::from_file_with_env(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_debug_output_redacts_key() {
    let file = write_config(
        r#"
[upstream]
api_key = "sk-literal-should-not-print"
"#,
    );
    let (config, source) = Config::from_file_with_env(file.path()).expect("load config");
    assert_eq!(source, KeySource::Literal);
    let debug = format!("{:?}", config);
    assert!(!debug.contains("sk-literal-should-not-print"));
    assert!(debug.contains("[REDACTED]"));
}
