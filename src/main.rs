//! chat-relay - credential-injecting relay for chat-completion APIs
//!
//! Serves a single chat endpoint to browser clients and forwards requests
//! to the upstream provider with the server-side API key attached.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_relay::config::{Config, KeySource};

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(about = "Credential-injecting relay for chat-completion APIs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Path to configuration file (defaults and environment only when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration and report where the API key comes from
    Check {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn load_config(path: Option<&str>) -> anyhow::Result<(Config, KeySource)> {
    let loaded = match path {
        Some(path) => Config::from_file_with_env(path)?,
        None => Config::from_env()?,
    };
    Ok(loaded)
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("chat_relay={level},tower_http={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Log the resolved key source without the key itself.
fn report_key_source(config: &Config, source: &KeySource) {
    match source {
        KeySource::None => tracing::warn!(
            env_var = %config.upstream.key_env_var(),
            "No upstream API key configured - relay will reject all chat requests"
        ),
        source => tracing::info!(
            provider = %config.upstream.provider,
            key_source = %source,
            "Upstream API key configured"
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            let (mut config, key_source) = load_config(config.as_deref())?;
            init_tracing(&config.logging.level);

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                config.server.listen = addr;
            }

            report_key_source(&config, &key_source);
            tracing::info!(
                default_stream = config.relay.default_stream,
                validate_upstream_shape = config.relay.validate_upstream_shape,
                default_model = %config.relay.default_model,
                "Relay profile"
            );

            chat_relay::relay::run_server(config).await
        }

        Commands::Check { config } => {
            let (config, key_source) = load_config(config.as_deref())?;
            init_tracing(&config.logging.level);

            println!("Configuration OK");
            println!("  listen:    {}", config.server.listen);
            println!("  path:      {}", config.server.path);
            println!("  upstream:  {}", config.upstream.completions_url());
            println!("  api key:   {}", key_source);
            println!(
                "  profile:   stream={} validate={} model={} max_tokens={} temperature={}",
                config.relay.default_stream,
                config.relay.validate_upstream_shape,
                config.relay.default_model,
                config.relay.default_max_tokens,
                config.relay.default_temperature
            );

            if key_source == KeySource::None {
                tracing::warn!(
                    env_var = %config.upstream.key_env_var(),
                    "No upstream API key configured"
                );
            }
            Ok(())
        }
    }
}
