use crate::client::ResilientClient;
use crate::config::{Config, get_config_path, load_config};
use crate::fallback::DEFAULT_VARIANT;
use crate::handler::ErrorContext;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "haulguard")]
#[command(about = "Resilient API calls for the transport marketplace")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call an endpoint through the resilience layer and print the outcome
    Probe {
        url: String,
        /// Fallback resource key (defaults to the URL)
        #[arg(long, short = 'k')]
        key: Option<String>,
        /// Fallback payload variant
        #[arg(long, default_value = DEFAULT_VARIANT)]
        variant: String,
        /// Field the JSON payload must contain (repeatable)
        #[arg(long = "required", short = 'r')]
        required: Vec<String>,
        /// Config file (defaults to ~/.haulguard/config.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Probe {
            url,
            key,
            variant,
            required,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            probe(&config, &url, key, &variant, &required).await?;
        }
        Commands::Config { config } => {
            let path = match config {
                Some(path) => path,
                None => get_config_path()?,
            };
            let loaded = load_config(Some(path.as_path()))?;
            info!(path = %path.display(), "effective configuration");
            println!(
                "{}",
                serde_json::to_string_pretty(&loaded).context("Failed to serialize config")?
            );
        }
    }

    Ok(())
}

async fn probe(
    config: &Config,
    url: &str,
    key: Option<String>,
    variant: &str,
    required: &[String],
) -> Result<()> {
    let client = ResilientClient::from_config(config);
    let context = ErrorContext::new(url, "cli")
        .with_fallback(key.unwrap_or_else(|| url.to_string()), variant);
    let required: Vec<&str> = required.iter().map(String::as_str).collect();

    let outcome = match client.get_json(url, &context, &required).await {
        Ok(data) => {
            info!(url, "probe succeeded");
            json!({ "ok": true, "data": data })
        }
        Err(response) => {
            warn!(url, "probe failed: {}", response.user_message);
            json!({ "ok": false, "response": response })
        }
    };

    let report = json!({
        "requestId": context.request_id,
        "outcome": outcome,
        "circuit": client.retry().circuit_breaker_state(&context.endpoint),
        "metrics": client.handler().error_metrics(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
