use std::path::Path;

use anyhow::{Context, Result};
use recast::LoadedConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber; `json` switches stderr log lines to JSON.
pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    // stdout carries command output; logs go to stderr.
    let (plain, json) = if json {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .json(),
            ),
        )
    } else {
        (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        )
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(plain)
        .with(json)
        .init();

    Ok(())
}

pub async fn load_config(config_path: Option<&Path>) -> Result<LoadedConfig> {
    recast::load_config(config_path)
        .await
        .context("Failed to load configuration")
}
