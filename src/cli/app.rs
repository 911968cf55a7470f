use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info};

use super::dispatch::dispatch;
use super::env::CliArgs;
use super::output::OutputFormat;
use super::runtime::{init_logging, load_config};

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();
    init_logging(
        &cli.log_level,
        cli.debug,
        matches!(cli.output, OutputFormat::Json),
    )?;

    let loaded = load_config(cli.config.as_deref()).await?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %loaded.path.display(),
        "recast starting"
    );
    debug!(
        behavior = %loaded.config.initial_state.behavior_mode,
        mode = %loaded.config.initial_state.rewrite_mode,
        timeout_ms = loaded.config.rewrite_timeout_ms,
        "effective settings"
    );

    dispatch(&cli, &loaded).await.map_err(|err| {
        error!("recast failed: {err:#}");
        err
    })
}
