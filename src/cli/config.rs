use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use recast::{LoadedConfig, RecastConfig};
use tokio::fs;
use tracing::info;

use super::output::{print_structured, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (file plus environment overrides)
    Show,

    /// Print the configuration file path
    Path,

    /// Write the default configuration to the configuration file path
    Reset,
}

pub async fn cmd_config(args: ConfigArgs, loaded: &LoadedConfig, output: OutputFormat) -> Result<()> {
    let path = loaded.path.as_path();
    match args.action {
        ConfigAction::Show => {
            if !print_structured(&loaded.config, &output)? {
                println!("Current configuration ({}):", path.display());
                print!("{}", serde_yaml::to_string(&loaded.config)?);
            }
        }
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Reset => {
            save_config_file(path, &RecastConfig::default()).await?;
            println!(
                "Configuration reset to defaults and written to {}",
                path.display()
            );
        }
    }
    Ok(())
}

async fn save_config_file(path: &Path, config: &RecastConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = serde_yaml::to_string(config)?;
    fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write config file {}", path.display()))?;
    info!("Saved configuration to {}", path.display());
    Ok(())
}
