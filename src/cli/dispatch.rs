use anyhow::Result;

use super::commands::Commands;
use super::config::cmd_config;
use super::env::CliArgs;
use super::info::cmd_info;
use super::prompt::cmd_prompt;
use super::run::cmd_run;
use recast::LoadedConfig;

pub async fn dispatch(cli: &CliArgs, loaded: &LoadedConfig) -> Result<()> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, &loaded.config, cli.output.clone()).await,
        Commands::Prompt(args) => cmd_prompt(args),
        Commands::Config(args) => cmd_config(args, loaded, cli.output.clone()).await,
        Commands::Info => cmd_info(&loaded.config),
    }
}
