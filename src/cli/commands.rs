use clap::Subcommand;

use super::config::ConfigArgs;
use super::prompt::PromptArgs;
use super::run::RunArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the rewrite pipeline over a saved page with the offline backend
    Run(RunArgs),

    /// Print the model prompt built for a piece of text
    Prompt(PromptArgs),

    /// Manage Recast configuration
    Config(ConfigArgs),

    /// Show version, build and site information
    Info,
}
