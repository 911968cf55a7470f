use std::path::PathBuf;

use clap::Parser;

use super::commands::Commands;
use super::output::OutputFormat;

/// Rewrite social posts in a saved page through the recast content pipeline
#[derive(Parser)]
#[command(name = "recast", author, version, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// YAML config file (defaults to <config dir>/recast/config.yaml)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log filter level when RUST_LOG is unset
    #[arg(short, long, value_name = "LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// How command results are printed on stdout
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Human, global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}
