use anyhow::Result;
use clap::Args;
use recast::core_types::RewriteMode;
use recast::rewrite_service::build_prompt;

#[derive(Args, Clone, Debug)]
pub struct PromptArgs {
    /// Text to rewrite
    pub text: String,

    /// Rewrite mode: tldr, debuzzword or brainrot
    #[arg(long, default_value = "tldr")]
    pub mode: RewriteMode,

    /// Platform the text comes from (linkedin selects HTML output rules)
    #[arg(long)]
    pub platform: Option<String>,
}

pub fn cmd_prompt(args: PromptArgs) -> Result<()> {
    println!(
        "{}",
        build_prompt(args.mode, &args.text, args.platform.as_deref())
    );
    Ok(())
}
