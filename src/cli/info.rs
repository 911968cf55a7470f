use anyhow::Result;
use recast::core_types::RewriteMode;
use recast::site_adapters::SiteKind;
use recast::RecastConfig;

pub fn cmd_info(config: &RecastConfig) -> Result<()> {
    println!("Recast System Information");
    println!("=========================");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Build date: {}", env!("RECAST_BUILD_DATE"));
    println!("Git commit: {}", env!("RECAST_GIT_HASH"));
    println!();

    println!("Sites (selection order):");
    for site in SiteKind::ALL {
        let status = if config.stubbed_sites.contains(&site) {
            "stubbed"
        } else {
            "enabled"
        };
        println!("  - {:<10} {}", site.name(), status);
    }
    println!();

    println!("Rewrite modes:");
    for mode in RewriteMode::ALL {
        println!("  - {:<10} {}", mode.as_str(), mode.label());
    }
    println!();

    let state = &config.initial_state;
    println!("Initial state:");
    println!("  enabled: {}", state.enabled);
    println!("  behavior: {}", state.behavior_mode);
    println!("  rewrite mode: {}", state.rewrite_mode);
    println!("Rewrite timeout: {} ms", config.rewrite_timeout_ms);
    Ok(())
}
