//! Configuration commands.

use anyhow::{Context, Result};
use mooving_core::MoovingConfig;

pub fn cmd_config_init() -> Result<()> {
    let path =
        MoovingConfig::write_default_if_missing().context("failed to write default config")?;
    println!("Config file: {}", path.display());
    Ok(())
}

pub fn cmd_config_show(config: &MoovingConfig) -> Result<()> {
    println!("═══════════════════════════════════════");
    println!("  Effective Configuration");
    println!("═══════════════════════════════════════");
    println!("  primary        : {}", config.endpoints.primary);
    println!("  fallback       : {}", config.endpoints.fallback);
    println!("  timeout        : {}ms", config.endpoints.timeout_ms);
    println!("  probe timeout  : {}ms", config.endpoints.probe_timeout_ms);
    println!(
        "  api key        : {}",
        if config.auth.api_key.is_empty() { "(none)" } else { "(set)" }
    );
    println!("  poll interval  : {}ms", config.broadcast.poll_interval_ms);
    println!(
        "  poll failures  : {}",
        match config.broadcast.max_consecutive_poll_failures {
            0 => "unbounded".to_string(),
            n => n.to_string(),
        }
    );
    Ok(())
}
