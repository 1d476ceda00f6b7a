//! Shared client construction for CLI commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use mooving_client::EndpointClient;
use mooving_core::MoovingConfig;

/// Global options accepted before the command name.
#[derive(Debug, Default)]
pub struct Options {
    pub config_path: Option<PathBuf>,
    pub primary: Option<String>,
    pub fallback: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Load config, then let command-line flags override it.
pub fn load_config(opts: &Options) -> Result<MoovingConfig> {
    let mut config = match &opts.config_path {
        Some(path) => MoovingConfig::load_from(path),
        None => MoovingConfig::load(),
    }
    .context("failed to load configuration")?;

    if let Some(primary) = &opts.primary {
        config.endpoints.primary = primary.clone();
    }
    if let Some(fallback) = &opts.fallback {
        config.endpoints.fallback = fallback.clone();
    }
    if let Some(ms) = opts.timeout_ms {
        config.endpoints.timeout_ms = ms;
    }
    Ok(config)
}

pub fn connect(config: &MoovingConfig) -> Result<EndpointClient> {
    let client = EndpointClient::from_config(config).context("invalid endpoint configuration")?;
    tracing::debug!(
        primary = %client.endpoints().primary(),
        fallback = %client.endpoints().fallback(),
        timeout_ms = config.endpoints.timeout_ms,
        "endpoint client ready"
    );
    Ok(client)
}
