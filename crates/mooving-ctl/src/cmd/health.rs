//! Backend reachability command.

use std::time::Duration;

use anyhow::{Context, Result};
use mooving_client::{EndpointClient, Host};

pub async fn cmd_health(client: &EndpointClient, probe_timeout_ms: u64) -> Result<()> {
    let host = client
        .probe_health(Duration::from_millis(probe_timeout_ms))
        .await
        .context("neither primary nor fallback answered the health check")?;

    let endpoints = client.endpoints();
    println!("═══════════════════════════════════════");
    println!("  Backend Health");
    println!("═══════════════════════════════════════");
    println!("  Primary  : {}", endpoints.primary());
    println!("  Fallback : {}", endpoints.fallback());
    match host {
        Host::Primary => println!("  Serving  : primary"),
        Host::Fallback => println!("  Serving  : fallback (primary unreachable)"),
    }

    Ok(())
}
