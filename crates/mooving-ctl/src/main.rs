//! mooving-ctl: operator command-line interface for the registration backend.

use anyhow::{Context, Result};
use mooving_client::AdminApi;

mod cmd;

use cmd::broadcast::BroadcastArgs;
use cmd::http::Options;

fn print_usage() {
    println!("Usage: mooving-ctl [options] <command>");
    println!();
    println!("Commands:");
    println!("  health                    Check which backend host answers");
    println!("  registrations             List paid registrations");
    println!("  resend <id>               Resend the confirmation email of a registration");
    println!("  payment <session_id>      Verify a checkout session's payment");
    println!("  broadcast --subject <s> --message <m> [--to <id,id,...>]");
    println!("                            Email all (or the listed) registrations and follow progress");
    println!("  config                    Show the effective configuration");
    println!("  config init               Write the default config file if missing");
    println!();
    println!("Options:");
    println!("  --config <path>       Config file (default: $MOOVING_CONFIG or ~/.config/mooving/config.toml)");
    println!("  --primary <url>       Override the primary base URL");
    println!("  --fallback <url>      Override the fallback base URL");
    println!("  --timeout-ms <n>      Override the primary deadline");
}

/// Split global options from the command words.
fn parse_args(args: &[String]) -> Result<(Options, Vec<&str>)> {
    let mut opts = Options::default();
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                opts.config_path = Some(args.get(i).context("--config requires a value")?.into());
            }
            "--primary" => {
                i += 1;
                opts.primary = Some(args.get(i).context("--primary requires a value")?.clone());
            }
            "--fallback" => {
                i += 1;
                opts.fallback = Some(args.get(i).context("--fallback requires a value")?.clone());
            }
            "--timeout-ms" => {
                i += 1;
                opts.timeout_ms = Some(
                    args.get(i)
                        .context("--timeout-ms requires a value")?
                        .parse()
                        .context("--timeout-ms must be a number")?,
                );
            }
            // Everything after the command word belongs to the command.
            _ => {
                remaining.extend(args[i..].iter().map(String::as_str));
                break;
            }
        }
        i += 1;
    }
    Ok((opts, remaining))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (opts, remaining) = parse_args(&args)?;

    match remaining.as_slice() {
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            return Ok(());
        }
        ["config", "init"] => return cmd::config::cmd_config_init(),
        _ => {}
    }

    let config = cmd::http::load_config(&opts)?;
    let client = cmd::http::connect(&config)?;
    let api = AdminApi::new(client.clone());

    match remaining.as_slice() {
        ["health"] => cmd::health::cmd_health(&client, config.endpoints.probe_timeout_ms).await,
        ["registrations"] => cmd::registrations::cmd_registrations(&api).await,
        ["resend", id] => {
            let id = id.parse().context("registration id must be a number")?;
            cmd::registrations::cmd_resend(&api, id).await
        }
        ["payment", session_id] => cmd::registrations::cmd_payment(&api, session_id).await,
        ["broadcast", rest @ ..] => {
            let args = BroadcastArgs::parse(rest)?;
            cmd::broadcast::cmd_broadcast(client, config.broadcast.clone(), &args).await
        }
        ["config"] => cmd::config::cmd_config_show(&config),
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
