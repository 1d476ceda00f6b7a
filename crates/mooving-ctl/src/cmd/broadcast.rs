//! Bulk email broadcast command.

use anyhow::{Context, Result, bail};
use mooving_client::{
    BroadcastError, BroadcastJob, BroadcastMonitor, BroadcastTarget, EndpointClient,
};
use mooving_core::BroadcastSettings;

/// Parsed `broadcast` arguments.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BroadcastArgs {
    pub subject: String,
    pub message: String,
    pub recipients: Option<Vec<u64>>,
}

impl BroadcastArgs {
    pub fn parse(args: &[&str]) -> Result<Self> {
        let mut parsed = BroadcastArgs::default();
        let mut i = 0;
        while i < args.len() {
            let flag = args[i];
            let value = args
                .get(i + 1)
                .with_context(|| format!("{flag} requires a value"))?;
            match flag {
                "--subject" => parsed.subject = value.to_string(),
                "--message" => parsed.message = value.to_string(),
                "--to" => parsed.recipients = Some(parse_ids(value)?),
                other => bail!("unknown broadcast option: {other}"),
            }
            i += 2;
        }
        Ok(parsed)
    }

    fn target(&self) -> BroadcastTarget {
        match &self.recipients {
            Some(ids) => BroadcastTarget::Recipients(ids.clone()),
            None => BroadcastTarget::AllRecipients,
        }
    }
}

fn parse_ids(list: &str) -> Result<Vec<u64>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .with_context(|| format!("invalid registration id: {s:?}"))
        })
        .collect()
}

pub async fn cmd_broadcast(
    client: EndpointClient,
    settings: BroadcastSettings,
    args: &BroadcastArgs,
) -> Result<()> {
    let monitor = BroadcastMonitor::new(client, settings);
    monitor.on_progress(print_progress).await;

    let job_id = monitor
        .submit(args.target(), &args.subject, &args.message)
        .await
        .context("broadcast not started")?;
    println!("Broadcast job {} submitted.", job_id);

    let outcome = tokio::select! {
        outcome = monitor.wait() => outcome,
        _ = tokio::signal::ctrl_c() => {
            monitor.cancel().await;
            println!("Stopped watching job {}; it keeps running on the server.", job_id);
            return Ok(());
        }
    };

    match outcome {
        Ok(job) => {
            println!("═══════════════════════════════════════");
            println!("  Broadcast {} finished", job.job_id);
            println!("═══════════════════════════════════════");
            println!("  Total  : {}", job.total);
            println!("  Sent   : {}", job.sent_count);
            println!("  Failed : {}", job.failed_count);
            Ok(())
        }
        Err(e @ BroadcastError::Poll { .. }) => {
            if let Some(last) = monitor.last_snapshot().await {
                eprintln!(
                    "Last known progress: {}/{} processed ({} failed).",
                    last.processed(),
                    last.total,
                    last.failed_count
                );
            }
            Err(e).context("lost track of broadcast job")
        }
        Err(e) => Err(e.into()),
    }
}

fn print_progress(job: &BroadcastJob) {
    match &job.current_recipient {
        Some(name) => println!(
            "  [{:>7}] {}/{} sent, {} failed — {}",
            format!("{:?}", job.status).to_lowercase(),
            job.sent_count,
            job.total,
            job.failed_count,
            name
        ),
        None => println!(
            "  [{:>7}] {}/{} sent, {} failed",
            format!("{:?}", job.status).to_lowercase(),
            job.sent_count,
            job.total,
            job.failed_count
        ),
    }
}
