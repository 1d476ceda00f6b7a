//! Paid registration, confirmation email, and payment commands.

use anyhow::{Context, Result};
use mooving_client::AdminApi;

pub async fn cmd_registrations(api: &AdminApi) -> Result<()> {
    let registrations = api
        .paid_registrations()
        .await
        .context("failed to load paid registrations")?;

    if registrations.is_empty() {
        println!("No paid registrations.");
        return Ok(());
    }

    let sent = registrations.iter().filter(|r| r.payment_email_sent).count();

    println!("═══════════════════════════════════════");
    println!("  Paid Registrations ({})", registrations.len());
    println!("  Emails sent {} / pending {}", sent, registrations.len() - sent);
    println!("═══════════════════════════════════════");

    for r in &registrations {
        let icon = if r.payment_email_sent { "✓" } else { "✗" };
        println!("  ┌─ {} #{} {}", icon, r.id, r.full_name);
        println!("  │  email  : {}", r.email);
        println!("  └─ number : {}", r.registration_number);
    }

    Ok(())
}

pub async fn cmd_resend(api: &AdminApi, registration_id: u64) -> Result<()> {
    api.resend_confirmation(registration_id)
        .await
        .with_context(|| format!("failed to resend email for registration {registration_id}"))?;
    println!("Confirmation email resent for registration {}.", registration_id);
    Ok(())
}

pub async fn cmd_payment(api: &AdminApi, session_id: &str) -> Result<()> {
    let status = api
        .verify_payment(session_id)
        .await
        .context("failed to verify payment")?;

    if status.paid {
        println!("Payment confirmed for session {}.", session_id);
    } else if status.status.is_empty() {
        println!("Payment not confirmed for session {}.", session_id);
    } else {
        println!(
            "Payment not confirmed for session {} (status: {}).",
            session_id, status.status
        );
    }
    Ok(())
}
