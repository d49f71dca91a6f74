//! Scan and monitor commands

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use roundup_core::services::monitor::{CancelToken, RunOutcome, SkipReason};
use roundup_core::services::{EntryPoint, LogEvent};

use super::{get_context, get_context_for, TerminalNotifier};
use crate::output;

fn skip_hint(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::Disabled => "Round-ups are turned off. Enable with 'roundup settings set --enabled true'.",
        SkipReason::Locked => "Wallet is locked. Run 'roundup unlock' first.",
        SkipReason::NoActiveAccount => "No active account. Run 'roundup init' first.",
    }
}

/// Cancel `token` on Ctrl-C
fn cancel_on_interrupt(token: &CancelToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

pub async fn scan(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let monitor = ctx.monitor(Arc::new(TerminalNotifier));
    let cancel = CancelToken::new();
    cancel_on_interrupt(&cancel);

    let spinner = if json {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);
        pb.set_message("Scanning recent activity...");
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    };

    let outcome = monitor.run_once(&cancel).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let outcome = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        RunOutcome::Skipped { reason } => output::warning(skip_hint(reason)),
        RunOutcome::Cancelled => output::warning("Scan cancelled"),
        RunOutcome::Completed(summary) => {
            println!("{}", "Scan complete".green());
            println!("  Transactions checked: {}", summary.scanned);
            println!("  Round-ups found: {}", summary.found);
            println!("  New: {}", summary.added);
            if summary.found > summary.added {
                println!("  Skipped: {} (already recorded)", summary.found - summary.added);
            }
        }
    }
    Ok(())
}

pub async fn run(interval: Option<u64>) -> Result<()> {
    let ctx = get_context_for(EntryPoint::Monitor)?;
    let period = interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or(ctx.config.monitor_period);

    let monitor = ctx.monitor(Arc::new(TerminalNotifier));
    let cancel = CancelToken::new();
    cancel_on_interrupt(&cancel);

    ctx.log(LogEvent::new("monitor_started").with_command("monitor"));
    output::info(&format!(
        "Watching the active account every {}s. Press Ctrl-C to stop.",
        period.as_secs()
    ));

    monitor.run_forever(period, &cancel).await;

    ctx.log(LogEvent::new("monitor_stopped").with_command("monitor"));
    println!("Stopped.");
    Ok(())
}
