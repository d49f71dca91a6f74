//! Pending round-up commands

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use roundup_core::services::LogEvent;

use super::get_context;
use crate::output;

#[derive(Subcommand)]
pub enum PendingCommands {
    /// List detected round-ups
    List {
        /// Include round-ups already processed
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a round-up as processed
    Mark {
        /// Transaction signature of the round-up
        signature: String,
    },
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::{TimeZone, Utc};
    if timestamp == 0 {
        return "-".to_string();
    }
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

pub fn run(command: PendingCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        PendingCommands::List { all, json } => {
            let candidates = if all {
                ctx.ledger.candidates()?
            } else {
                ctx.ledger.pending()?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&candidates)?);
                return Ok(());
            }

            if candidates.is_empty() {
                println!("No pending round-ups.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["Time", "Asset", "Amount", "Round-up", "Signature", "Status"]);
            for c in &candidates {
                let status = if c.processed {
                    "processed".dimmed().to_string()
                } else {
                    "pending".yellow().to_string()
                };
                table.add_row(vec![
                    format_timestamp(c.timestamp),
                    c.asset_type.to_string(),
                    output::amount(c.original_amount),
                    output::amount(c.round_up_amount),
                    c.signature.clone(),
                    status,
                ]);
            }
            println!("{}", table);

            println!();
            for total in ctx.ledger.pending_by_asset()? {
                println!(
                    "  Pending {}: {}",
                    total.asset_type,
                    output::amount(total.amount).bold()
                );
            }
        }
        PendingCommands::Mark { signature } => {
            if ctx.ledger.mark_processed(&signature)? {
                ctx.log(LogEvent::new("round_up_processed").with_command("pending mark"));
                output::success(&format!("Marked {} as processed", output::short(&signature)));
            } else {
                anyhow::bail!("No round-up recorded for that signature");
            }
        }
    }

    Ok(())
}
