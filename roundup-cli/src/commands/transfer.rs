//! Send and history commands

use std::time::Duration;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::ValueEnum;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;

use roundup_core::services::{LogEvent, HISTORY_LIMIT_MAX};
use roundup_core::{ActivityEntry, AssetType, BalanceChange, TransferRequest};

use super::{confirm, get_context, password_or_prompt};
use crate::output;

/// Asset to send
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Asset {
    Native,
    Stable,
}

impl From<Asset> for AssetType {
    fn from(asset: Asset) -> Self {
        match asset {
            Asset::Native => AssetType::Native,
            Asset::Stable => AssetType::Stable,
        }
    }
}

pub async fn send(
    recipient: String,
    amount: Decimal,
    asset: Asset,
    password: Option<String>,
    yes: bool,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;
    let network = ctx.accounts.settings()?.network;
    let request = TransferRequest {
        recipient: recipient.trim().to_string(),
        amount,
        asset_type: asset.into(),
    };

    let prompt = format!(
        "Send {} {} to {} on the {} network?",
        output::amount(amount),
        request.asset_type,
        request.recipient,
        network
    );
    if !yes && !confirm(&prompt)? {
        println!("Cancelled.");
        return Ok(());
    }

    let password = password_or_prompt(password, "Wallet password")?;
    let spinner = if json {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);
        pb.set_message("Submitting transfer...");
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    };

    let result = ctx.send(&password, &request).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let event = LogEvent::new("transfer_submitted")
        .with_command("send")
        .with_network(network.as_str());
    let receipt = match result {
        Ok(receipt) => {
            ctx.log(event);
            receipt
        }
        Err(e) => {
            ctx.log(
                LogEvent::new("transfer_failed")
                    .with_command("send")
                    .with_network(network.as_str())
                    .with_error(e.code()),
            );
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
        return Ok(());
    }
    output::success(&format!(
        "Sent {} {} to {}",
        output::amount(receipt.amount),
        receipt.asset_type,
        output::short(&receipt.recipient)
    ));
    println!("Signature: {}", receipt.signature);
    Ok(())
}

fn when(timestamp: Option<i64>) -> String {
    timestamp
        .and_then(|t| Utc.timestamp_opt(t, 0).single())
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// `+1.5 native, -29.67 stable`
fn describe(changes: &[BalanceChange]) -> String {
    changes
        .iter()
        .map(|change| {
            let sign = if change.amount.is_sign_negative() { "" } else { "+" };
            format!("{}{} {}", sign, output::amount(change.amount), change.asset_type)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn status(entry: &ActivityEntry) -> String {
    if entry.failed {
        "failed".red().to_string()
    } else if entry.changes.is_empty() {
        "fee only".dimmed().to_string()
    } else {
        "ok".green().to_string()
    }
}

pub async fn history(limit: usize, json: bool) -> Result<()> {
    let ctx = get_context()?;
    if limit > HISTORY_LIMIT_MAX {
        output::warning(&format!("Showing at most {} transactions", HISTORY_LIMIT_MAX));
    }
    let entries = ctx.balance_service.recent_activity(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        output::info("No activity yet.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["When", "Signature", "Status", "Change"]);
    for entry in &entries {
        table.add_row(vec![
            when(entry.timestamp),
            output::short(&entry.signature),
            status(entry),
            describe(&entry.changes),
        ]);
    }
    println!("{}", table);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_signs_changes() {
        let changes = vec![
            BalanceChange {
                asset_type: AssetType::Stable,
                amount: Decimal::new(-2967, 2),
            },
            BalanceChange {
                asset_type: AssetType::Native,
                amount: Decimal::new(1500, 3),
            },
        ];
        assert_eq!(describe(&changes), "-29.67 stable, +1.5 native");
        assert_eq!(describe(&[]), "");
    }

    #[test]
    fn test_when_without_block_time() {
        assert_eq!(when(None), "-");
        assert_eq!(when(Some(0)), "1970-01-01 00:00");
    }

    #[test]
    fn test_asset_maps_to_core_type() {
        assert_eq!(AssetType::from(Asset::Stable), AssetType::Stable);
        assert_eq!(AssetType::from(Asset::Native), AssetType::Native);
    }
}
