//! Status command - show wallet status and summary

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use roundup_core::{Account, PendingTotal, Settings, VaultStatus};

use super::get_context;
use crate::output;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WalletStatus {
    vault: VaultStatus,
    active_account: Option<Account>,
    account_count: usize,
    settings: Settings,
    pending: Vec<PendingTotal>,
}

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let vault = ctx.vault.status()?;

    if !vault.initialized {
        if json {
            println!("{}", serde_json::to_string_pretty(&vault)?);
        } else {
            output::warning("No wallet yet. Run 'roundup init' to create one.");
        }
        return Ok(());
    }

    let status = WalletStatus {
        active_account: ctx.accounts.active_account().ok(),
        account_count: ctx.accounts.accounts()?.len(),
        settings: ctx.accounts.settings()?,
        pending: ctx.ledger.pending_by_asset()?,
        vault,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Wallet Status".bold());
    println!();

    let mut table = output::create_table();
    let lock_state = if status.vault.locked {
        "locked".yellow().to_string()
    } else {
        "unlocked".green().to_string()
    };
    table.add_row(vec!["Wallet".to_string(), lock_state]);
    table.add_row(vec!["Network".to_string(), status.settings.network.to_string()]);
    table.add_row(vec!["Accounts".to_string(), status.account_count.to_string()]);
    if let Some(account) = &status.active_account {
        table.add_row(vec![
            "Active account".to_string(),
            format!("#{} {}", account.index, account.public_key),
        ]);
    }
    let round_ups = if status.settings.round_up_enabled {
        format!("on, to nearest {}", output::amount(status.settings.round_up_granularity.value()))
    } else {
        "off".to_string()
    };
    table.add_row(vec!["Round-ups".to_string(), round_ups]);
    println!("{}", table);

    if !status.pending.is_empty() {
        println!();
        println!("{}", "Pending Round-ups".bold());
        for total in &status.pending {
            println!(
                "  {}: {} across {} transaction(s)",
                total.asset_type,
                output::amount(total.amount),
                total.count
            );
        }
    }

    Ok(())
}
