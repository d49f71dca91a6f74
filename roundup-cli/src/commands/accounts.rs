//! Accounts commands - list, derive and switch accounts

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use roundup_core::services::LogEvent;

use super::{get_context, password_or_prompt};
use crate::output;

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// List derived accounts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Derive the next account from the recovery phrase
    Add {
        /// Wallet password
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Make an account the active one
    Use {
        /// Account index
        index: u32,
    },
}

pub async fn run(command: AccountsCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        AccountsCommands::List { json } => {
            let accounts = ctx.accounts.accounts()?;
            let active = ctx.accounts.active_index()?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "accounts": accounts,
                        "activeIndex": active,
                    }))?
                );
                return Ok(());
            }

            if accounts.is_empty() {
                println!("No accounts. Run 'roundup init' first.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["", "Index", "Public key", "Derivation path"]);
            for account in &accounts {
                let marker = if Some(account.index) == active {
                    "*".green().to_string()
                } else {
                    String::new()
                };
                table.add_row(vec![
                    marker,
                    account.index.to_string(),
                    account.public_key.clone(),
                    account.derivation_path.clone(),
                ]);
            }
            println!("{}", table);
        }
        AccountsCommands::Add { password } => {
            let password = password_or_prompt(password, "Wallet password")?;
            let account = ctx.add_account(&password).await?;
            ctx.log(LogEvent::new("account_added").with_command("accounts add"));
            output::success(&format!("Added account #{}", account.index));
            println!("  {}", account.public_key);
        }
        AccountsCommands::Use { index } => {
            let account = ctx.accounts.set_active(index)?;
            ctx.log(LogEvent::new("account_switched").with_command("accounts use"));
            output::success(&format!("Active account is now #{}", account.index));
            println!("  {}", account.public_key);
        }
    }

    Ok(())
}
