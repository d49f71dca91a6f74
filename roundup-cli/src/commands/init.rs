//! Init command - create or restore a wallet

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use zeroize::Zeroizing;

use roundup_core::services::LogEvent;

use super::{get_context, new_password_or_prompt};
use crate::output;

pub async fn run(
    phrase: Option<String>,
    phrase_file: Option<PathBuf>,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;
    if ctx.vault.is_initialized()? {
        anyhow::bail!("A wallet already exists in this directory");
    }

    let phrase = match (phrase, phrase_file) {
        (Some(p), _) => Some(Zeroizing::new(p)),
        (None, Some(path)) => Some(Zeroizing::new(
            std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
        )),
        (None, None) => None,
    };
    let restoring = phrase.is_some();

    let password = new_password_or_prompt(password, "Choose a wallet password")?;
    let created = match ctx
        .create_wallet(phrase.as_deref().map(|p| p.as_str()), &password)
        .await
    {
        Ok(created) => created,
        Err(e) => {
            ctx.log(LogEvent::new("wallet_create_failed").with_command("init").with_error(e.to_string()));
            return Err(e.into());
        }
    };
    ctx.log(
        LogEvent::new(if restoring { "wallet_restored" } else { "wallet_created" })
            .with_command("init")
            .with_count(created.accounts.len()),
    );

    if json {
        let value = serde_json::json!({
            "accounts": created.accounts,
            "recoveryPhrase": created.generated_phrase.as_deref().map(|p| p.as_str()),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if let Some(generated) = &created.generated_phrase {
        println!("{}", "Recovery phrase".bold());
        println!();
        for (i, word) in generated.split_whitespace().enumerate() {
            println!("  {:>2}. {}", i + 1, word);
        }
        println!();
        output::warning("Write these words down. They are shown only once and are the only way to restore this wallet.");
        println!();
    }

    output::success(if restoring { "Wallet restored" } else { "Wallet created" });
    for account in &created.accounts {
        println!("  Account {}: {}", account.index, account.public_key);
    }
    Ok(())
}
