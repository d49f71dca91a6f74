//! Lock, unlock and password commands

use anyhow::Result;
use zeroize::Zeroizing;

use roundup_core::services::LogEvent;

use super::{get_context, password_or_prompt};
use crate::output;

pub async fn unlock(password: Option<String>) -> Result<()> {
    let ctx = get_context()?;
    if !ctx.vault.is_initialized()? {
        anyhow::bail!("No wallet yet. Run 'roundup init' first.");
    }
    if !ctx.vault.is_locked()? {
        output::info("Wallet is already unlocked");
        return Ok(());
    }

    let password = password_or_prompt(password, "Wallet password")?;
    if let Err(e) = ctx.vault.unlock(&password).await {
        ctx.log(LogEvent::new("unlock_failed").with_command("unlock").with_error(e.to_string()));
        return Err(e.into());
    }
    ctx.log(LogEvent::new("wallet_unlocked").with_command("unlock"));
    output::success("Wallet unlocked");
    Ok(())
}

pub fn lock() -> Result<()> {
    let ctx = get_context()?;
    ctx.vault.lock()?;
    ctx.log(LogEvent::new("wallet_locked").with_command("lock"));
    output::success("Wallet locked");
    Ok(())
}

pub async fn change_password(old: Option<String>, new: Option<String>) -> Result<()> {
    let ctx = get_context()?;
    let old = password_or_prompt(old, "Current password")?;
    // ROUNDUP_PASSWORD only ever stands for the current password
    let new = match new {
        Some(p) => Zeroizing::new(p),
        None => prompt_new_password()?,
    };

    ctx.vault.change_password(&old, &new).await?;
    ctx.log(LogEvent::new("password_changed").with_command("change-password"));
    output::success("Password changed");
    Ok(())
}

fn prompt_new_password() -> Result<Zeroizing<String>> {
    if !atty::is(atty::Stream::Stdin) {
        anyhow::bail!("No new password given; pass --new-password");
    }
    let password = dialoguer::Password::new()
        .with_prompt("New password")
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()?;
    Ok(Zeroizing::new(password))
}
