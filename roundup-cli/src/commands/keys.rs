//! Signing and key export commands

use anyhow::Result;
use colored::Colorize;

use roundup_core::services::LogEvent;

use super::{confirm, get_context, password_or_prompt};
use crate::output;

pub async fn sign_message(message: &str, password: Option<String>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let password = password_or_prompt(password, "Wallet password")?;
    let (public_key, signature) = ctx.sign_message(&password, message.as_bytes()).await?;
    ctx.log(LogEvent::new("message_signed").with_command("sign-message"));

    if json {
        println!(
            "{}",
            serde_json::json!({ "publicKey": public_key, "signature": signature })
        );
    } else {
        println!("Public key: {}", public_key);
        println!("Signature:  {}", signature);
    }
    Ok(())
}

pub async fn export_key(password: Option<String>, force: bool) -> Result<()> {
    let ctx = get_context()?;

    if !force && !confirm("Print the secret key of the active account to the terminal?")? {
        println!("Cancelled.");
        return Ok(());
    }

    let password = password_or_prompt(password, "Wallet password")?;
    let secret = ctx.export_private_key(&password).await?;
    ctx.log(LogEvent::new("key_exported").with_command("export-key"));

    output::warning("Anyone with this key controls the account's funds.");
    println!("{}", secret.as_str().bold());
    Ok(())
}
