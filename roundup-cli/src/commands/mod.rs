//! CLI command implementations

pub mod accounts;
pub mod balance;
pub mod init;
pub mod keys;
pub mod logs;
pub mod monitor;
pub mod pending;
pub mod request;
pub mod settings;
pub mod status;
pub mod transfer;
pub mod vault;

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use dialoguer::{Confirm, Password};
use zeroize::Zeroizing;

use roundup_core::ports::{Approval, ApprovalRequest, Approver, Notification, Notifier};
use roundup_core::services::EntryPoint;
use roundup_core::{Error, WalletContext};

/// Get the wallet directory from environment or default
pub fn get_wallet_dir() -> Result<PathBuf> {
    if let Ok(dir) = env::var("ROUNDUP_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".roundup"))
}

/// Open the wallet context for CLI operations
pub fn get_context() -> Result<WalletContext> {
    get_context_for(EntryPoint::Cli)
}

pub fn get_context_for(entry_point: EntryPoint) -> Result<WalletContext> {
    let wallet_dir = get_wallet_dir()?;
    WalletContext::new(&wallet_dir, entry_point).context("Failed to open wallet")
}

fn interactive() -> bool {
    atty::is(atty::Stream::Stdin)
}

/// Get password from --password flag, ROUNDUP_PASSWORD env var, or prompt
pub fn password_or_prompt(flag: Option<String>, prompt: &str) -> Result<Zeroizing<String>> {
    if let Some(p) = flag {
        return Ok(Zeroizing::new(p));
    }
    if let Ok(p) = env::var("ROUNDUP_PASSWORD") {
        return Ok(Zeroizing::new(p));
    }
    if !interactive() {
        anyhow::bail!("No password given; pass --password or set ROUNDUP_PASSWORD");
    }
    Ok(Zeroizing::new(Password::new().with_prompt(prompt).interact()?))
}

/// Like `password_or_prompt`, but a prompted password must be typed twice
pub fn new_password_or_prompt(flag: Option<String>, prompt: &str) -> Result<Zeroizing<String>> {
    if flag.is_some() || env::var("ROUNDUP_PASSWORD").is_ok() || !interactive() {
        return password_or_prompt(flag, prompt);
    }
    let password = Password::new()
        .with_prompt(prompt)
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()?;
    Ok(Zeroizing::new(password))
}

/// Ask a yes/no question; non-interactive sessions answer no
pub fn confirm(prompt: &str) -> Result<bool> {
    if !interactive() {
        return Ok(false);
    }
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

/// Prints monitor notifications to the terminal
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notification: &Notification) {
        println!("{} {}", notification.title.bold(), notification.message.green());
    }
}

/// Asks the person at the terminal to approve signing requests
pub struct PromptApprover;

#[async_trait]
impl Approver for PromptApprover {
    async fn request_approval(
        &self,
        request: &ApprovalRequest,
    ) -> roundup_core::domain::result::Result<Approval> {
        if !interactive() {
            return Ok(Approval::Rejected);
        }
        let request = request.clone();
        tokio::task::spawn_blocking(move || prompt_approval(&request))
            .await
            .map_err(|e| Error::validation(format!("Approval prompt failed: {}", e)))?
    }
}

fn prompt_approval(request: &ApprovalRequest) -> roundup_core::domain::result::Result<Approval> {
    let prompt_err = |e: dialoguer::Error| Error::validation(format!("Approval prompt failed: {}", e));

    println!("{}", "Signature request".bold());
    println!("  Origin:  {}", request.origin);
    println!("  Method:  {}", request.method);
    println!("  Account: {}", request.public_key);
    println!("  Payload: {}", request.summary);

    let approved = Confirm::new()
        .with_prompt("Approve this request?")
        .default(false)
        .interact()
        .map_err(prompt_err)?;
    if !approved {
        return Ok(Approval::Rejected);
    }

    let password = Password::new()
        .with_prompt("Wallet password")
        .interact()
        .map_err(prompt_err)?;
    Ok(Approval::Approved {
        password: Zeroizing::new(password),
    })
}
