//! RoundUp CLI - round-up wallet in your terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

mod commands;
mod output;

use commands::{
    accounts, balance, init, keys, logs, monitor, pending, request, settings, status, transfer, vault,
};

/// RoundUp - non-custodial round-up wallet
#[derive(Parser)]
#[command(name = "roundup", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a wallet, or restore one from a recovery phrase
    Init {
        /// Restore from this recovery phrase instead of generating one
        #[arg(long)]
        phrase: Option<String>,
        /// Read the recovery phrase from a file
        #[arg(long, conflicts_with = "phrase")]
        phrase_file: Option<PathBuf>,
        /// Wallet password
        #[arg(short, long)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Unlock the wallet
    Unlock {
        /// Wallet password
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Lock the wallet
    Lock,

    /// Change the wallet password
    ChangePassword {
        /// Current password
        #[arg(long)]
        old_password: Option<String>,
        /// New password
        #[arg(long)]
        new_password: Option<String>,
    },

    /// Show wallet status and summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage derived accounts
    Accounts {
        #[command(subcommand)]
        command: accounts::AccountsCommands,
    },

    /// Show or change round-up settings
    Settings {
        #[command(subcommand)]
        command: settings::SettingsCommands,
    },

    /// Scan the active account once for new round-ups
    Scan {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scan periodically until interrupted
    Monitor {
        /// Seconds between scans (defaults to the configured period)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Inspect and settle detected round-ups
    Pending {
        #[command(subcommand)]
        command: pending::PendingCommands,
    },

    /// Show balances of the active account
    Balance {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send native coin or stable tokens from the active account
    Send {
        /// Recipient address
        recipient: String,
        /// Amount in whole units (e.g. 1.5)
        amount: Decimal,
        #[arg(long, value_enum, default_value = "native")]
        asset: transfer::Asset,
        /// Wallet password
        #[arg(short, long)]
        password: Option<String>,
        /// Skip confirmation prompt
        #[arg(long, short)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show recent transactions of the active account
    History {
        /// Number of transactions
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Sign a message with the active account
    SignMessage {
        /// UTF-8 message to sign
        message: String,
        /// Wallet password
        #[arg(short, long)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the active account's secret key
    ExportKey {
        /// Wallet password
        #[arg(short, long)]
        password: Option<String>,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// Handle one wallet request given as JSON
    Request {
        /// Request JSON; read from stdin when omitted
        json: Option<String>,
        /// Origin making the request
        #[arg(long, default_value = "cli://local")]
        origin: String,
    },

    /// View application logs
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            output::error(&format!("Failed to start runtime: {}", e));
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { phrase, phrase_file, password, json } => {
            init::run(phrase, phrase_file, password, json).await
        }
        Commands::Unlock { password } => vault::unlock(password).await,
        Commands::Lock => vault::lock(),
        Commands::ChangePassword { old_password, new_password } => {
            vault::change_password(old_password, new_password).await
        }
        Commands::Status { json } => status::run(json),
        Commands::Accounts { command } => accounts::run(command).await,
        Commands::Settings { command } => settings::run(command),
        Commands::Scan { json } => monitor::scan(json).await,
        Commands::Monitor { interval } => monitor::run(interval).await,
        Commands::Pending { command } => pending::run(command),
        Commands::Balance { json } => balance::run(json).await,
        Commands::Send { recipient, amount, asset, password, yes, json } => {
            transfer::send(recipient, amount, asset, password, yes, json).await
        }
        Commands::History { limit, json } => transfer::history(limit, json).await,
        Commands::SignMessage { message, password, json } => {
            keys::sign_message(&message, password, json).await
        }
        Commands::ExportKey { password, force } => keys::export_key(password, force).await,
        Commands::Request { json, origin } => request::run(json, &origin).await,
        Commands::Logs { command } => logs::run(command),
    }
}
