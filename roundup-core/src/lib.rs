//! RoundUp Core - non-custodial wallet and round-up accounting
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (Account, EncryptedSecret, RoundUpCandidate, etc.)
//! - **ports**: Trait definitions for external dependencies (KeyValueStore, LedgerClient)
//! - **services**: Key derivation, vault, scanner, round-up engine, ledger, monitor, transfers
//! - **adapters**: Concrete implementations (DuckDB, Solana JSON-RPC, simulated ledger)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use zeroize::Zeroizing;

use adapters::duckdb::DuckDbStore;
use adapters::simulated::SimulatedLedger;
use adapters::solana_rpc::SolanaRpcClient;
use config::Config;
use domain::result::Result;
use ports::{Approver, KeyValueStore, Notifier};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult};
pub use domain::{
    Account, ActivityEntry, AssetType, BalanceChange, EncryptedSecret, Network, PendingTotal,
    RoundUpCandidate, ScanCursor, Settings, SettingsUpdate, TransferReceipt, TransferRequest,
    VaultStatus, WalletRequest, WalletResponse,
};

pub const WALLET_DB: &str = "wallet.duckdb";

/// Outcome of wallet creation
pub struct CreatedWallet {
    /// Set only when the phrase was generated here and must be shown once
    pub generated_phrase: Option<Zeroizing<String>>,
    pub accounts: Vec<Account>,
}

/// Main context for wallet operations
///
/// Holds the store, configuration and every service wired to them.
pub struct WalletContext {
    pub config: Config,
    pub store: Arc<dyn KeyValueStore>,
    pub vault: SecretVault,
    pub accounts: AccountStore,
    pub ledger: RoundUpLedger,
    pub scanner: ChainScanner,
    pub balance_service: BalanceService,
    pub transfer_service: TransferService,
    pub logger: Option<Arc<LoggingService>>,
}

impl WalletContext {
    /// Open (or create) the wallet in `wallet_dir`
    pub fn new(wallet_dir: &Path, entry_point: EntryPoint) -> anyhow::Result<Self> {
        std::fs::create_dir_all(wallet_dir)
            .with_context(|| format!("Failed to create {}", wallet_dir.display()))?;
        let config = Config::load(wallet_dir)?;

        let store: Arc<dyn KeyValueStore> = Arc::new(DuckDbStore::new(&wallet_dir.join(WALLET_DB))?);
        let scanner = Self::default_scanner(&config)?;
        let logger =
            LoggingService::new(wallet_dir, entry_point, env!("CARGO_PKG_VERSION")).ok().map(Arc::new);

        Ok(Self::from_parts(config, store, scanner, logger))
    }

    /// Ledger clients for every network the config knows about
    pub fn default_scanner(config: &Config) -> anyhow::Result<ChainScanner> {
        let mut scanner =
            ChainScanner::new().with_client(Network::Simulated, Arc::new(SimulatedLedger::demo()));
        for network in [Network::Primary, Network::Test] {
            if let Some(url) = config.rpc_url(network) {
                let client = SolanaRpcClient::new(url, config.request_timeout)
                    .with_context(|| format!("Invalid RPC endpoint for {} network", network))?;
                scanner = scanner.with_client(network, Arc::new(client));
            }
        }
        Ok(scanner)
    }

    /// Wire services over an existing store and scanner
    pub fn from_parts(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        scanner: ChainScanner,
        logger: Option<Arc<LoggingService>>,
    ) -> Self {
        Self {
            vault: SecretVault::new(store.clone()),
            accounts: AccountStore::new(store.clone()),
            ledger: RoundUpLedger::new(store.clone()),
            balance_service: BalanceService::new(store.clone(), scanner.clone()),
            transfer_service: TransferService::new(scanner.clone()),
            config,
            store,
            scanner,
            logger,
        }
    }

    /// Seal a recovery phrase (generating one if none is given) and derive
    /// the initial accounts, all in one atomic write
    pub async fn create_wallet(&self, phrase: Option<&str>, password: &str) -> Result<CreatedWallet> {
        if self.vault.is_initialized()? {
            return Err(Error::validation("Wallet already exists"));
        }

        let (phrase, generated) = match phrase {
            Some(p) => (Zeroizing::new(p.trim().to_string()), false),
            None => (keys::generate_recovery_phrase()?, true),
        };
        if !keys::validate_recovery_phrase(&phrase) {
            return Err(Error::InvalidMnemonic);
        }

        let source = phrase.clone();
        let count = self.config.initial_accounts;
        let accounts = keys::blocking(move || keys::derive_accounts(&source, count)).await?;
        let settings = Settings {
            network: self.config.default_network,
            ..Settings::default()
        };
        let companions = AccountStore::initial_entries(&accounts, &settings)?;
        self.vault.create_wallet(&phrase, password, companions).await?;

        Ok(CreatedWallet {
            generated_phrase: generated.then_some(phrase),
            accounts,
        })
    }

    /// Derive and store the next account; needs the password to unseal the phrase
    pub async fn add_account(&self, password: &str) -> Result<Account> {
        let phrase = self.vault.reveal_mnemonic(password).await?;
        self.accounts.add_account(phrase).await
    }

    async fn active_keypair(&self, password: &str) -> Result<(Account, Keypair)> {
        if self.vault.is_locked()? {
            return Err(Error::WalletLocked);
        }
        let account = self.accounts.active_account()?;
        let phrase = self.vault.reveal_mnemonic(password).await?;
        let index = account.index;
        let keypair = keys::blocking(move || keys::derive_account_keypair(&phrase, index)).await?;
        Ok((account, keypair))
    }

    /// Base58 secret key of the active account
    pub async fn export_private_key(&self, password: &str) -> Result<Zeroizing<String>> {
        let (_, keypair) = self.active_keypair(password).await?;
        Ok(keys::export_private_key(&keypair))
    }

    /// Sign bytes with the active account; returns (public key, base58 signature)
    pub async fn sign_message(&self, password: &str, message: &[u8]) -> Result<(String, String)> {
        let (account, keypair) = self.active_keypair(password).await?;
        Ok((account.public_key, keys::sign_message(&keypair, message)))
    }

    /// Sign and submit a transfer from the active account on the configured network
    pub async fn send(&self, password: &str, request: &TransferRequest) -> Result<TransferReceipt> {
        let (_, keypair) = self.active_keypair(password).await?;
        let network = self.accounts.settings()?.network;
        self.transfer_service.send(&keypair, network, request).await
    }

    pub fn monitor(&self, notifier: Arc<dyn Notifier>) -> MonitorLoop {
        let monitor = MonitorLoop::new(self.store.clone(), self.scanner.clone(), notifier)
            .with_run_timeout(self.config.run_timeout);
        match &self.logger {
            Some(logger) => monitor.with_logger(logger.clone()),
            None => monitor,
        }
    }

    pub fn dispatcher(&self, approver: Arc<dyn Approver>) -> RequestDispatcher {
        let dispatcher = RequestDispatcher::new(self.store.clone(), approver)
            .with_timeout(self.config.request_timeout);
        match &self.logger {
            Some(logger) => dispatcher.with_logger(logger.clone()),
            None => dispatcher,
        }
    }

    /// Record an event, ignoring logging failures
    pub fn log(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            logger.log_quietly(event);
        }
    }
}
