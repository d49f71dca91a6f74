//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

pub mod accounts;
mod balance;
pub mod dispatcher;
pub mod keys;
pub mod ledger;
pub mod logging;
pub mod migration;
pub mod monitor;
pub mod round_up;
pub mod scanner;
pub mod transfer;
pub mod vault;

pub use accounts::AccountStore;
pub use balance::{AccountBalance, BalanceService, HISTORY_LIMIT, HISTORY_LIMIT_MAX};
pub use dispatcher::RequestDispatcher;
pub use keys::Keypair;
pub use ledger::RoundUpLedger;
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use monitor::{CancelToken, MonitorLoop, RunOutcome, RunSummary, SkipReason};
pub use round_up::{build_candidate, compute_round_up};
pub use scanner::{balance_changes, classify_delta, ChainScanner};
pub use transfer::TransferService;
pub use vault::SecretVault;
