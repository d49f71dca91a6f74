//! Core domain entities
//!
//! Pure data structures with validation logic - no I/O or external dependencies.

mod account;
pub mod chain;
mod cursor;
pub mod request;
mod round_up;
pub mod result;
pub mod secret;
pub mod settings;
pub mod transfer;
pub mod wire;

pub use account::{Account, DerivationPath, COIN_TYPE, HARDENED_OFFSET};
pub use chain::{
    ActivityEntry, BalanceChange, RawTransaction, SignatureInfo, TokenBalance, TransactionDetail,
};
pub use cursor::{ScanCursor, ScanCursors};
pub use request::{WalletRequest, WalletResponse};
pub use round_up::{AssetType, ClassifiedDelta, PendingTotal, RoundUpCandidate};
pub use secret::{EncryptedSecret, KdfParams, VaultStatus};
pub use settings::{Granularity, Network, Settings, SettingsUpdate};
pub use transfer::{TokenAccount, TransferReceipt, TransferRequest};
