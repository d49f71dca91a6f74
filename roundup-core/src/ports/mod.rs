//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod approval;
mod ledger_client;
mod notifier;
mod store;

pub use approval::{Approval, ApprovalRequest, Approver};
pub use ledger_client::{LedgerClient, SignatureQuery};
pub use notifier::{Notification, Notifier};
pub use store::{KeyValueStore, KeyValueStoreExt, StoreKey, UpdateFn};
