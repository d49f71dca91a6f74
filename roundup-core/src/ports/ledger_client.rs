//! Remote ledger port
//!
//! Queries against the chain plus submission of signed transfers. The scanner,
//! the balance service and the transfer service depend on this trait; adapters
//! talk JSON-RPC or serve simulated activity.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::result::Result;
use crate::domain::{SignatureInfo, TokenAccount, TransactionDetail};

/// Page bounds for a signature listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureQuery {
    pub limit: usize,
    /// Only signatures older than this one
    pub before: Option<String>,
    /// Only signatures newer than this one
    pub until: Option<String>,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Adapter name for logs (e.g. "rpc", "simulated")
    fn name(&self) -> &str;

    /// Signatures touching `address`, newest first
    async fn list_signatures(
        &self,
        address: &str,
        query: &SignatureQuery,
    ) -> Result<Vec<SignatureInfo>>;

    /// Balance snapshots of one transaction; `None` if the ledger no longer has it
    async fn fetch_transaction_detail(&self, signature: &str) -> Result<Option<TransactionDetail>>;

    /// Native balance in whole coins
    async fn get_balance(&self, address: &str) -> Result<Decimal>;

    /// Sum of `owner`'s token accounts for `mint`, scaled by the mint's decimals
    async fn get_token_balance(&self, owner: &str, mint: &str) -> Result<Decimal>;

    /// `owner`'s token account for `mint`, the largest if it has several
    async fn find_token_account(&self, owner: &str, mint: &str) -> Result<Option<TokenAccount>>;

    /// Base58 blockhash to build a transaction against
    async fn latest_blockhash(&self) -> Result<String>;

    /// Submit a signed, serialized transaction; returns its signature
    ///
    /// A ledger that refuses the transaction answers `TransactionRejected`.
    async fn submit_transaction(&self, transaction: &[u8]) -> Result<String>;
}
