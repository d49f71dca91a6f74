//! Chain activity as seen by the scanner
//!
//! These are provider-neutral shapes; adapters map their wire formats onto them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::AssetType;

/// Lamports per native coin
pub const LAMPORTS_PER_COIN: u64 = 1_000_000_000;

/// One entry of a signature listing, newest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    /// Present when the transaction failed on-chain
    pub err: Option<JsonValue>,
}

/// Token balance of one account inside a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub account_index: usize,
    pub mint: String,
    pub owner: Option<String>,
    /// Raw integer amount in the mint's smallest unit
    pub amount: String,
    pub decimals: u32,
}

impl TokenBalance {
    /// Amount scaled by the mint's decimals
    pub fn ui_amount(&self) -> Option<Decimal> {
        let raw: i128 = self.amount.parse().ok()?;
        Decimal::try_from_i128_with_scale(raw, self.decimals).ok()
    }
}

/// Balance snapshots recorded by the ledger for one transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetail {
    pub slot: u64,
    pub block_time: Option<i64>,
    pub error: Option<JsonValue>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
    /// Account addresses in message order; balances are indexed by position
    pub account_keys: Vec<String>,
}

impl TransactionDetail {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// A listed signature joined with its detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub detail: TransactionDetail,
}

/// Signed change of one asset for one account; negative when sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
    pub asset_type: AssetType,
    pub amount: Decimal,
}

/// One history row of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub signature: String,
    pub slot: u64,
    /// Unix seconds, when the ledger reports one
    pub timestamp: Option<i64>,
    pub failed: bool,
    pub changes: Vec<BalanceChange>,
}

/// Convert lamports to native coin units
pub fn lamports_to_coin(lamports: u64) -> Decimal {
    Decimal::from(lamports) / Decimal::from(LAMPORTS_PER_COIN)
}
