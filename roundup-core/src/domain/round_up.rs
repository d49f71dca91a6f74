//! Round-up candidate domain models

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Asset class a delta was measured in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Stable,
    Native,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Stable => "stable",
            AssetType::Native => "native",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unsigned balance change of one asset for one account in one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedDelta {
    pub asset_type: AssetType,
    pub amount: Decimal,
}

impl ClassifiedDelta {
    pub fn new(asset_type: AssetType, amount: Decimal) -> Self {
        Self {
            asset_type,
            amount: amount.abs(),
        }
    }
}

/// A detected round-up awaiting deposit
///
/// Keyed by `signature`; the only field that ever changes is `processed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundUpCandidate {
    pub signature: String,
    pub original_amount: Decimal,
    pub round_up_amount: Decimal,
    /// Unix seconds
    pub timestamp: i64,
    pub processed: bool,
    pub asset_type: AssetType,
}

impl RoundUpCandidate {
    pub fn is_pending(&self) -> bool {
        !self.processed
    }
}

/// Pending total for one asset class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTotal {
    pub asset_type: AssetType,
    pub count: usize,
    pub amount: Decimal,
}
