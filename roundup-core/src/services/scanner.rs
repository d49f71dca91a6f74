//! Chain scanner - recent activity per account and delta classification

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::chain::lamports_to_coin;
use crate::domain::result::{Error, Result};
use crate::domain::{
    AssetType, BalanceChange, ClassifiedDelta, Network, RawTransaction, ScanCursor, TokenBalance,
    TransactionDetail,
};
use crate::ports::{LedgerClient, SignatureQuery};

/// Signatures fetched per scan
pub const PAGE_LIMIT: usize = 20;

/// Native deltas at or below 0.001 coin are fee noise
pub const NATIVE_DUST_THRESHOLD: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

/// Ledger clients registered per network
#[derive(Clone)]
pub struct ChainScanner {
    clients: HashMap<Network, Arc<dyn LedgerClient>>,
}

impl ChainScanner {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    pub fn with_client(mut self, network: Network, client: Arc<dyn LedgerClient>) -> Self {
        self.clients.insert(network, client);
        self
    }

    pub fn client(&self, network: Network) -> Result<Arc<dyn LedgerClient>> {
        self.clients
            .get(&network)
            .cloned()
            .ok_or_else(|| Error::network(format!("No ledger client for {} network", network)))
    }

    /// Up to one page of activity newer than `cursor`, newest first
    ///
    /// Network failures are returned to the caller. Transactions that failed
    /// on-chain are listed with their error and no balances, since
    /// classification skips them anyway. A signature whose detail the ledger no
    /// longer has is dropped.
    pub async fn fetch_recent_activity_strict(
        &self,
        network: Network,
        address: &str,
        cursor: Option<&ScanCursor>,
    ) -> Result<Vec<RawTransaction>> {
        self.fetch_page(network, address, cursor, PAGE_LIMIT).await
    }

    /// Up to `limit` transactions newer than `cursor`, newest first
    pub async fn fetch_page(
        &self,
        network: Network,
        address: &str,
        cursor: Option<&ScanCursor>,
        limit: usize,
    ) -> Result<Vec<RawTransaction>> {
        let client = self.client(network)?;
        let query = SignatureQuery {
            limit,
            before: None,
            until: cursor.map(|c| c.last_seen_signature.clone()),
        };
        let signatures = client.list_signatures(address, &query).await?;

        let mut activity = Vec::with_capacity(signatures.len());
        for info in signatures {
            if let Some(c) = cursor {
                if info.signature == c.last_seen_signature || info.slot < c.slot {
                    continue;
                }
            }

            let detail = match info.err {
                Some(err) => TransactionDetail {
                    slot: info.slot,
                    block_time: info.block_time,
                    error: Some(err),
                    ..Default::default()
                },
                None => match client.fetch_transaction_detail(&info.signature).await? {
                    Some(detail) => detail,
                    None => continue,
                },
            };

            activity.push(RawTransaction {
                signature: info.signature,
                slot: info.slot,
                block_time: info.block_time.or(detail.block_time),
                detail,
            });
        }
        Ok(activity)
    }

    /// Like `fetch_recent_activity_strict`, but an unreachable ledger reads as
    /// no activity
    pub async fn fetch_recent_activity(
        &self,
        network: Network,
        address: &str,
        cursor: Option<&ScanCursor>,
    ) -> Vec<RawTransaction> {
        self.fetch_recent_activity_strict(network, address, cursor)
            .await
            .unwrap_or_default()
    }
}

impl Default for ChainScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Newest entry of a newest-first page, as a cursor
pub fn newest_cursor(activity: &[RawTransaction]) -> Option<ScanCursor> {
    activity
        .iter()
        .max_by_key(|tx| tx.slot)
        .map(|tx| ScanCursor::new(tx.signature.clone(), tx.slot))
}

/// Signed balance changes of `address` in one transaction
///
/// Stable-token changes come first. Failed transactions yield nothing, and
/// native changes within the dust threshold are left out.
pub fn balance_changes(tx: &RawTransaction, address: &str, network: Network) -> Vec<BalanceChange> {
    let detail = &tx.detail;
    if detail.failed() {
        return Vec::new();
    }

    let mut changes = Vec::new();
    if let Some(amount) = stable_delta(detail, address, network.stable_mint()) {
        changes.push(BalanceChange {
            asset_type: AssetType::Stable,
            amount,
        });
    }
    if let Some(amount) = native_delta(detail, address) {
        changes.push(BalanceChange {
            asset_type: AssetType::Native,
            amount,
        });
    }
    changes
}

/// Unsigned balance changes of `address` in one transaction, stable first
pub fn classify_delta(tx: &RawTransaction, address: &str, network: Network) -> Vec<ClassifiedDelta> {
    balance_changes(tx, address, network)
        .into_iter()
        .map(|change| ClassifiedDelta::new(change.asset_type, change.amount))
        .collect()
}

fn stable_delta(detail: &TransactionDetail, address: &str, mint: &str) -> Option<Decimal> {
    let holding = |balances: &[TokenBalance]| -> Decimal {
        balances
            .iter()
            .filter(|b| b.mint == mint && b.owner.as_deref() == Some(address))
            .filter_map(|b| b.ui_amount())
            .sum()
    };

    let delta = holding(&detail.post_token_balances) - holding(&detail.pre_token_balances);
    (!delta.is_zero()).then_some(delta)
}

fn native_delta(detail: &TransactionDetail, address: &str) -> Option<Decimal> {
    let index = detail.account_keys.iter().position(|key| key == address)?;
    let pre = *detail.pre_balances.get(index)?;
    let post = *detail.post_balances.get(index)?;

    let delta = lamports_to_coin(post) - lamports_to_coin(pre);
    (delta.abs() > NATIVE_DUST_THRESHOLD).then_some(delta)
}
