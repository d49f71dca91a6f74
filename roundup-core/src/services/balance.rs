//! Balance service - on-demand balances and recent activity

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::result::Result;
use crate::domain::{Account, ActivityEntry, Network, PendingTotal};
use crate::ports::KeyValueStore;
use crate::services::accounts::AccountStore;
use crate::services::ledger::RoundUpLedger;
use crate::services::scanner::{balance_changes, ChainScanner};

/// Default and largest history page
pub const HISTORY_LIMIT: usize = 10;
pub const HISTORY_LIMIT_MAX: usize = 100;

/// Holdings of one account on one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub public_key: String,
    pub network: Network,
    pub native: Decimal,
    pub stable: Decimal,
    /// Round-ups detected but not yet deposited
    pub pending: Vec<PendingTotal>,
}

/// User-initiated balance queries; network failures reach the caller
pub struct BalanceService {
    accounts: AccountStore,
    ledger: RoundUpLedger,
    scanner: ChainScanner,
}

impl BalanceService {
    pub fn new(store: Arc<dyn KeyValueStore>, scanner: ChainScanner) -> Self {
        Self {
            accounts: AccountStore::new(store.clone()),
            ledger: RoundUpLedger::new(store),
            scanner,
        }
    }

    /// Balances of the active account on the configured network
    pub async fn active_balance(&self) -> Result<AccountBalance> {
        let account = self.accounts.active_account()?;
        let network = self.accounts.settings()?.network;
        self.balance_of(&account, network).await
    }

    pub async fn balance_of(&self, account: &Account, network: Network) -> Result<AccountBalance> {
        let client = self.scanner.client(network)?;
        let native = client.get_balance(&account.public_key).await?;
        let stable = client
            .get_token_balance(&account.public_key, network.stable_mint())
            .await?;

        Ok(AccountBalance {
            public_key: account.public_key.clone(),
            network,
            native,
            stable,
            pending: self.ledger.pending_by_asset()?,
        })
    }

    /// Newest `limit` transactions of the active account with its own
    /// balance changes; `limit` is clamped to `1..=HISTORY_LIMIT_MAX`
    pub async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>> {
        let account = self.accounts.active_account()?;
        let network = self.accounts.settings()?.network;
        let address = account.public_key.as_str();

        let page = self
            .scanner
            .fetch_page(network, address, None, limit.clamp(1, HISTORY_LIMIT_MAX))
            .await?;
        Ok(page
            .iter()
            .map(|tx| ActivityEntry {
                signature: tx.signature.clone(),
                slot: tx.slot,
                timestamp: tx.block_time,
                failed: tx.detail.failed(),
                changes: balance_changes(tx, address, network),
            })
            .collect())
    }
}
