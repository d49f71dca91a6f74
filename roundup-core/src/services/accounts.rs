//! Account store - derived accounts, active pointer, settings and scan cursors

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use zeroize::Zeroizing;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, ScanCursor, ScanCursors, Settings, SettingsUpdate};
use crate::ports::{KeyValueStore, KeyValueStoreExt, StoreKey};
use crate::services::keys;

const ADD_ACCOUNT_ATTEMPTS: usize = 3;

fn next_index(accounts: &[Account]) -> u32 {
    accounts.iter().map(|a| a.index + 1).max().unwrap_or(0)
}

pub struct AccountStore {
    store: Arc<dyn KeyValueStore>,
}

impl AccountStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Records written together with the sealed phrase at wallet creation
    pub fn initial_entries(
        accounts: &[Account],
        settings: &Settings,
    ) -> Result<Vec<(StoreKey, JsonValue)>> {
        if accounts.is_empty() {
            return Err(Error::validation("A wallet needs at least one account"));
        }
        Ok(vec![
            (StoreKey::Accounts, serde_json::to_value(accounts)?),
            (StoreKey::ActiveAccount, json!(0)),
            (StoreKey::Settings, serde_json::to_value(settings)?),
            (StoreKey::ScanCursors, json!({})),
        ])
    }

    pub fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self.store.get_json(StoreKey::Accounts)?.unwrap_or_default())
    }

    pub fn active_index(&self) -> Result<Option<u32>> {
        self.store.get_json(StoreKey::ActiveAccount)
    }

    /// The account that signs and gets scanned
    pub fn active_account(&self) -> Result<Account> {
        let index = self.active_index()?.ok_or(Error::NoActiveAccount)?;
        self.accounts()?
            .into_iter()
            .find(|a| a.index == index)
            .ok_or(Error::NoActiveAccount)
    }

    /// Next unused account index
    pub fn next_index(&self) -> Result<u32> {
        Ok(next_index(&self.accounts()?))
    }

    /// Derive and persist the next account from the recovery phrase
    ///
    /// Derivation runs on the blocking pool, outside the store lock. The index
    /// is rechecked inside the atomic update; if a concurrent add took it, the
    /// following index is derived instead.
    pub async fn add_account(&self, phrase: Zeroizing<String>) -> Result<Account> {
        if !keys::validate_recovery_phrase(&phrase) {
            return Err(Error::InvalidMnemonic);
        }
        let phrase = Arc::new(phrase);

        for _ in 0..ADD_ACCOUNT_ATTEMPTS {
            let index = self.next_index()?;
            let source = phrase.clone();
            let account = keys::blocking(move || {
                keys::derive_accounts_from(&source, index, 1)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::storage("Derivation returned no account"))
            })
            .await?;

            let stored = self
                .store
                .update_json(StoreKey::Accounts, |accounts: &mut Vec<Account>| {
                    if next_index(accounts) != account.index {
                        return Ok(false);
                    }
                    accounts.push(account.clone());
                    Ok(true)
                })?;
            if stored {
                return Ok(account);
            }
        }
        Err(Error::storage("Account index kept changing, try again"))
    }

    /// Switch the active account and restart its scan from the newest page
    pub fn set_active(&self, index: u32) -> Result<Account> {
        let account = self
            .accounts()?
            .into_iter()
            .find(|a| a.index == index)
            .ok_or_else(|| Error::validation(format!("No account with index {}", index)))?;

        // Other accounts' cursors may be advancing concurrently; only drop ours
        self.store
            .update_json(StoreKey::ScanCursors, |cursors: &mut ScanCursors| {
                cursors.remove(&account.public_key);
                Ok(())
            })?;
        self.store.set(StoreKey::ActiveAccount, json!(index))?;
        Ok(account)
    }

    /// Stored settings, or first-run defaults
    pub fn settings(&self) -> Result<Settings> {
        Ok(self.store.get_json(StoreKey::Settings)?.unwrap_or_default())
    }

    pub fn update_settings(&self, update: &SettingsUpdate) -> Result<Settings> {
        self.store
            .update_json(StoreKey::Settings, |settings: &mut Settings| {
                *settings = update.apply(settings)?;
                Ok(settings.clone())
            })
    }

    pub fn cursors(&self) -> Result<ScanCursors> {
        Ok(self.store.get_json(StoreKey::ScanCursors)?.unwrap_or_default())
    }

    pub fn cursor(&self, address: &str) -> Result<Option<ScanCursor>> {
        Ok(self.cursors()?.remove(address))
    }

    /// Move an account's cursor to the later of stored and observed
    pub fn advance_cursor(&self, address: &str, observed: &ScanCursor) -> Result<ScanCursor> {
        self.store
            .update_json(StoreKey::ScanCursors, |cursors: &mut ScanCursors| {
                let next = ScanCursor::advance(cursors.get(address), observed);
                cursors.insert(address.to_string(), next.clone());
                Ok(next)
            })
    }
}
