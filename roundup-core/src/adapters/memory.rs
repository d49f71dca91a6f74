//! In-memory adapters
//!
//! Used by tests and by embedders that keep wallet state elsewhere.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use zeroize::Zeroizing;

use crate::domain::result::{Error, Result};
use crate::ports::{
    Approval, ApprovalRequest, Approver, KeyValueStore, Notification, Notifier, StoreKey, UpdateFn,
};

/// Key-value store held in a mutex-guarded map
#[derive(Default)]
pub struct InMemoryStore {
    values: Mutex<BTreeMap<StoreKey, JsonValue>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> Result<MutexGuard<'_, BTreeMap<StoreKey, JsonValue>>> {
        self.values
            .lock()
            .map_err(|e| Error::storage(format!("Lock poisoned: {}", e)))
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: StoreKey) -> Result<Option<JsonValue>> {
        Ok(self.values()?.get(&key).cloned())
    }

    fn set(&self, key: StoreKey, value: JsonValue) -> Result<()> {
        self.values()?.insert(key, value);
        Ok(())
    }

    fn remove(&self, key: StoreKey) -> Result<()> {
        self.values()?.remove(&key);
        Ok(())
    }

    fn set_many(&self, entries: Vec<(StoreKey, JsonValue)>) -> Result<()> {
        let mut values = self.values()?;
        for (key, value) in entries {
            values.insert(key, value);
        }
        Ok(())
    }

    fn update(&self, key: StoreKey, f: &mut UpdateFn<'_>) -> Result<()> {
        let mut values = self.values()?;
        let next = f(values.get(&key).cloned())?;
        values.insert(key, next);
        Ok(())
    }
}

/// Notifier that drops everything
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notification: &Notification) {}
}

/// Notifier that keeps every notification for inspection
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification.clone());
        }
    }
}

/// Approver with a fixed answer
pub enum FixedApprover {
    ApproveWith(String),
    Reject,
}

#[async_trait]
impl Approver for FixedApprover {
    async fn request_approval(&self, _request: &ApprovalRequest) -> Result<Approval> {
        Ok(match self {
            FixedApprover::ApproveWith(password) => Approval::Approved {
                password: Zeroizing::new(password.clone()),
            },
            FixedApprover::Reject => Approval::Rejected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::KeyValueStoreExt;
    use serde_json::json;

    #[test]
    fn test_in_memory_roundtrip() {
        let store = InMemoryStore::new();
        store.set(StoreKey::IsLocked, json!(true)).unwrap();
        assert_eq!(store.get(StoreKey::IsLocked).unwrap(), Some(json!(true)));
        store.remove(StoreKey::IsLocked).unwrap();
        assert!(store.get(StoreKey::IsLocked).unwrap().is_none());
    }

    #[test]
    fn test_in_memory_failed_update_is_noop() {
        let store = InMemoryStore::new();
        store.set_json(StoreKey::ActiveAccount, &2u32).unwrap();
        let result: Result<()> =
            store.update_json(StoreKey::ActiveAccount, |_: &mut u32| Err(Error::WalletLocked));
        assert!(result.is_err());
        assert_eq!(store.get_json::<u32>(StoreKey::ActiveAccount).unwrap(), Some(2));
    }

    #[test]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.notify(&Notification::round_ups_found(2));
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(notifier.sent()[0].count, 2);
    }
}
