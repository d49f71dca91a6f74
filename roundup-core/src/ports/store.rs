//! Key-value store port
//!
//! Every persisted wallet record lives under one logical key. Adapters decide the
//! physical layout; callers only see JSON values.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::domain::result::{Error, Result};

/// Logical keys of the wallet store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKey {
    EncryptedMnemonic,
    PasswordHash,
    Accounts,
    ActiveAccount,
    IsLocked,
    Settings,
    PendingRoundUps,
    ScanCursors,
    ConnectedOrigins,
}

impl StoreKey {
    pub const ALL: [StoreKey; 9] = [
        StoreKey::EncryptedMnemonic,
        StoreKey::PasswordHash,
        StoreKey::Accounts,
        StoreKey::ActiveAccount,
        StoreKey::IsLocked,
        StoreKey::Settings,
        StoreKey::PendingRoundUps,
        StoreKey::ScanCursors,
        StoreKey::ConnectedOrigins,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::EncryptedMnemonic => "encrypted_mnemonic",
            StoreKey::PasswordHash => "password_hash",
            StoreKey::Accounts => "accounts",
            StoreKey::ActiveAccount => "active_account",
            StoreKey::IsLocked => "is_locked",
            StoreKey::Settings => "settings",
            StoreKey::PendingRoundUps => "pending_round_ups",
            StoreKey::ScanCursors => "scan_cursors",
            StoreKey::ConnectedOrigins => "connected_origins",
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closure applied inside an atomic read-modify-write
pub type UpdateFn<'a> = dyn FnMut(Option<JsonValue>) -> Result<JsonValue> + 'a;

/// Persisted key-value store
///
/// `update` and `set_many` are atomic: concurrent writers never observe or
/// produce a torn value. Implementations must not hold their lock across an
/// await point (the trait is synchronous for that reason).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: StoreKey) -> Result<Option<JsonValue>>;

    fn set(&self, key: StoreKey, value: JsonValue) -> Result<()>;

    fn remove(&self, key: StoreKey) -> Result<()>;

    /// Write several keys in one transaction
    fn set_many(&self, entries: Vec<(StoreKey, JsonValue)>) -> Result<()>;

    /// Atomically replace the value under `key` with `f(current)`
    ///
    /// If `f` fails, the stored value is left untouched.
    fn update(&self, key: StoreKey, f: &mut UpdateFn<'_>) -> Result<()>;
}

/// Typed helpers over the JSON store
pub trait KeyValueStoreExt: KeyValueStore {
    fn get_json<T: DeserializeOwned>(&self, key: StoreKey) -> Result<Option<T>> {
        match self.get(key)? {
            Some(JsonValue::Null) | None => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    fn set_json<T: Serialize>(&self, key: StoreKey, value: &T) -> Result<()> {
        self.set(key, serde_json::to_value(value)?)
    }

    /// Typed atomic read-modify-write; a missing key starts from `T::default()`
    fn update_json<T, R, F>(&self, key: StoreKey, f: F) -> Result<R>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnOnce(&mut T) -> Result<R>,
    {
        let mut f = Some(f);
        let mut output = None;
        self.update(key, &mut |current| {
            let f = f
                .take()
                .ok_or_else(|| Error::storage(format!("update of {} applied twice", key)))?;
            let mut value: T = match current {
                Some(JsonValue::Null) | None => T::default(),
                Some(v) => serde_json::from_value(v)?,
            };
            output = Some(f(&mut value)?);
            Ok(serde_json::to_value(&value)?)
        })?;
        output.ok_or_else(|| Error::storage(format!("update of {} produced no result", key)))
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}
