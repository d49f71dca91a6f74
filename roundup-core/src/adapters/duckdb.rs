//! DuckDB key-value store implementation

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use duckdb::{params, Connection, Transaction};
use fs2::FileExt;
use serde_json::Value as JsonValue;

use crate::domain::result::{Error, Result};
use crate::ports::{KeyValueStore, StoreKey, UpdateFn};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Whether an open error indicates file locking that is worth retrying
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

fn storage_err(e: impl std::fmt::Display) -> Error {
    Error::storage(e.to_string())
}

/// Wallet store backed by a single DuckDB file
///
/// All access goes through one connection behind a mutex; every write runs in
/// a SQL transaction while holding an advisory lock on `<db>.lock`, so separate
/// processes (a running monitor and a one-off CLI command) serialize too.
pub struct DuckDbStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    lock_path: PathBuf,
}

impl DuckDbStore {
    /// Open (or create) the store and run pending migrations
    ///
    /// Retries with exponential backoff when another process holds the file.
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    let store = Self {
                        conn: Mutex::new(conn),
                        db_path: db_path.to_path_buf(),
                        lock_path: db_path.with_extension("lock"),
                    };
                    store.run_migrations()?;
                    return Ok(store);
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        eprintln!(
                            "[roundup] Wallet database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    fn try_open_connection(db_path: &Path) -> anyhow::Result<Connection> {
        // Extension autoloading stays off; JSON is linked in via the "json" feature
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_with_flags(db_path, config)
            .with_context(|| format!("Failed to open {}", db_path.display()))?;
        Ok(conn)
    }

    /// Apply embedded migrations; returns what was applied
    pub fn run_migrations(&self) -> anyhow::Result<MigrationResult> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        MigrationService::new(&conn).run_pending()
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::storage(format!("Lock poisoned: {}", e)))
    }

    /// Exclusive advisory lock, released when the file handle drops
    fn lock_file(&self) -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;
        file.lock_exclusive()?;
        Ok(file)
    }

    /// Run `f` inside a write transaction; rolls back if `f` fails
    fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let _file_lock = self.lock_file()?;
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction().map_err(storage_err)?;
        let output = f(&tx)?;
        tx.commit().map_err(storage_err)?;
        Ok(output)
    }
}

fn read_value(conn: &Connection, key: StoreKey) -> Result<Option<JsonValue>> {
    let raw = conn.query_row(
        "SELECT value::VARCHAR FROM sys_kv WHERE key = ?",
        [key.as_str()],
        |row| row.get::<_, String>(0),
    );

    match raw {
        Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(storage_err(e)),
    }
}

fn write_value(conn: &Connection, key: StoreKey, value: &JsonValue) -> Result<()> {
    let text = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO sys_kv (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
         ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key.as_str(), text],
    )
    .map_err(storage_err)?;
    Ok(())
}

impl KeyValueStore for DuckDbStore {
    fn get(&self, key: StoreKey) -> Result<Option<JsonValue>> {
        let conn = self.lock_conn()?;
        read_value(&conn, key)
    }

    fn set(&self, key: StoreKey, value: JsonValue) -> Result<()> {
        self.write(|tx| write_value(tx, key, &value))
    }

    fn remove(&self, key: StoreKey) -> Result<()> {
        self.write(|tx| {
            tx.execute("DELETE FROM sys_kv WHERE key = ?", [key.as_str()])
                .map_err(storage_err)?;
            Ok(())
        })
    }

    fn set_many(&self, entries: Vec<(StoreKey, JsonValue)>) -> Result<()> {
        self.write(|tx| {
            for (key, value) in &entries {
                write_value(tx, *key, value)?;
            }
            Ok(())
        })
    }

    fn update(&self, key: StoreKey, f: &mut UpdateFn<'_>) -> Result<()> {
        self.write(|tx| {
            let current = read_value(tx, key)?;
            let next = f(current)?;
            write_value(tx, key, &next)
        })
    }
}
