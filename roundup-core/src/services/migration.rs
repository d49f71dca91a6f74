//! Schema migrations for the wallet and log databases
//!
//! Each database has an ordered set of SQL files embedded at compile time. The
//! first file creates `sys_migrations`; every applied name is recorded there so
//! a file runs at most once per database.

use std::collections::HashSet;

use anyhow::{Context, Result};
use duckdb::Connection;

use crate::migrations::MIGRATIONS;

/// Embedded migration set: `(file name, sql)` in apply order
pub type MigrationSet = &'static [(&'static str, &'static str)];

/// Outcome of `run_pending`
#[derive(Debug)]
pub struct MigrationResult {
    /// Names applied by this call
    pub applied: Vec<String>,
    /// Names that were already recorded
    pub already_applied: usize,
}

pub struct MigrationService<'a> {
    conn: &'a Connection,
    migrations: MigrationSet,
}

impl<'a> MigrationService<'a> {
    /// Wallet store migrations
    pub fn new(conn: &'a Connection) -> Self {
        Self::with_migrations(conn, MIGRATIONS)
    }

    pub fn with_migrations(conn: &'a Connection, migrations: MigrationSet) -> Self {
        Self { conn, migrations }
    }

    /// Apply every migration not yet recorded, in order
    pub fn run_pending(&self) -> Result<MigrationResult> {
        let recorded = self.recorded()?;
        let mut applied = Vec::new();

        for (name, sql) in self.migrations {
            if recorded.contains(*name) {
                continue;
            }
            self.conn
                .execute_batch(sql)
                .with_context(|| format!("Failed to apply migration {}", name))?;
            self.conn
                .execute("INSERT INTO sys_migrations (migration_name) VALUES (?)", [name])
                .with_context(|| format!("Failed to record migration {}", name))?;
            applied.push(name.to_string());
        }

        Ok(MigrationResult {
            already_applied: recorded.len(),
            applied,
        })
    }

    /// Names in `sys_migrations`; empty before the bootstrap file has run
    fn recorded(&self) -> Result<HashSet<String>> {
        let has_table: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'sys_migrations'",
            [],
            |row| row.get(0),
        )?;
        if has_table == 0 {
            return Ok(HashSet::new());
        }

        let mut stmt = self.conn.prepare("SELECT migration_name FROM sys_migrations")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<duckdb::Result<HashSet<_>>>()?;
        Ok(names)
    }

    /// Names not yet applied, in apply order
    pub fn pending(&self) -> Result<Vec<&'static str>> {
        let recorded = self.recorded()?;
        Ok(self
            .migrations
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| !recorded.contains(*name))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_migrations::LOG_MIGRATIONS;

    #[test]
    fn test_migrations_run_once() {
        let conn = Connection::open_in_memory().unwrap();
        let service = MigrationService::new(&conn);

        let first = service.run_pending().unwrap();
        assert_eq!(first.applied.len(), MIGRATIONS.len());
        assert_eq!(first.already_applied, 0);
        assert!(service.pending().unwrap().is_empty());

        let again = service.run_pending().unwrap();
        assert!(again.applied.is_empty());
        assert_eq!(again.already_applied, MIGRATIONS.len());
    }

    #[test]
    fn test_pending_after_bootstrap_only() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MIGRATIONS[0].1).unwrap();
        conn.execute(
            "INSERT INTO sys_migrations (migration_name) VALUES (?)",
            [MIGRATIONS[0].0],
        )
        .unwrap();

        let service = MigrationService::new(&conn);
        assert_eq!(service.pending().unwrap(), vec!["001_kv_store.sql"]);
        assert_eq!(service.run_pending().unwrap().applied, vec!["001_kv_store.sql"]);
    }

    #[test]
    fn test_log_migration_set() {
        let conn = Connection::open_in_memory().unwrap();
        MigrationService::with_migrations(&conn, LOG_MIGRATIONS)
            .run_pending()
            .unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sys_logs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
