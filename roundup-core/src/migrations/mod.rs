//! Wallet store schema, embedded at compile time
//!
//! Append new files as `NNN_description.sql`; names sort in apply order.

use crate::services::migration::MigrationSet;

pub const MIGRATIONS: MigrationSet = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_kv_store.sql", include_str!("001_kv_store.sql")),
];
