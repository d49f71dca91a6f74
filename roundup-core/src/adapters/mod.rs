//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the KeyValueStore port
//! - Solana JSON-RPC over HTTP for the LedgerClient port
//! - Simulated ledger with deterministic demo activity
//! - In-memory store, notifiers and approvers for tests and embedding

pub mod duckdb;
pub mod memory;
pub mod simulated;
pub mod solana_rpc;

#[cfg(test)]
pub mod mock_rpc;
