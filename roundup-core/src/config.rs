//! Configuration management
//!
//! Host settings live in config.json in the wallet directory:
//! ```json
//! {
//!   "network": "simulated",
//!   "rpc": { "primary": "https://...", "test": "https://..." },
//!   "monitor": { "periodSecs": 30, "runTimeoutSecs": 30 },
//!   "requestTimeoutSecs": 30,
//!   "initialAccounts": 1
//! }
//! ```
//! Unknown fields are preserved on save. Wallet state (accounts, settings,
//! ledger) is not configuration and lives in the store.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::Network;

pub const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_PRIMARY_RPC: &str = "https://api.mainnet-beta.solana.com";
pub const DEFAULT_TEST_RPC: &str = "https://api.devnet.solana.com";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    network: Option<Network>,
    #[serde(default)]
    rpc: RpcSection,
    #[serde(default)]
    monitor: MonitorSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    initial_accounts: Option<u32>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RpcSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    primary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    test: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonitorSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    period_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    run_timeout_secs: Option<u64>,
}

/// Effective configuration after file and environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Network given to newly created wallets
    pub default_network: Network,
    pub primary_rpc_url: String,
    pub test_rpc_url: String,
    pub monitor_period: Duration,
    pub run_timeout: Duration,
    pub request_timeout: Duration,
    pub initial_accounts: u32,
    raw: ConfigFile,
}

impl Default for Config {
    fn default() -> Self {
        Self::resolve(ConfigFile::default(), |_| None)
    }
}

impl Config {
    /// Load config.json from the wallet directory
    ///
    /// Overrides for CI and local validators:
    /// - `ROUNDUP_NETWORK` replaces the default network
    /// - `ROUNDUP_RPC_URL` replaces every RPC endpoint
    pub fn load(wallet_dir: &Path) -> Result<Self> {
        let path = wallet_dir.join(CONFIG_FILE);
        let raw: ConfigFile = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid {}", path.display()))?
        } else {
            ConfigFile::default()
        };

        Ok(Self::resolve(raw, |key| std::env::var(key).ok()))
    }

    fn resolve(raw: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let default_network = env("ROUNDUP_NETWORK")
            .and_then(|v| v.parse().ok())
            .or(raw.network)
            .unwrap_or(Network::Simulated);

        let rpc_override = env("ROUNDUP_RPC_URL").filter(|v| !v.trim().is_empty());
        let primary_rpc_url = rpc_override
            .clone()
            .or_else(|| raw.rpc.primary.clone())
            .unwrap_or_else(|| DEFAULT_PRIMARY_RPC.to_string());
        let test_rpc_url = rpc_override
            .or_else(|| raw.rpc.test.clone())
            .unwrap_or_else(|| DEFAULT_TEST_RPC.to_string());

        let secs = |value: Option<u64>| Duration::from_secs(value.unwrap_or(30).max(1));

        Self {
            default_network,
            primary_rpc_url,
            test_rpc_url,
            monitor_period: secs(raw.monitor.period_secs),
            run_timeout: secs(raw.monitor.run_timeout_secs),
            request_timeout: secs(raw.request_timeout_secs),
            initial_accounts: raw.initial_accounts.unwrap_or(1).max(1),
            raw,
        }
    }

    /// RPC endpoint for a network; the simulated network has none
    pub fn rpc_url(&self, network: Network) -> Option<&str> {
        match network {
            Network::Primary => Some(&self.primary_rpc_url),
            Network::Test => Some(&self.test_rpc_url),
            Network::Simulated => None,
        }
    }

    /// Save to config.json, keeping fields this version does not manage
    pub fn save(&self, wallet_dir: &Path) -> Result<()> {
        let path = wallet_dir.join(CONFIG_FILE);
        let mut file = self.raw.clone();
        file.network = Some(self.default_network);
        file.rpc.primary = Some(self.primary_rpc_url.clone());
        file.rpc.test = Some(self.test_rpc_url.clone());
        file.monitor.period_secs = Some(self.monitor_period.as_secs());
        file.monitor.run_timeout_secs = Some(self.run_timeout.as_secs());
        file.request_timeout_secs = Some(self.request_timeout.as_secs());
        file.initial_accounts = Some(self.initial_accounts);

        let content = serde_json::to_string_pretty(&file)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(json: &str) -> ConfigFile {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.default_network, Network::Simulated);
        assert_eq!(config.monitor_period, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.initial_accounts, 1);
        assert_eq!(config.rpc_url(Network::Test), Some(DEFAULT_TEST_RPC));
        assert_eq!(config.rpc_url(Network::Simulated), None);
    }

    #[test]
    fn test_file_values() {
        let raw = parse(
            r#"{"network":"test","rpc":{"test":"http://localhost:8899"},
                "monitor":{"periodSecs":60},"initialAccounts":3}"#,
        );
        let config = Config::resolve(raw, |_| None);
        assert_eq!(config.default_network, Network::Test);
        assert_eq!(config.test_rpc_url, "http://localhost:8899");
        assert_eq!(config.monitor_period, Duration::from_secs(60));
        assert_eq!(config.run_timeout, Duration::from_secs(30));
        assert_eq!(config.initial_accounts, 3);
    }

    #[test]
    fn test_env_overrides() {
        let raw = parse(r#"{"network":"primary"}"#);
        let config = Config::resolve(raw, |key| match key {
            "ROUNDUP_NETWORK" => Some("test".to_string()),
            "ROUNDUP_RPC_URL" => Some("http://127.0.0.1:8899".to_string()),
            _ => None,
        });
        assert_eq!(config.default_network, Network::Test);
        assert_eq!(config.primary_rpc_url, "http://127.0.0.1:8899");
        assert_eq!(config.test_rpc_url, "http://127.0.0.1:8899");
    }

    #[test]
    fn test_bad_env_network_falls_back_to_file() {
        let raw = parse(r#"{"network":"primary"}"#);
        let config = Config::resolve(raw, |key| {
            (key == "ROUNDUP_NETWORK").then(|| "moon".to_string())
        });
        assert_eq!(config.default_network, Network::Primary);
    }

    #[test]
    fn test_save_preserves_unknown_fields() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"theme":"dark","network":"test"}"#,
        )
        .unwrap();

        let mut config = Config::load(dir.path()).unwrap();
        config.initial_accounts = 2;
        config.save(dir.path()).unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap())
                .unwrap();
        assert_eq!(saved["theme"], "dark");
        assert_eq!(saved["initialAccounts"], 2);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{ nope").unwrap();
        assert!(Config::load(dir.path()).is_err());
    }
}
