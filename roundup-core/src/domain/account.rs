//! Account domain model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// BIP-44 coin type registered for the native chain
pub const COIN_TYPE: u32 = 501;

/// Offset marking a hardened child index
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// A signing account derived from the wallet's recovery phrase
///
/// Immutable once created: only the active-account pointer ever changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Base58-encoded ed25519 public key
    pub public_key: String,
    pub derivation_path: String,
    pub index: u32,
}

impl Account {
    pub fn new(public_key: impl Into<String>, derivation_path: &DerivationPath, index: u32) -> Self {
        Self {
            public_key: public_key.into(),
            derivation_path: derivation_path.to_string(),
            index,
        }
    }

    /// Parse the stored derivation path
    pub fn path(&self) -> Result<DerivationPath> {
        self.derivation_path.parse()
    }
}

/// Hardened-only derivation path such as `m/44'/501'/0'/0'`
///
/// Segments are stored without the hardened offset applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivationPath {
    segments: Vec<u32>,
}

impl DerivationPath {
    /// Standard path for the account at `account_index`
    pub fn for_account(account_index: u32) -> Self {
        Self {
            segments: vec![44, COIN_TYPE, account_index, 0],
        }
    }

    /// Child indices without the hardened offset
    pub fn segments(&self) -> &[u32] {
        &self.segments
    }

    /// Child indices with the hardened offset applied
    pub fn hardened_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.segments.iter().map(|s| s | HARDENED_OFFSET)
    }
}

impl FromStr for DerivationPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidDerivationPath(format!("{} ({})", s, reason));

        let mut parts = s.trim().split('/');
        if parts.next() != Some("m") {
            return Err(invalid("must start with 'm'"));
        }

        let mut segments = Vec::new();
        for part in parts {
            let index = part
                .strip_suffix('\'')
                .ok_or_else(|| invalid("only hardened segments are supported"))?;
            let value: u32 = index
                .parse()
                .map_err(|_| invalid("segment is not a number"))?;
            if value >= HARDENED_OFFSET {
                return Err(invalid("segment out of range"));
            }
            segments.push(value);
        }

        if segments.is_empty() {
            return Err(invalid("path has no segments"));
        }

        Ok(Self { segments })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for segment in &self.segments {
            write!(f, "/{}'", segment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_path_format() {
        assert_eq!(DerivationPath::for_account(0).to_string(), "m/44'/501'/0'/0'");
        assert_eq!(DerivationPath::for_account(7).to_string(), "m/44'/501'/7'/0'");
    }

    #[test]
    fn test_parse_roundtrips_display() {
        let path: DerivationPath = "m/44'/501'/3'/0'".parse().unwrap();
        assert_eq!(path, DerivationPath::for_account(3));
        assert_eq!(path.segments(), &[44, 501, 3, 0]);
    }

    #[test]
    fn test_hardened_indices() {
        let path = DerivationPath::for_account(1);
        let indices: Vec<u32> = path.hardened_indices().collect();
        assert_eq!(indices[0], 44 + HARDENED_OFFSET);
        assert_eq!(indices[2], 1 + HARDENED_OFFSET);
    }

    #[test]
    fn test_rejects_malformed_paths() {
        for bad in ["", "44'/501'", "m", "m/44'/501/0'", "m/44'/abc'/0'", "m/2147483648'", "x/1'"] {
            let err = bad.parse::<DerivationPath>().unwrap_err();
            assert!(matches!(err, Error::InvalidDerivationPath(_)), "{}", bad);
        }
    }

    #[test]
    fn test_account_serializes_camel_case() {
        let account = Account::new("Addr111", &DerivationPath::for_account(0), 0);
        let json = serde_json::to_value(&account).unwrap();
        assert_eq!(json["publicKey"], "Addr111");
        assert_eq!(json["derivationPath"], "m/44'/501'/0'/0'");
        assert_eq!(json["index"], 0);
        assert_eq!(account.path().unwrap(), DerivationPath::for_account(0));
    }
}
