//! User settings domain model

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// Stable-token mint recognized on the primary network
pub const PRIMARY_STABLE_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// Stable-token mint recognized on the test and simulated networks
pub const TEST_STABLE_MINT: &str = "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU";

/// Round-up denominations offered to the user
pub const ALLOWED_GRANULARITIES: [u32; 3] = [1, 5, 10];

/// Chain network the wallet talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Primary,
    Test,
    Simulated,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Primary => "primary",
            Network::Test => "test",
            Network::Simulated => "simulated",
        }
    }

    /// The recognized stable-token mint on this network
    pub fn stable_mint(&self) -> &'static str {
        match self {
            Network::Primary => PRIMARY_STABLE_MINT,
            Network::Test | Network::Simulated => TEST_STABLE_MINT,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "primary" | "mainnet" | "mainnet-beta" => Ok(Network::Primary),
            "test" | "devnet" => Ok(Network::Test),
            "simulated" | "demo" => Ok(Network::Simulated),
            other => Err(Error::validation(format!("Unknown network: {}", other))),
        }
    }
}

/// Positive round-up denomination
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Granularity(Decimal);

impl Granularity {
    /// Any strictly positive denomination
    pub fn new(value: Decimal) -> Result<Self> {
        if value <= Decimal::ZERO {
            return Err(Error::validation(format!(
                "Round-up granularity must be positive, got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    /// One of the denominations offered in settings (1, 5 or 10)
    pub fn from_choice(value: Decimal) -> Result<Self> {
        let allowed = ALLOWED_GRANULARITIES
            .iter()
            .any(|g| Decimal::from(*g) == value);
        if !allowed {
            return Err(Error::validation(format!(
                "Round-up granularity must be one of {:?}, got {}",
                ALLOWED_GRANULARITIES, value
            )));
        }
        Self::new(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl Default for Granularity {
    fn default() -> Self {
        Self(Decimal::ONE)
    }
}

impl TryFrom<Decimal> for Granularity {
    type Error = Error;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Granularity> for Decimal {
    fn from(g: Granularity) -> Self {
        g.0
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted user settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub round_up_enabled: bool,
    #[serde(alias = "roundUpTo")]
    pub round_up_granularity: Granularity,
    pub auto_invest: bool,
    pub network: Network,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            round_up_enabled: true,
            round_up_granularity: Granularity::default(),
            auto_invest: true,
            network: Network::Simulated,
        }
    }
}

/// Partial settings update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub round_up_enabled: Option<bool>,
    pub round_up_granularity: Option<Decimal>,
    pub auto_invest: Option<bool>,
    pub network: Option<Network>,
}

impl SettingsUpdate {
    /// Apply onto existing settings, validating the granularity choice
    pub fn apply(&self, settings: &Settings) -> Result<Settings> {
        let mut updated = settings.clone();
        if let Some(enabled) = self.round_up_enabled {
            updated.round_up_enabled = enabled;
        }
        if let Some(value) = self.round_up_granularity {
            updated.round_up_granularity = Granularity::from_choice(value)?;
        }
        if let Some(auto_invest) = self.auto_invest {
            updated.auto_invest = auto_invest;
        }
        if let Some(network) = self.network {
            updated.network = network;
        }
        Ok(updated)
    }
}
