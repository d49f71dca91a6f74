//! Request/response protocol exposed to the interface layer
//!
//! Requests arrive as `{"method": "...", "params": {...}}`. The set of methods is
//! closed; anything else is rejected before dispatch.

use serde::{Deserialize, Serialize};

/// Method names accepted by the dispatcher
pub const METHODS: [&str; 5] = [
    "getPublicKey",
    "connect",
    "disconnect",
    "signTransaction",
    "signMessage",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum WalletRequest {
    GetPublicKey,
    Connect(ConnectParams),
    Disconnect(DisconnectParams),
    SignTransaction(SignTransactionParams),
    SignMessage(SignMessageParams),
}

impl WalletRequest {
    pub fn method(&self) -> &'static str {
        match self {
            WalletRequest::GetPublicKey => "getPublicKey",
            WalletRequest::Connect(_) => "connect",
            WalletRequest::Disconnect(_) => "disconnect",
            WalletRequest::SignTransaction(_) => "signTransaction",
            WalletRequest::SignMessage(_) => "signMessage",
        }
    }

    /// Whether the request touches a private key
    pub fn needs_approval(&self) -> bool {
        matches!(
            self,
            WalletRequest::SignTransaction(_) | WalletRequest::SignMessage(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub origin: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectParams {
    pub origin: String,
}

/// Serialized transaction message to sign, base64
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignTransactionParams {
    pub origin: String,
    pub transaction: String,
}

/// Arbitrary bytes to sign, base64
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignMessageParams {
    pub origin: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WalletResponse {
    #[serde(rename_all = "camelCase")]
    PublicKey { public_key: String },
    #[serde(rename_all = "camelCase")]
    Connected {
        public_key: String,
        auto_approve: bool,
    },
    Disconnected,
    /// Base58 ed25519 signature over the submitted bytes
    #[serde(rename_all = "camelCase")]
    Signed {
        public_key: String,
        signature: String,
    },
}
