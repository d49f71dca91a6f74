//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core library error type
///
/// Password failures deliberately carry no detail: a wrong password and a
/// tampered ciphertext render the same message.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid recovery phrase")]
    InvalidMnemonic,

    #[error("Invalid derivation path: {0}")]
    InvalidDerivationPath(String),

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Wallet is locked")]
    WalletLocked,

    #[error("No active account")]
    NoActiveAccount,

    #[error("Wallet is not initialized")]
    WalletNotInitialized,

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Request rejected by user")]
    ApprovalRejected,

    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkUnavailable(msg.into())
    }

    /// Whether a background run may simply retry on the next tick
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkUnavailable(_) | Self::Timeout)
    }

    /// Stable identifier for the interface layer
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidMnemonic => "invalidMnemonic",
            Self::InvalidDerivationPath(_) => "invalidDerivationPath",
            Self::InvalidPassword => "invalidPassword",
            Self::WalletLocked => "walletLocked",
            Self::NoActiveAccount => "noActiveAccount",
            Self::WalletNotInitialized => "walletNotInitialized",
            Self::NetworkUnavailable(_) => "networkUnavailable",
            Self::Timeout => "timeout",
            Self::UnknownMethod(_) => "unknownMethod",
            Self::ApprovalRejected => "approvalRejected",
            Self::TransactionRejected(_) => "transactionRejected",
            Self::Validation(_) => "validation",
            Self::Storage(_) | Self::Io(_) | Self::Json(_) => "internal",
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (serialized back to the interface layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Create a failed result with context
    pub fn fail_with_context(
        error: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: Some(context),
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => e.into(),
        }
    }
}

impl<T> From<Error> for OperationResult<T> {
    fn from(error: Error) -> Self {
        let context = HashMap::from([("code".to_string(), serde_json::json!(error.code()))]);
        Self::fail_with_context(error.to_string(), context)
    }
}
