//! Request dispatcher for the interface layer
//!
//! Raw JSON requests are checked against the closed method set, parsed into a
//! typed `WalletRequest` and answered within a deadline. Signing goes through
//! the approval port every time; the approver's password is what unseals the
//! phrase for that one signature.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value as JsonValue;

use crate::domain::request::METHODS;
use crate::domain::result::{Error, OperationResult, Result};
use crate::domain::{Account, WalletRequest, WalletResponse};
use crate::ports::{Approval, ApprovalRequest, Approver, KeyValueStore, KeyValueStoreExt, StoreKey};
use crate::services::accounts::AccountStore;
use crate::services::keys;
use crate::services::logging::{EntryPoint, LogEvent, LoggingService};
use crate::services::vault::SecretVault;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RequestDispatcher {
    store: Arc<dyn KeyValueStore>,
    vault: SecretVault,
    accounts: AccountStore,
    approver: Arc<dyn Approver>,
    logger: Option<Arc<LoggingService>>,
    timeout: Duration,
}

impl RequestDispatcher {
    pub fn new(store: Arc<dyn KeyValueStore>, approver: Arc<dyn Approver>) -> Self {
        Self {
            vault: SecretVault::new(store.clone()),
            accounts: AccountStore::new(store.clone()),
            store,
            approver,
            logger: None,
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Answer a raw JSON request; never panics on malformed input
    pub async fn handle_raw(&self, raw: &str) -> OperationResult<WalletResponse> {
        let request = match parse_request(raw) {
            Ok(request) => request,
            Err(e) => {
                self.log(LogEvent::new("request_rejected").with_error(e.to_string()));
                return e.into();
            }
        };
        self.handle(request).await.into()
    }

    /// Answer a typed request within the deadline
    pub async fn handle(&self, request: WalletRequest) -> Result<WalletResponse> {
        let method = request.method();
        let result = match tokio::time::timeout(self.timeout, self.dispatch(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        };

        match &result {
            Ok(_) => self.log(LogEvent::new("request_handled").with_method(method)),
            Err(e) => self.log(
                LogEvent::new("request_rejected")
                    .with_method(method)
                    .with_error(e.to_string()),
            ),
        }
        result
    }

    async fn dispatch(&self, request: WalletRequest) -> Result<WalletResponse> {
        match request {
            WalletRequest::GetPublicKey => {
                let account = self.unlocked_account()?;
                Ok(WalletResponse::PublicKey {
                    public_key: account.public_key,
                })
            }
            WalletRequest::Connect(params) => {
                let account = self.unlocked_account()?;
                self.store
                    .update_json(StoreKey::ConnectedOrigins, |origins: &mut Vec<String>| {
                        if !origins.contains(&params.origin) {
                            origins.push(params.origin.clone());
                        }
                        Ok(())
                    })?;
                Ok(WalletResponse::Connected {
                    public_key: account.public_key,
                    auto_approve: false,
                })
            }
            WalletRequest::Disconnect(params) => {
                self.store
                    .update_json(StoreKey::ConnectedOrigins, |origins: &mut Vec<String>| {
                        origins.retain(|o| o != &params.origin);
                        Ok(())
                    })?;
                Ok(WalletResponse::Disconnected)
            }
            WalletRequest::SignTransaction(params) => {
                self.sign(&params.origin, "signTransaction", &params.transaction)
                    .await
            }
            WalletRequest::SignMessage(params) => {
                self.sign(&params.origin, "signMessage", &params.message).await
            }
        }
    }

    fn unlocked_account(&self) -> Result<Account> {
        if self.vault.is_locked()? {
            return Err(Error::WalletLocked);
        }
        self.accounts.active_account()
    }

    pub fn connected_origins(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .get_json(StoreKey::ConnectedOrigins)?
            .unwrap_or_default())
    }

    async fn sign(&self, origin: &str, method: &str, payload: &str) -> Result<WalletResponse> {
        let account = self.unlocked_account()?;
        if !self.connected_origins()?.iter().any(|o| o == origin) {
            return Err(Error::validation("Origin is not connected"));
        }
        let bytes = BASE64
            .decode(payload)
            .map_err(|_| Error::validation("Payload is not valid base64"))?;

        let request = ApprovalRequest::new(
            origin,
            method,
            account.public_key.clone(),
            format!("{} bytes to sign", bytes.len()),
        );
        let password = match self.approver.request_approval(&request).await? {
            Approval::Approved { password } => password,
            Approval::Rejected => return Err(Error::ApprovalRejected),
        };

        let phrase = self.vault.reveal_mnemonic(&password).await?;
        let index = account.index;
        let keypair = keys::blocking(move || keys::derive_account_keypair(&phrase, index)).await?;

        if keypair.public_key() != account.public_key {
            return Err(Error::storage("Stored account does not match the recovery phrase"));
        }

        Ok(WalletResponse::Signed {
            public_key: account.public_key,
            signature: keys::sign_message(&keypair, &bytes),
        })
    }

    fn log(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            logger.log_quietly(event.with_entry_point(EntryPoint::Dispatcher));
        }
    }
}

/// Check the method name before the typed parse so unknown methods get their
/// own error instead of a serde message
fn parse_request(raw: &str) -> Result<WalletRequest> {
    let value: JsonValue = serde_json::from_str(raw)
        .map_err(|_| Error::validation("Request is not valid JSON"))?;
    let method = value
        .get("method")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::validation("Request has no method"))?;
    if !METHODS.contains(&method) {
        return Err(Error::UnknownMethod(method.to_string()));
    }
    serde_json::from_value(value)
        .map_err(|e| Error::validation(format!("Invalid params: {}", e)))
}
