//! JSON-RPC ledger client
//!
//! Talks to a Solana-compatible RPC node for the Primary and Test networks.
//! Reads cover what the scanner and balance queries need: getSignaturesForAddress,
//! getTransaction, getBalance and getTokenAccountsByOwner. Transfers use
//! getLatestBlockhash and sendTransaction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use url::Url;

use crate::domain::chain::lamports_to_coin;
use crate::domain::result::{Error, Result};
use crate::domain::{SignatureInfo, TokenAccount, TokenBalance, TransactionDetail};
use crate::ports::{LedgerClient, SignatureQuery};

/// Commitment level for every read
const COMMITMENT: &str = "confirmed";

// =============================================================================
// Wire models
// =============================================================================

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: JsonValue,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcSignature {
    signature: String,
    slot: u64,
    #[serde(default)]
    block_time: Option<i64>,
    #[serde(default)]
    err: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    slot: u64,
    #[serde(default)]
    block_time: Option<i64>,
    #[serde(default)]
    meta: Option<RpcMeta>,
    transaction: RpcTransactionBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcMeta {
    #[serde(default)]
    err: Option<JsonValue>,
    #[serde(default)]
    pre_balances: Vec<u64>,
    #[serde(default)]
    post_balances: Vec<u64>,
    #[serde(default)]
    pre_token_balances: Option<Vec<RpcTokenBalance>>,
    #[serde(default)]
    post_token_balances: Option<Vec<RpcTokenBalance>>,
}

#[derive(Debug, Deserialize)]
struct RpcTransactionBody {
    message: RpcMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcMessage {
    account_keys: Vec<RpcAccountKey>,
}

/// `jsonParsed` returns objects, other encodings return bare strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RpcAccountKey {
    Plain(String),
    Parsed { pubkey: String },
}

impl RpcAccountKey {
    fn into_address(self) -> String {
        match self {
            RpcAccountKey::Plain(address) => address,
            RpcAccountKey::Parsed { pubkey } => pubkey,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTokenBalance {
    account_index: usize,
    mint: String,
    #[serde(default)]
    owner: Option<String>,
    ui_token_amount: RpcTokenAmount,
}

#[derive(Debug, Deserialize)]
struct RpcTokenAmount {
    amount: String,
    decimals: u32,
}

impl RpcTokenAmount {
    fn raw(&self) -> Result<u64> {
        self.amount
            .parse()
            .map_err(|_| Error::network(format!("Invalid token amount: {}", self.amount)))
    }
}

impl From<RpcTokenBalance> for TokenBalance {
    fn from(balance: RpcTokenBalance) -> Self {
        TokenBalance {
            account_index: balance.account_index,
            mint: balance.mint,
            owner: balance.owner,
            amount: balance.ui_token_amount.amount,
            decimals: balance.ui_token_amount.decimals,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcContextValue<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct RpcKeyedAccount {
    pubkey: String,
    account: RpcParsedAccount,
}

impl RpcKeyedAccount {
    fn into_token_account(self) -> Result<TokenAccount> {
        let amount = self.account.data.parsed.info.token_amount;
        Ok(TokenAccount {
            address: self.pubkey,
            amount: amount.raw()?,
            decimals: amount.decimals,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RpcBlockhash {
    blockhash: String,
}

#[derive(Debug, Deserialize)]
struct RpcParsedAccount {
    data: RpcParsedData,
}

#[derive(Debug, Deserialize)]
struct RpcParsedData {
    parsed: RpcParsedToken,
}

#[derive(Debug, Deserialize)]
struct RpcParsedToken {
    info: RpcTokenInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTokenInfo {
    token_amount: RpcTokenAmount,
}

impl RpcTransaction {
    fn into_detail(self) -> TransactionDetail {
        let meta = self.meta.unwrap_or(RpcMeta {
            err: None,
            pre_balances: Vec::new(),
            post_balances: Vec::new(),
            pre_token_balances: None,
            post_token_balances: None,
        });

        TransactionDetail {
            slot: self.slot,
            block_time: self.block_time,
            error: meta.err,
            pre_balances: meta.pre_balances,
            post_balances: meta.post_balances,
            pre_token_balances: meta
                .pre_token_balances
                .unwrap_or_default()
                .into_iter()
                .map(TokenBalance::from)
                .collect(),
            post_token_balances: meta
                .post_token_balances
                .unwrap_or_default()
                .into_iter()
                .map(TokenBalance::from)
                .collect(),
            account_keys: self
                .transaction
                .message
                .account_keys
                .into_iter()
                .map(RpcAccountKey::into_address)
                .collect(),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Ledger client over HTTP JSON-RPC
#[derive(Debug)]
pub struct SolanaRpcClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
    next_id: AtomicU64,
}

impl SolanaRpcClient {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let url = Url::parse(endpoint).with_context(|| format!("Invalid RPC URL: {}", endpoint))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("RPC URL must be http or https: {}", endpoint);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: url.to_string(),
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Per-request HTTP timeout this client was built with
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// One round trip; JSON-RPC error objects are left for the caller
    async fn exchange<T: DeserializeOwned>(&self, method: &str, params: JsonValue) -> Result<RpcResponse<T>> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        self.check_response_status(&response)?;

        response
            .json()
            .await
            .map_err(|e| self.map_request_error(e))
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: JsonValue) -> Result<Option<T>> {
        let body: RpcResponse<T> = self.exchange(method, params).await?;
        if let Some(error) = body.error {
            return Err(Error::network(format!(
                "RPC {} failed ({}): {}",
                method, error.code, error.message
            )));
        }

        Ok(body.result)
    }

    async fn call_required<T: DeserializeOwned>(&self, method: &str, params: JsonValue) -> Result<T> {
        self.call(method, params)
            .await?
            .ok_or_else(|| Error::network(format!("RPC {} returned no result", method)))
    }

    fn map_request_error(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::Timeout
        } else if error.is_connect() {
            Error::network("Unable to connect to the RPC node")
        } else if error.is_decode() {
            Error::network(format!("Malformed RPC response: {}", error))
        } else {
            Error::network(format!("RPC request failed: {}", error))
        }
    }

    async fn token_accounts(&self, owner: &str, mint: &str) -> Result<Vec<TokenAccount>> {
        let accounts: RpcContextValue<Vec<RpcKeyedAccount>> = self
            .call_required(
                "getTokenAccountsByOwner",
                json!([owner, { "mint": mint }, { "encoding": "jsonParsed", "commitment": COMMITMENT }]),
            )
            .await?;
        accounts
            .value
            .into_iter()
            .map(RpcKeyedAccount::into_token_account)
            .collect()
    }

    fn check_response_status(&self, response: &reqwest::Response) -> Result<()> {
        match response.status().as_u16() {
            200..=299 => Ok(()),
            429 => Err(Error::network("RPC rate limit exceeded")),
            403 => Err(Error::network("RPC access denied")),
            status => Err(Error::network(format!("RPC error: HTTP {}", status))),
        }
    }
}

#[async_trait]
impl LedgerClient for SolanaRpcClient {
    fn name(&self) -> &str {
        "rpc"
    }

    async fn list_signatures(
        &self,
        address: &str,
        query: &SignatureQuery,
    ) -> Result<Vec<SignatureInfo>> {
        let mut options = json!({ "limit": query.limit, "commitment": COMMITMENT });
        if let Some(before) = &query.before {
            options["before"] = json!(before);
        }
        if let Some(until) = &query.until {
            options["until"] = json!(until);
        }

        let signatures: Vec<RpcSignature> = self
            .call_required("getSignaturesForAddress", json!([address, options]))
            .await?;

        Ok(signatures
            .into_iter()
            .map(|s| SignatureInfo {
                signature: s.signature,
                slot: s.slot,
                block_time: s.block_time,
                err: s.err,
            })
            .collect())
    }

    async fn fetch_transaction_detail(&self, signature: &str) -> Result<Option<TransactionDetail>> {
        let options = json!({
            "encoding": "jsonParsed",
            "maxSupportedTransactionVersion": 0,
            "commitment": COMMITMENT,
        });
        let transaction: Option<RpcTransaction> =
            self.call("getTransaction", json!([signature, options])).await?;
        Ok(transaction.map(RpcTransaction::into_detail))
    }

    async fn get_balance(&self, address: &str) -> Result<Decimal> {
        let balance: RpcContextValue<u64> = self
            .call_required("getBalance", json!([address, { "commitment": COMMITMENT }]))
            .await?;
        Ok(lamports_to_coin(balance.value))
    }

    async fn get_token_balance(&self, owner: &str, mint: &str) -> Result<Decimal> {
        let mut total = Decimal::ZERO;
        for account in self.token_accounts(owner, mint).await? {
            total += Decimal::try_from_i128_with_scale(i128::from(account.amount), account.decimals)
                .map_err(|e| Error::network(format!("Invalid token amount: {}", e)))?;
        }
        Ok(total)
    }

    async fn find_token_account(&self, owner: &str, mint: &str) -> Result<Option<TokenAccount>> {
        Ok(self
            .token_accounts(owner, mint)
            .await?
            .into_iter()
            .max_by_key(|account| account.amount))
    }

    async fn latest_blockhash(&self) -> Result<String> {
        let latest: RpcContextValue<RpcBlockhash> = self
            .call_required("getLatestBlockhash", json!([{ "commitment": COMMITMENT }]))
            .await?;
        Ok(latest.value.blockhash)
    }

    async fn submit_transaction(&self, transaction: &[u8]) -> Result<String> {
        let options = json!({ "encoding": "base64", "preflightCommitment": COMMITMENT });
        let body: RpcResponse<String> = self
            .exchange("sendTransaction", json!([BASE64.encode(transaction), options]))
            .await?;
        if let Some(error) = body.error {
            return Err(Error::TransactionRejected(error.message));
        }
        body.result
            .ok_or_else(|| Error::network("RPC sendTransaction returned no result"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock_rpc::{MockRpcConfig, MockRpcServer, MockTransaction, MOCK_BLOCKHASH};
    use crate::domain::transfer::native_transfer;
    use crate::domain::wire::{decode_pubkey, Message, Transaction};
    use crate::services::keys::Keypair;

    const OWNER: &str = "Owner1111111111111111111111111111111111111";
    const MINT: &str = crate::domain::settings::TEST_STABLE_MINT;

    fn client_for(server: &MockRpcServer) -> SolanaRpcClient {
        SolanaRpcClient::new(&server.base_url(), Duration::from_secs(5)).unwrap()
    }

    fn signed_transfer(blockhash: &str) -> Transaction {
        let keypair = Keypair::from_secret(&[1; 32]);
        let from = keypair.verifying_key().to_bytes();
        let message =
            Message::compile(&from, &[native_transfer(&from, &[2; 32], 1_000)], decode_pubkey(blockhash).unwrap())
                .unwrap();
        let signature = keypair.sign(&message.serialize()).to_bytes();
        Transaction {
            signatures: vec![signature],
            message,
        }
    }

    #[test]
    fn test_rejects_bad_url() {
        assert!(SolanaRpcClient::new("not a url", Duration::from_secs(1)).is_err());
        assert!(SolanaRpcClient::new("ftp://node", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_account_key_shapes() {
        let keys: Vec<RpcAccountKey> =
            serde_json::from_str(r#"["A", {"pubkey": "B", "signer": true, "writable": true}]"#).unwrap();
        let addresses: Vec<String> = keys.into_iter().map(RpcAccountKey::into_address).collect();
        assert_eq!(addresses, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_list_signatures_respects_until() {
        let server = MockRpcServer::start(MockRpcConfig {
            owner: OWNER.to_string(),
            transactions: vec![
                MockTransaction::native("sig3", 30, 2_000_000_000, 1_000_000_000),
                MockTransaction::native("sig2", 20, 3_000_000_000, 2_000_000_000),
                MockTransaction::native("sig1", 10, 4_000_000_000, 3_000_000_000),
            ],
            ..Default::default()
        })
        .unwrap();
        let client = client_for(&server);

        let query = SignatureQuery {
            limit: 20,
            before: None,
            until: Some("sig1".to_string()),
        };
        let signatures = client.list_signatures(OWNER, &query).await.unwrap();
        let names: Vec<&str> = signatures.iter().map(|s| s.signature.as_str()).collect();
        assert_eq!(names, vec!["sig3", "sig2"]);
    }

    #[tokio::test]
    async fn test_fetch_transaction_detail() {
        let server = MockRpcServer::start(MockRpcConfig {
            owner: OWNER.to_string(),
            transactions: vec![MockTransaction::stable("sigS", 5, MINT, "10000000", "39670000")],
            ..Default::default()
        })
        .unwrap();
        let client = client_for(&server);

        let detail = client.fetch_transaction_detail("sigS").await.unwrap().unwrap();
        assert_eq!(detail.slot, 5);
        assert_eq!(detail.account_keys[0], OWNER);
        assert_eq!(detail.post_token_balances[0].mint, MINT);
        assert_eq!(detail.post_token_balances[0].owner.as_deref(), Some(OWNER));

        assert!(client.fetch_transaction_detail("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_balances() {
        let server = MockRpcServer::start(MockRpcConfig {
            owner: OWNER.to_string(),
            native_balance: 2_500_000_000,
            token_balance: ("12340000".to_string(), 6),
            ..Default::default()
        })
        .unwrap();
        let client = client_for(&server);

        assert_eq!(client.get_balance(OWNER).await.unwrap(), Decimal::new(25, 1));
        assert_eq!(
            client.get_token_balance(OWNER, MINT).await.unwrap(),
            Decimal::new(1234, 2)
        );
    }

    #[tokio::test]
    async fn test_http_failure_is_network_error() {
        let server = MockRpcServer::start(MockRpcConfig {
            fail_status: Some(503),
            ..Default::default()
        })
        .unwrap();
        let client = client_for(&server);

        let err = client.get_balance(OWNER).await.unwrap_err();
        assert!(matches!(err, Error::NetworkUnavailable(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_slow_node_times_out() {
        let server = MockRpcServer::start(MockRpcConfig {
            delay_ms: 500,
            ..Default::default()
        })
        .unwrap();
        let client = SolanaRpcClient::new(&server.base_url(), Duration::from_millis(100)).unwrap();

        let err = client.get_balance(OWNER).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn test_rpc_error_object() {
        let server = MockRpcServer::start(MockRpcConfig {
            rpc_error: Some((-32005, "Node is behind".to_string())),
            ..Default::default()
        })
        .unwrap();
        let client = client_for(&server);

        let err = client.list_signatures(OWNER, &SignatureQuery::default()).await.unwrap_err();
        assert!(err.to_string().contains("Node is behind"));
    }

    #[tokio::test]
    async fn test_find_token_account() {
        let server = MockRpcServer::start(MockRpcConfig {
            owner: OWNER.to_string(),
            token_balance: ("12340000".to_string(), 6),
            ..Default::default()
        })
        .unwrap();
        let client = client_for(&server);

        let account = client.find_token_account(OWNER, MINT).await.unwrap().unwrap();
        assert_eq!(account.amount, 12_340_000);
        assert_eq!(account.decimals, 6);
        assert!(!account.address.is_empty());

        assert!(client.find_token_account("Stranger", MINT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_submit_transaction() {
        let server = MockRpcServer::start(MockRpcConfig::default()).unwrap();
        let client = client_for(&server);

        let blockhash = client.latest_blockhash().await.unwrap();
        assert_eq!(blockhash, MOCK_BLOCKHASH);

        let tx = signed_transfer(&blockhash);
        let signature = client.submit_transaction(&tx.serialize()).await.unwrap();
        assert_eq!(Some(signature), tx.id());
        assert_eq!(server.submitted(), vec![tx]);
    }

    #[tokio::test]
    async fn test_refused_submission_is_rejected_not_transient() {
        let server = MockRpcServer::start(MockRpcConfig {
            reject_submit: Some("Blockhash not found".to_string()),
            ..Default::default()
        })
        .unwrap();
        let client = client_for(&server);

        let tx = signed_transfer(MOCK_BLOCKHASH);
        let err = client.submit_transaction(&tx.serialize()).await.unwrap_err();
        assert!(matches!(&err, Error::TransactionRejected(m) if m == "Blockhash not found"));
        assert!(!err.is_transient());
        assert!(server.submitted().is_empty());
    }
}
