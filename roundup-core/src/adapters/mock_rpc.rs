//! Mock JSON-RPC node for testing
//!
//! Serves the read methods the ledger client uses from a fixed list of
//! transactions, with switches for HTTP failures, RPC error objects and delays.
//! Transactions are listed newest first, as a real node returns them.
//! Submitted transactions are parsed and kept for inspection.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value as JsonValue};

use crate::domain::wire::Transaction;

/// Token account index used for every mocked token balance
const TOKEN_ACCOUNT_INDEX: usize = 1;
const TOKEN_ACCOUNT: &str = "TokenAcct1111111111111111111111111111111111";
pub const MOCK_BLOCKHASH: &str = "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N";

/// One mocked transaction touching the configured owner
#[derive(Debug, Clone)]
pub struct MockTransaction {
    pub signature: String,
    pub slot: u64,
    pub failed: bool,
    pub pre_lamports: u64,
    pub post_lamports: u64,
    /// (mint, pre raw amount, post raw amount), six decimals
    pub token: Option<(String, String, String)>,
}

impl MockTransaction {
    pub fn native(signature: &str, slot: u64, pre_lamports: u64, post_lamports: u64) -> Self {
        Self {
            signature: signature.to_string(),
            slot,
            failed: false,
            pre_lamports,
            post_lamports,
            token: None,
        }
    }

    pub fn stable(signature: &str, slot: u64, mint: &str, pre: &str, post: &str) -> Self {
        Self {
            signature: signature.to_string(),
            slot,
            failed: false,
            pre_lamports: 1_000_000_000,
            post_lamports: 1_000_000_000,
            token: Some((mint.to_string(), pre.to_string(), post.to_string())),
        }
    }

    pub fn failed(mut self) -> Self {
        self.failed = true;
        self
    }

    fn err(&self) -> JsonValue {
        if self.failed {
            json!({ "InstructionError": [0, "Custom"] })
        } else {
            JsonValue::Null
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockRpcConfig {
    pub owner: String,
    pub transactions: Vec<MockTransaction>,
    pub native_balance: u64,
    /// (raw amount, decimals)
    pub token_balance: (String, u32),
    /// Answer every request with this HTTP status
    pub fail_status: Option<u16>,
    /// Answer every request with this JSON-RPC error object
    pub rpc_error: Option<(i64, String)>,
    /// Refuse sendTransaction with this message; other methods still answer
    pub reject_submit: Option<String>,
    pub delay_ms: u64,
}

impl Default for MockRpcConfig {
    fn default() -> Self {
        Self {
            owner: "Owner1111111111111111111111111111111111111".to_string(),
            transactions: Vec::new(),
            native_balance: 0,
            token_balance: ("0".to_string(), 6),
            fail_status: None,
            rpc_error: None,
            reject_submit: None,
            delay_ms: 0,
        }
    }
}

struct Shared {
    config: MockRpcConfig,
    submitted: Mutex<Vec<Transaction>>,
}

/// Mock RPC server on a random local port
pub struct MockRpcServer {
    port: u16,
    running: Arc<AtomicBool>,
    shared: Arc<Shared>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl MockRpcServer {
    pub fn start(config: MockRpcConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        // Non-blocking so the accept loop can observe shutdown
        listener.set_nonblocking(true)?;

        let shared = Arc::new(Shared {
            config,
            submitted: Mutex::new(Vec::new()),
        });
        let shared_clone = Arc::clone(&shared);
        let thread_handle = thread::spawn(move || {
            while running_clone.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let shared = Arc::clone(&shared_clone);
                        thread::spawn(move || handle_connection(stream, &shared));
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(std::time::Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            port,
            running,
            shared,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Transactions accepted by sendTransaction, oldest first
    pub fn submitted(&self) -> Vec<Transaction> {
        self.shared
            .submitted
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockRpcServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read one HTTP request and return its body
fn read_body(stream: &mut TcpStream) -> Option<String> {
    stream.set_nonblocking(false).ok()?;
    let mut data = Vec::new();
    let mut buffer = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut buffer).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buffer[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&data[..header_end]).to_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while data.len() < header_end + content_length {
        let n = stream.read(&mut buffer).ok()?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buffer[..n]);
    }

    Some(String::from_utf8_lossy(&data[header_end..]).into_owned())
}

fn handle_connection(mut stream: TcpStream, shared: &Shared) {
    let Some(body) = read_body(&mut stream) else {
        return;
    };
    let config = &shared.config;

    if config.delay_ms > 0 {
        thread::sleep(std::time::Duration::from_millis(config.delay_ms));
    }

    if let Some(status) = config.fail_status {
        send_response(&mut stream, status, r#"{"error":"unavailable"}"#);
        return;
    }

    let request: JsonValue = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(_) => {
            send_response(&mut stream, 400, r#"{"error":"bad json"}"#);
            return;
        }
    };
    let id = request["id"].clone();

    let reply = if let Some((code, message)) = &config.rpc_error {
        json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
    } else {
        let method = request["method"].as_str().unwrap_or_default();
        match route(method, &request["params"], shared) {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err((code, message)) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": code, "message": message }
            }),
        }
    };

    send_response(&mut stream, 200, &reply.to_string());
}

fn route(method: &str, params: &JsonValue, shared: &Shared) -> Result<JsonValue, (i64, String)> {
    let config = &shared.config;
    match method {
        "getSignaturesForAddress" => Ok(signatures(params, config)),
        "getTransaction" => {
            let signature = params[0].as_str().unwrap_or_default();
            Ok(config
                .transactions
                .iter()
                .find(|tx| tx.signature == signature)
                .map(|tx| transaction(tx, config))
                .unwrap_or(JsonValue::Null))
        }
        "getBalance" => Ok(json!({ "context": { "slot": 1 }, "value": config.native_balance })),
        "getTokenAccountsByOwner" => {
            // Only the configured owner holds tokens
            if params[0].as_str() != Some(config.owner.as_str()) {
                return Ok(json!({ "context": { "slot": 1 }, "value": [] }));
            }
            let (amount, decimals) = &config.token_balance;
            Ok(json!({
                "context": { "slot": 1 },
                "value": [{
                    "pubkey": TOKEN_ACCOUNT,
                    "account": { "data": { "parsed": { "info": {
                        "tokenAmount": { "amount": amount, "decimals": decimals }
                    }}}}
                }]
            }))
        }
        "getLatestBlockhash" => Ok(json!({
            "context": { "slot": 1 },
            "value": { "blockhash": MOCK_BLOCKHASH, "lastValidBlockHeight": 100 }
        })),
        "sendTransaction" => submit(params, shared),
        _ => Err((-32601, "Method not found".to_string())),
    }
}

fn submit(params: &JsonValue, shared: &Shared) -> Result<JsonValue, (i64, String)> {
    if let Some(message) = &shared.config.reject_submit {
        return Err((-32002, message.clone()));
    }
    let invalid = |reason: &str| (-32602, format!("invalid transaction: {}", reason));

    let bytes = BASE64
        .decode(params[0].as_str().unwrap_or_default())
        .map_err(|_| invalid("not base64"))?;
    let tx = Transaction::parse(&bytes).map_err(|e| invalid(&e.to_string()))?;
    let id = tx.id().ok_or_else(|| invalid("unsigned"))?;
    if let Ok(mut submitted) = shared.submitted.lock() {
        submitted.push(tx);
    }
    Ok(json!(id))
}

fn signatures(params: &JsonValue, config: &MockRpcConfig) -> JsonValue {
    let options = &params[1];
    let limit = options["limit"].as_u64().unwrap_or(1000) as usize;
    let before = options["before"].as_str();
    let until = options["until"].as_str();

    let mut started = before.is_none();
    let mut listed = Vec::new();
    for tx in &config.transactions {
        if !started {
            started = Some(tx.signature.as_str()) == before;
            continue;
        }
        if Some(tx.signature.as_str()) == until || listed.len() >= limit {
            break;
        }
        listed.push(json!({
            "signature": tx.signature,
            "slot": tx.slot,
            "blockTime": 1_700_000_000 + tx.slot as i64,
            "err": tx.err(),
        }));
    }
    JsonValue::Array(listed)
}

fn transaction(tx: &MockTransaction, config: &MockRpcConfig) -> JsonValue {
    let token_balance = |mint: &str, amount: &str| {
        json!([{
            "accountIndex": TOKEN_ACCOUNT_INDEX,
            "mint": mint,
            "owner": config.owner,
            "uiTokenAmount": { "amount": amount, "decimals": 6 }
        }])
    };
    let (pre_tokens, post_tokens) = match &tx.token {
        Some((mint, pre, post)) => (token_balance(mint, pre), token_balance(mint, post)),
        None => (json!([]), json!([])),
    };

    json!({
        "slot": tx.slot,
        "blockTime": 1_700_000_000 + tx.slot as i64,
        "meta": {
            "err": tx.err(),
            "fee": 5000,
            "preBalances": [tx.pre_lamports, 2_039_280],
            "postBalances": [tx.post_lamports, 2_039_280],
            "preTokenBalances": pre_tokens,
            "postTokenBalances": post_tokens,
        },
        "transaction": {
            "message": {
                "accountKeys": [
                    { "pubkey": config.owner, "signer": true, "writable": true },
                    { "pubkey": TOKEN_ACCOUNT, "signer": false, "writable": true },
                ]
            }
        }
    })
}

fn send_response(stream: &mut TcpStream, status: u16, body: &str) {
    let status_text = match status {
        200 => "OK",
        400 => "Bad Request",
        429 => "Too Many Requests",
        503 => "Service Unavailable",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}
