//! Simulated ledger for the Simulated network and for tests
//!
//! In demo mode every address gets the same deterministic purchase history on
//! first contact: a handful of stable-token card payments, one native transfer
//! and one fee-only transaction below the dust threshold. Tests script their
//! own activity instead and can switch the ledger offline or make single
//! detail fetches fail.
//!
//! Submitted transfers are verified and applied in memory: balances move, a
//! fee is charged to the payer and the transaction shows up in every party's
//! activity.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::domain::chain::{lamports_to_coin, LAMPORTS_PER_COIN};
use crate::domain::result::{Error, Result};
use crate::domain::settings::TEST_STABLE_MINT;
use crate::domain::transfer::{decode_transfer, DecodedTransfer};
use crate::domain::wire::{encode_pubkey, Pubkey, Transaction};
use crate::domain::{SignatureInfo, TokenAccount, TokenBalance, TransactionDetail};
use crate::ports::{LedgerClient, SignatureQuery};

const STABLE_DECIMALS: u32 = 6;
const DEMO_BASE_SLOT: u64 = 250_000_000;
const DEMO_BASE_TIME: i64 = 1_700_000_000;
pub const FEE_LAMPORTS: u64 = 5_000;

/// Starting balances of every demo address
const DEMO_LAMPORTS: u64 = 3 * LAMPORTS_PER_COIN;
const DEMO_STABLE_RAW: u64 = 500_000_000;

/// Demo purchases in stable-token cents, oldest first
const DEMO_PURCHASES: &[(&str, i64)] = &[
    ("Groceries", 4523),
    ("Coffee", 450),
    ("Streaming", 999),
    ("Fuel", 5200),
    ("Rideshare", 1250),
    ("Books", 2967),
    ("Lunch", 1800),
];

/// One scripted transaction
#[derive(Debug, Clone)]
pub struct SimulatedTransaction {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub detail: TransactionDetail,
}

#[derive(Default)]
struct SimState {
    /// Newest first per address
    activity: HashMap<String, Vec<SimulatedTransaction>>,
    balances: HashMap<String, u64>,
    token_balances: HashMap<(String, String), Decimal>,
    seeded: HashSet<String>,
    failing_details: HashSet<String>,
    /// Token account address to (owner, mint)
    token_accounts: HashMap<String, (String, String)>,
    blockhashes: HashSet<Pubkey>,
    offline: bool,
    next_slot: u64,
}

impl SimState {
    /// Insert `detail` as the newest activity of `address` at `slot`
    fn record(&mut self, address: &str, signature: &str, slot: u64, detail: TransactionDetail) {
        let block_time = Some(DEMO_BASE_TIME + slot as i64);
        let tx = SimulatedTransaction {
            signature: signature.to_string(),
            slot,
            block_time,
            detail: TransactionDetail {
                slot,
                block_time,
                ..detail
            },
        };
        self.activity
            .entry(address.to_string())
            .or_default()
            .insert(0, tx);
    }

    fn take_slot(&mut self) -> u64 {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }
}

pub struct SimulatedLedger {
    state: Mutex<SimState>,
    demo: bool,
    latency: Mutex<Duration>,
}

/// Token account address derived from owner and mint
pub fn token_account(owner: &str, mint: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}", owner, mint).as_bytes());
    bs58::encode(digest).into_string()
}

/// Signature-shaped deterministic id
fn demo_signature(address: &str, index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(address.as_bytes());
    hasher.update((index as u64).to_le_bytes());
    let first = hasher.finalize();
    let second = Sha256::digest(first);
    let mut bytes = first.to_vec();
    bytes.extend_from_slice(&second);
    bs58::encode(bytes).into_string()
}

fn token_balance(mint: &str, owner: &str, raw: u64) -> TokenBalance {
    TokenBalance {
        account_index: 1,
        mint: mint.to_string(),
        owner: Some(owner.to_string()),
        amount: raw.to_string(),
        decimals: STABLE_DECIMALS,
    }
}

impl SimulatedLedger {
    /// Empty ledger for scripted tests
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                next_slot: 1,
                ..Default::default()
            }),
            demo: false,
            latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Ledger that seeds demo activity for every address it is asked about
    pub fn demo() -> Self {
        Self {
            state: Mutex::new(SimState {
                // Above every seeded slot, so new activity sorts as newest
                next_slot: DEMO_BASE_SLOT + 1_000,
                ..Default::default()
            }),
            demo: true,
            latency: Mutex::new(Duration::ZERO),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, SimState>> {
        self.state
            .lock()
            .map_err(|e| Error::storage(format!("Lock poisoned: {}", e)))
    }

    /// Make every query fail with `NetworkUnavailable`
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.offline = offline;
        }
    }

    /// Delay applied to every query
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut current) = self.latency.lock() {
            *current = latency;
        }
    }

    /// Make detail fetches for `signature` fail while listing still works
    pub fn fail_detail_for(&self, signature: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_details.insert(signature.to_string());
        }
    }

    pub fn set_balance(&self, address: &str, lamports: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.balances.insert(address.to_string(), lamports);
        }
    }

    /// Set `owner`'s holding of `mint`, opening its token account if needed
    pub fn set_token_balance(&self, owner: &str, mint: &str, amount: Decimal) {
        if let Ok(mut state) = self.state.lock() {
            state
                .token_accounts
                .insert(token_account(owner, mint), (owner.to_string(), mint.to_string()));
            state
                .token_balances
                .insert((owner.to_string(), mint.to_string()), amount);
        }
    }

    /// Add a transaction as the newest for `address`; returns its slot
    pub fn push(&self, address: &str, signature: &str, detail: TransactionDetail) -> u64 {
        let Ok(mut state) = self.state.lock() else {
            return 0;
        };
        let slot = state.take_slot();
        state.record(address, signature, slot, detail);
        slot
    }

    /// Native transfer seen from `address`
    pub fn push_native_transfer(
        &self,
        address: &str,
        signature: &str,
        pre_lamports: u64,
        post_lamports: u64,
    ) -> u64 {
        self.push(
            address,
            signature,
            TransactionDetail {
                pre_balances: vec![pre_lamports],
                post_balances: vec![post_lamports],
                account_keys: vec![address.to_string()],
                ..Default::default()
            },
        )
    }

    /// Stable-token transfer from or to `address`'s token account (raw units)
    pub fn push_stable_transfer(
        &self,
        address: &str,
        signature: &str,
        mint: &str,
        pre_raw: u64,
        post_raw: u64,
    ) -> u64 {
        self.push(
            address,
            signature,
            TransactionDetail {
                pre_balances: vec![LAMPORTS_PER_COIN, 2_039_280],
                post_balances: vec![LAMPORTS_PER_COIN - FEE_LAMPORTS, 2_039_280],
                pre_token_balances: vec![token_balance(mint, address, pre_raw)],
                post_token_balances: vec![token_balance(mint, address, post_raw)],
                account_keys: vec![address.to_string(), token_account(address, mint)],
                ..Default::default()
            },
        )
    }

    /// Transaction that failed on-chain but still moved lamports
    pub fn push_failed(&self, address: &str, signature: &str) -> u64 {
        self.push(
            address,
            signature,
            TransactionDetail {
                error: Some(json!({ "InstructionError": [0, "Custom"] })),
                pre_balances: vec![5 * LAMPORTS_PER_COIN],
                post_balances: vec![2 * LAMPORTS_PER_COIN],
                account_keys: vec![address.to_string()],
                ..Default::default()
            },
        )
    }

    /// Deterministic demo history, newest first
    fn demo_activity(address: &str) -> Vec<SimulatedTransaction> {
        let mint = TEST_STABLE_MINT;
        let mut activity = Vec::new();
        let mut stable_raw: u64 = DEMO_STABLE_RAW;
        let mut lamports: u64 = DEMO_LAMPORTS;
        let mut index = 0;

        let mut record = |detail: TransactionDetail| {
            let slot = DEMO_BASE_SLOT + 10 * index as u64;
            let block_time = Some(DEMO_BASE_TIME + 400 * index as i64);
            activity.push(SimulatedTransaction {
                signature: demo_signature(address, index),
                slot,
                block_time,
                detail: TransactionDetail {
                    slot,
                    block_time,
                    ..detail
                },
            });
            index += 1;
        };

        for (_, cents) in DEMO_PURCHASES {
            let spent = (*cents as u64) * 10u64.pow(STABLE_DECIMALS - 2);
            let post_raw = stable_raw - spent;
            record(TransactionDetail {
                pre_balances: vec![lamports, 2_039_280],
                post_balances: vec![lamports - FEE_LAMPORTS, 2_039_280],
                pre_token_balances: vec![token_balance(mint, address, stable_raw)],
                post_token_balances: vec![token_balance(mint, address, post_raw)],
                account_keys: vec![address.to_string(), token_account(address, mint)],
                ..Default::default()
            });
            stable_raw = post_raw;
            lamports -= FEE_LAMPORTS;
        }

        // 0.2475 native sent out
        let sent = 247_500_000;
        record(TransactionDetail {
            pre_balances: vec![lamports],
            post_balances: vec![lamports - sent - FEE_LAMPORTS],
            account_keys: vec![address.to_string()],
            ..Default::default()
        });
        lamports -= sent + FEE_LAMPORTS;

        // Fee only, below the dust threshold
        record(TransactionDetail {
            pre_balances: vec![lamports],
            post_balances: vec![lamports - FEE_LAMPORTS],
            account_keys: vec![address.to_string()],
            ..Default::default()
        });

        activity.reverse();
        activity
    }

    async fn simulate_latency(&self) {
        let latency = self.latency.lock().map(|l| *l).unwrap_or_default();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn ensure_seeded(&self, state: &mut SimState, address: &str) {
        if !self.demo || state.seeded.contains(address) {
            return;
        }
        state.seeded.insert(address.to_string());
        let mut demo = Self::demo_activity(address);
        let existing = state.activity.entry(address.to_string()).or_default();
        existing.append(&mut demo);
    }

    fn check_online(state: &SimState) -> Result<()> {
        if state.offline {
            return Err(Error::network("Simulated ledger is offline"));
        }
        Ok(())
    }

    fn lamports_of(&self, state: &SimState, address: &str) -> u64 {
        state
            .balances
            .get(address)
            .copied()
            .unwrap_or(if self.demo { DEMO_LAMPORTS } else { 0 })
    }

    fn holds_token_account(&self, state: &SimState, owner: &str, mint: &str) -> bool {
        state
            .token_balances
            .contains_key(&(owner.to_string(), mint.to_string()))
            || (self.demo && mint == TEST_STABLE_MINT)
    }

    fn tokens_of(&self, state: &SimState, owner: &str, mint: &str) -> Decimal {
        let key = (owner.to_string(), mint.to_string());
        state.token_balances.get(&key).copied().unwrap_or_else(|| {
            if self.demo && mint == TEST_STABLE_MINT {
                Decimal::from_i128_with_scale(i128::from(DEMO_STABLE_RAW), STABLE_DECIMALS)
            } else {
                Decimal::ZERO
            }
        })
    }

    fn raw_tokens_of(&self, state: &SimState, owner: &str, mint: &str) -> u64 {
        let scale = Decimal::from(10u64.pow(STABLE_DECIMALS));
        (self.tokens_of(state, owner, mint) * scale)
            .trunc()
            .to_u64()
            .unwrap_or(0)
    }

    /// Check `tx` against the current balances and apply it
    ///
    /// Nothing changes unless every instruction succeeds.
    fn apply(&self, state: &mut SimState, tx: &Transaction) -> Result<String> {
        let rejected = |reason: &str| Error::TransactionRejected(reason.to_string());
        let message = &tx.message;

        let signature = tx.id().ok_or_else(|| rejected("Transaction is unsigned"))?;
        if !state.blockhashes.contains(&message.recent_blockhash) {
            return Err(rejected("Blockhash not found"));
        }
        let signed = message.serialize();
        for (key, sig) in message.signer_keys().iter().zip(&tx.signatures) {
            let key = VerifyingKey::from_bytes(key).map_err(|_| rejected("Invalid signer key"))?;
            key.verify(&signed, &Signature::from_bytes(sig))
                .map_err(|_| rejected("Signature verification failed"))?;
        }
        if state.activity.values().flatten().any(|t| t.signature == signature) {
            return Err(rejected("Transaction already processed"));
        }

        let signers = message.signer_keys();
        let is_signer = |key: &Pubkey| signers.contains(key);
        let payer = encode_pubkey(&message.account_keys[0]);

        // Working balances; written back only once everything checks out
        let mut native: HashMap<String, u64> = HashMap::new();
        let mut tokens: HashMap<(String, String), u64> = HashMap::new();
        let mut parties = vec![payer.clone()];
        let mut token_rows: Vec<(String, String, String)> = Vec::new();

        let debit = |held: &mut u64, amount: u64| -> Result<()> {
            *held = held
                .checked_sub(amount)
                .ok_or_else(|| rejected("Insufficient funds"))?;
            Ok(())
        };

        let fee = native
            .entry(payer.clone())
            .or_insert_with(|| self.lamports_of(state, &payer));
        debit(fee, FEE_LAMPORTS)?;

        for instruction in &message.instructions {
            let transfer = decode_transfer(message, instruction)
                .ok_or_else(|| rejected("Unsupported instruction"))?;
            match transfer {
                DecodedTransfer::Native { from, to, lamports } => {
                    if !is_signer(&from) {
                        return Err(rejected("Missing signature for sender"));
                    }
                    let (from, to) = (encode_pubkey(&from), encode_pubkey(&to));
                    let held = native
                        .entry(from.clone())
                        .or_insert_with(|| self.lamports_of(state, &from));
                    debit(held, lamports)?;
                    let received = native
                        .entry(to.clone())
                        .or_insert_with(|| self.lamports_of(state, &to));
                    *received = received.saturating_add(lamports);
                    parties.push(to);
                }
                DecodedTransfer::Token {
                    source,
                    destination,
                    owner,
                    amount,
                } => {
                    if !is_signer(&owner) {
                        return Err(rejected("Missing signature for token owner"));
                    }
                    let (source, destination) = (encode_pubkey(&source), encode_pubkey(&destination));
                    let (source_owner, mint) = state
                        .token_accounts
                        .get(&source)
                        .cloned()
                        .ok_or_else(|| rejected("Unknown source token account"))?;
                    if source_owner != encode_pubkey(&owner) {
                        return Err(rejected("Owner does not match source token account"));
                    }
                    let (recipient, recipient_mint) = state
                        .token_accounts
                        .get(&destination)
                        .cloned()
                        .ok_or_else(|| rejected("Unknown destination token account"))?;
                    if recipient_mint != mint {
                        return Err(rejected("Token accounts hold different mints"));
                    }

                    let held = tokens
                        .entry((source_owner.clone(), mint.clone()))
                        .or_insert_with(|| self.raw_tokens_of(state, &source_owner, &mint));
                    debit(held, amount)?;
                    let received = tokens
                        .entry((recipient.clone(), mint.clone()))
                        .or_insert_with(|| self.raw_tokens_of(state, &recipient, &mint));
                    *received = received.saturating_add(amount);

                    token_rows.push((source, source_owner.clone(), mint.clone()));
                    token_rows.push((destination, recipient.clone(), mint));
                    parties.push(source_owner);
                    parties.push(recipient);
                }
            }
        }

        // Balances as every party will see them in the transaction detail
        let account_keys: Vec<String> = message.account_keys.iter().map(encode_pubkey).collect();
        let pre_balances: Vec<u64> = account_keys
            .iter()
            .map(|key| if native.contains_key(key) { self.lamports_of(state, key) } else { 0 })
            .collect();
        let post_balances: Vec<u64> = account_keys
            .iter()
            .zip(&pre_balances)
            .map(|(key, pre)| native.get(key).copied().unwrap_or(*pre))
            .collect();
        let token_balance_rows = |post: bool| -> Vec<TokenBalance> {
            token_rows
                .iter()
                .filter_map(|(address, owner, mint)| {
                    let account_index = account_keys.iter().position(|k| k == address)?;
                    let key = (owner.clone(), mint.clone());
                    let raw = match tokens.get(&key) {
                        Some(after) if post => *after,
                        _ => self.raw_tokens_of(state, owner, mint),
                    };
                    Some(TokenBalance {
                        account_index,
                        ..token_balance(mint, owner, raw)
                    })
                })
                .collect()
        };
        let detail = TransactionDetail {
            pre_balances,
            post_balances,
            pre_token_balances: token_balance_rows(false),
            post_token_balances: token_balance_rows(true),
            account_keys,
            ..Default::default()
        };

        for (address, lamports) in native {
            state.balances.insert(address, lamports);
        }
        for ((owner, mint), raw) in tokens {
            state.token_balances.insert(
                (owner, mint),
                Decimal::from_i128_with_scale(i128::from(raw), STABLE_DECIMALS),
            );
        }

        let slot = state.take_slot();
        parties.sort();
        parties.dedup();
        for party in parties {
            self.ensure_seeded(state, &party);
            state.record(&party, &signature, slot, detail.clone());
        }
        Ok(signature)
    }
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn list_signatures(
        &self,
        address: &str,
        query: &SignatureQuery,
    ) -> Result<Vec<SignatureInfo>> {
        self.simulate_latency().await;
        let mut state = self.state()?;
        Self::check_online(&state)?;
        self.ensure_seeded(&mut state, address);

        let Some(activity) = state.activity.get(address) else {
            return Ok(Vec::new());
        };

        let mut started = query.before.is_none();
        let mut listed = Vec::new();
        for tx in activity {
            if !started {
                started = query.before.as_deref() == Some(tx.signature.as_str());
                continue;
            }
            if query.until.as_deref() == Some(tx.signature.as_str()) || listed.len() >= query.limit {
                break;
            }
            listed.push(SignatureInfo {
                signature: tx.signature.clone(),
                slot: tx.slot,
                block_time: tx.block_time,
                err: tx.detail.error.clone(),
            });
        }
        Ok(listed)
    }

    async fn fetch_transaction_detail(&self, signature: &str) -> Result<Option<TransactionDetail>> {
        self.simulate_latency().await;
        let state = self.state()?;
        Self::check_online(&state)?;
        if state.failing_details.contains(signature) {
            return Err(Error::network("Simulated detail fetch failure"));
        }

        Ok(state
            .activity
            .values()
            .flatten()
            .find(|tx| tx.signature == signature)
            .map(|tx| tx.detail.clone()))
    }

    async fn get_balance(&self, address: &str) -> Result<Decimal> {
        self.simulate_latency().await;
        let state = self.state()?;
        Self::check_online(&state)?;
        Ok(lamports_to_coin(self.lamports_of(&state, address)))
    }

    async fn get_token_balance(&self, owner: &str, mint: &str) -> Result<Decimal> {
        self.simulate_latency().await;
        let state = self.state()?;
        Self::check_online(&state)?;
        Ok(self.tokens_of(&state, owner, mint))
    }

    async fn find_token_account(&self, owner: &str, mint: &str) -> Result<Option<TokenAccount>> {
        self.simulate_latency().await;
        let mut state = self.state()?;
        Self::check_online(&state)?;
        if !self.holds_token_account(&state, owner, mint) {
            return Ok(None);
        }

        let address = token_account(owner, mint);
        state
            .token_accounts
            .insert(address.clone(), (owner.to_string(), mint.to_string()));
        Ok(Some(TokenAccount {
            address,
            amount: self.raw_tokens_of(&state, owner, mint),
            decimals: STABLE_DECIMALS,
        }))
    }

    async fn latest_blockhash(&self) -> Result<String> {
        self.simulate_latency().await;
        let mut state = self.state()?;
        Self::check_online(&state)?;
        let digest = Sha256::digest(format!("blockhash:{}", state.next_slot).as_bytes());
        let mut blockhash: Pubkey = [0; 32];
        blockhash.copy_from_slice(&digest);
        state.blockhashes.insert(blockhash);
        Ok(encode_pubkey(&blockhash))
    }

    async fn submit_transaction(&self, transaction: &[u8]) -> Result<String> {
        self.simulate_latency().await;
        let tx = Transaction::parse(transaction).map_err(|e| Error::TransactionRejected(e.to_string()))?;
        let mut state = self.state()?;
        Self::check_online(&state)?;
        self.apply(&mut state, &tx)
    }
}
