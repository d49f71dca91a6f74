//! Key derivation - recovery phrase to signing keypairs
//!
//! BIP-39 phrase → 64-byte seed → SLIP-0010 ed25519 keys along hardened-only
//! paths `m/44'/501'/<account>'/0'`. Everything here is pure: no disk, no
//! network, no clock.

use std::fmt;

use bip39::{Language, Mnemonic};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, DerivationPath};

type HmacSha512 = Hmac<Sha512>;

/// Key for the SLIP-0010 master node on the ed25519 curve
const ED25519_CURVE_SEED: &[u8] = b"ed25519 seed";

/// 128 bits of entropy gives a 12-word phrase
const PHRASE_ENTROPY_BYTES: usize = 16;

pub const SEED_LEN: usize = 64;

/// Exported secret keys are `secret || public`
const EXPORTED_KEY_LEN: usize = 64;

/// An ed25519 signing keypair
///
/// The secret half is wiped on drop.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(secret),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Base58 address of the public key
    pub fn public_key(&self) -> String {
        bs58::encode(self.verifying_key().as_bytes()).into_string()
    }

    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing.to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Keypair {
    fn eq(&self, other: &Self) -> bool {
        self.verifying_key() == other.verifying_key()
    }
}

fn normalize_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_phrase(phrase: &str) -> Result<Mnemonic> {
    let normalized = Zeroizing::new(normalize_phrase(phrase));
    Mnemonic::parse_in_normalized(Language::English, &normalized).map_err(|_| Error::InvalidMnemonic)
}

/// Word-list and checksum check; never fails, only answers
pub fn validate_recovery_phrase(phrase: &str) -> bool {
    parse_phrase(phrase).is_ok()
}

/// Fresh 12-word English phrase from OS randomness
pub fn generate_recovery_phrase() -> Result<Zeroizing<String>> {
    let mut entropy = Zeroizing::new([0u8; PHRASE_ENTROPY_BYTES]);
    OsRng.fill_bytes(entropy.as_mut());
    let mnemonic = Mnemonic::from_entropy(entropy.as_ref()).map_err(|_| Error::InvalidMnemonic)?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// BIP-39 seed; the same phrase and passphrase always give the same seed
pub fn derive_seed(phrase: &str, passphrase: &str) -> Result<Zeroizing<[u8; SEED_LEN]>> {
    let mnemonic = parse_phrase(phrase)?;
    Ok(Zeroizing::new(mnemonic.to_seed(passphrase)))
}

/// One SLIP-0010 step: HMAC-SHA512 split into (key, chain code)
fn hmac_split(key: &[u8], parts: &[&[u8]]) -> Result<Zeroizing<[u8; 64]>> {
    let mut mac = HmacSha512::new_from_slice(key)
        .map_err(|_| Error::InvalidDerivationPath("invalid HMAC key length".to_string()))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// SLIP-0010 ed25519 derivation along a hardened-only path
pub fn derive_keypair_at(seed: &[u8], path: &DerivationPath) -> Result<Keypair> {
    let mut node = hmac_split(ED25519_CURVE_SEED, &[seed])?;

    for index in path.hardened_indices() {
        let (key, chain_code) = node.split_at(32);
        node = hmac_split(chain_code, &[&[0u8][..], key, &index.to_be_bytes()[..]])?;
    }

    let mut secret = Zeroizing::new([0u8; 32]);
    secret.copy_from_slice(&node[..32]);
    Ok(Keypair::from_secret(&secret))
}

/// Keypair for the account at `index`
pub fn derive_account_keypair(phrase: &str, index: u32) -> Result<Keypair> {
    let seed = derive_seed(phrase, "")?;
    derive_keypair_at(seed.as_ref(), &DerivationPath::for_account(index))
}

/// Accounts `0..count` in increasing index order
pub fn derive_accounts(phrase: &str, count: u32) -> Result<Vec<Account>> {
    derive_accounts_from(phrase, 0, count)
}

/// Accounts `start..start + count`
pub fn derive_accounts_from(phrase: &str, start: u32, count: u32) -> Result<Vec<Account>> {
    let seed = derive_seed(phrase, "")?;
    (start..start.saturating_add(count))
        .map(|index| {
            let path = DerivationPath::for_account(index);
            let keypair = derive_keypair_at(seed.as_ref(), &path)?;
            Ok(Account::new(keypair.public_key(), &path, index))
        })
        .collect()
}

/// Run seed stretching or key derivation on the blocking pool
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::storage(format!("Key derivation task failed: {}", e)))?
}

/// Base58 of the 64-byte `secret || public` layout wallets exchange
pub fn export_private_key(keypair: &Keypair) -> Zeroizing<String> {
    let mut bytes = Zeroizing::new([0u8; EXPORTED_KEY_LEN]);
    bytes[..32].copy_from_slice(keypair.secret_bytes().as_ref());
    bytes[32..].copy_from_slice(keypair.verifying_key().as_bytes());
    Zeroizing::new(bs58::encode(bytes.as_ref()).into_string())
}

/// Inverse of [`export_private_key`]; the public half must match the secret
pub fn import_private_key(encoded: &str) -> Result<Keypair> {
    let bytes = Zeroizing::new(
        bs58::decode(encoded.trim())
            .into_vec()
            .map_err(|_| Error::validation("Private key is not valid base58"))?,
    );
    if bytes.len() != EXPORTED_KEY_LEN {
        return Err(Error::validation(format!(
            "Private key must be {} bytes, got {}",
            EXPORTED_KEY_LEN,
            bytes.len()
        )));
    }

    let mut secret = Zeroizing::new([0u8; 32]);
    secret.copy_from_slice(&bytes[..32]);
    let keypair = Keypair::from_secret(&secret);
    if keypair.verifying_key().as_bytes() != &bytes[32..] {
        return Err(Error::validation("Private key does not match its public key"));
    }
    Ok(keypair)
}

/// Detached ed25519 signature, base58
pub fn sign_message(keypair: &Keypair, message: &[u8]) -> String {
    bs58::encode(keypair.sign(message).to_bytes()).into_string()
}

/// Check a base58 signature against a base58 address
pub fn verify_message(public_key: &str, message: &[u8], signature: &str) -> bool {
    let Ok(key_bytes) = bs58::decode(public_key).into_vec() else {
        return false;
    };
    let Ok(sig_bytes) = bs58::decode(signature).into_vec() else {
        return false;
    };
    let (Ok(key_array), Ok(sig_array)) = (
        <[u8; 32]>::try_from(key_bytes.as_slice()),
        <[u8; 64]>::try_from(sig_bytes.as_slice()),
    ) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key_array) else {
        return false;
    };
    key.verify(message, &Signature::from_bytes(&sig_array)).is_ok()
}
