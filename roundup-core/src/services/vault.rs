//! Secret vault - recovery phrase sealing and session lock state
//!
//! The phrase is sealed with AES-256-GCM under a key stretched from the
//! password with PBKDF2-HMAC-SHA256. A separate Argon2id hash of the password
//! lets unlock fail fast without touching the ciphertext. That hash is a
//! convenience gate only; the authenticated decryption is what actually
//! protects the phrase.

use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::{json, Value as JsonValue};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::domain::result::{Error, Result};
use crate::domain::secret::{
    CIPHER_ALGORITHM, DEFAULT_KDF_ITERATIONS, KDF_ALGORITHM, KEY_LEN, NONCE_LEN, SALT_LEN,
};
use crate::domain::{EncryptedSecret, KdfParams, VaultStatus};
use crate::ports::{KeyValueStore, KeyValueStoreExt, StoreKey};
use crate::services::keys;

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, key.as_mut());
    key
}

/// Seal `plaintext` under a fresh salt and nonce
pub fn encrypt_secret(plaintext: &str, password: &str) -> Result<EncryptedSecret> {
    let kdf = KdfParams::default();

    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(password, &salt, kdf.iterations);
    let cipher = Aes256Gcm::new_from_slice(key.as_ref())
        .map_err(|_| Error::storage("Invalid cipher key length"))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| Error::storage("Encryption failed"))?;

    Ok(EncryptedSecret::new(
        BASE64.encode(salt),
        BASE64.encode(nonce),
        BASE64.encode(ciphertext),
        kdf,
    ))
}

/// Open a sealed secret
///
/// Wrong password, tampered ciphertext and malformed fields all fail the same
/// way, with `InvalidPassword`. A blob whose KDF cost was lowered below the
/// default is refused before any key stretching.
pub fn decrypt_secret(secret: &EncryptedSecret, password: &str) -> Result<Zeroizing<String>> {
    if secret.kdf.algorithm != KDF_ALGORITHM || secret.kdf.cipher != CIPHER_ALGORITHM {
        return Err(Error::validation(format!(
            "Unsupported secret format: {} / {}",
            secret.kdf.algorithm, secret.kdf.cipher
        )));
    }

    if secret.kdf.iterations < DEFAULT_KDF_ITERATIONS {
        return Err(Error::validation(format!(
            "KDF iteration count {} is below the minimum of {}",
            secret.kdf.iterations, DEFAULT_KDF_ITERATIONS
        )));
    }

    let salt = BASE64
        .decode(&secret.salt)
        .map_err(|_| Error::InvalidPassword)?;
    let nonce = BASE64.decode(&secret.iv).map_err(|_| Error::InvalidPassword)?;
    let ciphertext = BASE64
        .decode(&secret.ciphertext)
        .map_err(|_| Error::InvalidPassword)?;
    if nonce.len() != NONCE_LEN {
        return Err(Error::InvalidPassword);
    }

    let key = derive_key(password, &salt, secret.kdf.iterations);
    let cipher = Aes256Gcm::new_from_slice(key.as_ref()).map_err(|_| Error::InvalidPassword)?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| Error::InvalidPassword)?,
    );

    let text = std::str::from_utf8(&plaintext).map_err(|_| Error::InvalidPassword)?;
    Ok(Zeroizing::new(text.to_string()))
}

/// Salted Argon2id hash in PHC string form
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::storage(format!("Failed to hash password: {}", e)))
}

/// Check a password against a PHC hash; a malformed hash never verifies
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Store-backed vault: owns `encrypted_mnemonic`, `password_hash` and `is_locked`
pub struct SecretVault {
    store: Arc<dyn KeyValueStore>,
}

impl SecretVault {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.store.get(StoreKey::EncryptedMnemonic)?.is_some())
    }

    /// Locked unless the stored flag is exactly `false`
    pub fn is_locked(&self) -> Result<bool> {
        Ok(!matches!(
            self.store.get(StoreKey::IsLocked)?,
            Some(JsonValue::Bool(false))
        ))
    }

    pub fn status(&self) -> Result<VaultStatus> {
        let secret: Option<EncryptedSecret> = self.store.get_json(StoreKey::EncryptedMnemonic)?;
        Ok(VaultStatus {
            initialized: secret.is_some(),
            locked: self.is_locked()?,
            kdf: secret.map(|s| s.kdf),
        })
    }

    /// Seal a new phrase and write it with any companion records in one
    /// atomic store write; the wallet starts unlocked
    pub async fn create_wallet(
        &self,
        phrase: &str,
        password: &str,
        companions: Vec<(StoreKey, JsonValue)>,
    ) -> Result<()> {
        if !keys::validate_recovery_phrase(phrase) {
            return Err(Error::InvalidMnemonic);
        }
        if password.is_empty() {
            return Err(Error::validation("Password cannot be empty"));
        }

        let phrase = Zeroizing::new(phrase.to_string());
        let password = Zeroizing::new(password.to_string());
        let (secret, hash) = keys::blocking(move || {
            let secret = encrypt_secret(&phrase, &password)?;
            let hash = hash_password(&password)?;
            Ok((secret, hash))
        })
        .await?;

        let mut entries = vec![
            (StoreKey::EncryptedMnemonic, serde_json::to_value(&secret)?),
            (StoreKey::PasswordHash, json!(hash)),
            (StoreKey::IsLocked, json!(false)),
        ];
        entries.extend(companions);
        self.store.set_many(entries)
    }

    async fn check_password(&self, password: &str) -> Result<()> {
        let hash: String = self
            .store
            .get_json(StoreKey::PasswordHash)?
            .ok_or(Error::WalletNotInitialized)?;
        let password = Zeroizing::new(password.to_string());
        let matches = keys::blocking(move || Ok(verify_password(&password, &hash))).await?;
        if matches {
            Ok(())
        } else {
            Err(Error::InvalidPassword)
        }
    }

    /// Verify the password and mark the session unlocked
    pub async fn unlock(&self, password: &str) -> Result<()> {
        self.check_password(password).await?;
        self.store.set(StoreKey::IsLocked, json!(false))
    }

    pub fn lock(&self) -> Result<()> {
        self.store.set(StoreKey::IsLocked, json!(true))
    }

    /// Decrypt the phrase; the password hash is checked first
    pub async fn reveal_mnemonic(&self, password: &str) -> Result<Zeroizing<String>> {
        self.check_password(password).await?;

        let secret: EncryptedSecret = self
            .store
            .get_json(StoreKey::EncryptedMnemonic)?
            .ok_or(Error::WalletNotInitialized)?;
        let password = Zeroizing::new(password.to_string());
        keys::blocking(move || decrypt_secret(&secret, &password)).await
    }

    /// Re-seal the phrase under a new password
    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        if new_password.is_empty() {
            return Err(Error::validation("Password cannot be empty"));
        }
        let phrase = self.reveal_mnemonic(old_password).await?;
        let password = Zeroizing::new(new_password.to_string());
        let (secret, hash) = keys::blocking(move || {
            let secret = encrypt_secret(&phrase, &password)?;
            let hash = hash_password(&password)?;
            Ok((secret, hash))
        })
        .await?;

        self.store.set_many(vec![
            (StoreKey::EncryptedMnemonic, serde_json::to_value(&secret)?),
            (StoreKey::PasswordHash, json!(hash)),
        ])
    }
}
