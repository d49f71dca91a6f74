//! Encrypted secret domain models

use serde::{Deserialize, Serialize};

/// PBKDF2 iteration count for the secret-sealing key
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;
pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

pub const KDF_ALGORITHM: &str = "pbkdf2-sha256";
pub const CIPHER_ALGORITHM: &str = "aes-256-gcm";

/// A password-sealed secret as stored under `encrypted_mnemonic`
///
/// `salt` and `iv` are not secret; both are freshly random for every seal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    /// Base64-encoded random salt
    pub salt: String,
    /// Base64-encoded random nonce
    pub iv: String,
    /// Base64-encoded ciphertext including the authentication tag
    pub ciphertext: String,
    pub kdf: KdfParams,
    pub version: u32,
}

/// Key-derivation parameters recorded next to the ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub algorithm: String,
    pub iterations: u32,
    pub cipher: String,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            algorithm: KDF_ALGORITHM.to_string(),
            iterations: DEFAULT_KDF_ITERATIONS,
            cipher: CIPHER_ALGORITHM.to_string(),
        }
    }
}

impl EncryptedSecret {
    pub fn new(salt: String, iv: String, ciphertext: String, kdf: KdfParams) -> Self {
        Self {
            salt,
            iv,
            ciphertext,
            kdf,
            version: 1,
        }
    }
}

/// Lock state for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultStatus {
    pub initialized: bool,
    pub locked: bool,
    pub kdf: Option<KdfParams>,
}
