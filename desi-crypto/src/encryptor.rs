//! Mode-aware text cipher used by the ledger and the report codec.
//!
//! Callers hold an `Arc<dyn SymmetricCipher>` and never see raw keys.
//! [`AeadCipher`] is the normal path. [`PlainEncoding`] is the degraded
//! mode: base64 only, marked with [`DEGRADED_PREFIX`], and loud about it.

use crate::cipher::{decrypt_string, encrypt_string};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{DerivedKey, KdfParams, derive_key};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Marker prepended to every degraded-mode blob.
pub const DEGRADED_PREFIX: &str = "plain:";

/// Which cipher a component should run with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherMode {
    #[default]
    Authenticated,
    /// Base64 with no confidentiality or integrity. Opt-in only.
    Degraded,
}

impl CipherMode {
    /// Builds the cipher for this mode from a seed.
    pub fn build(
        self,
        seed: &str,
        params: &KdfParams,
    ) -> CryptoResult<Box<dyn SymmetricCipher>> {
        match self {
            Self::Authenticated => Ok(Box::new(AeadCipher::from_seed(seed, params)?)),
            Self::Degraded => Ok(Box::new(PlainEncoding::new())),
        }
    }
}

/// Encrypts and decrypts text blobs.
pub trait SymmetricCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> CryptoResult<String>;

    fn decrypt(&self, ciphertext: &str) -> CryptoResult<String>;

    /// False when blobs produced by this cipher carry no protection.
    fn is_authenticated(&self) -> bool;

    fn mode(&self) -> CipherMode {
        if self.is_authenticated() {
            CipherMode::Authenticated
        } else {
            CipherMode::Degraded
        }
    }
}

/// Returns true if `blob` was produced by the degraded cipher.
pub fn is_degraded_blob(blob: &str) -> bool {
    blob.trim_start().starts_with(DEGRADED_PREFIX)
}

/// ChaCha20-Poly1305 over a seed-derived key.
#[derive(Debug)]
pub struct AeadCipher {
    key: DerivedKey,
}

impl AeadCipher {
    pub fn new(key: DerivedKey) -> Self {
        Self { key }
    }

    /// Derives the key from `seed` and wraps it.
    pub fn from_seed(seed: &str, params: &KdfParams) -> CryptoResult<Self> {
        Ok(Self::new(derive_key(seed, params)?))
    }

    pub fn key(&self) -> &DerivedKey {
        &self.key
    }
}

impl SymmetricCipher for AeadCipher {
    fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        encrypt_string(&self.key, plaintext)
    }

    fn decrypt(&self, ciphertext: &str) -> CryptoResult<String> {
        if is_degraded_blob(ciphertext) {
            return Err(CryptoError::Decryption(
                "blob was written in degraded mode and carries no authentication".into(),
            ));
        }
        decrypt_string(&self.key, ciphertext)
    }

    fn is_authenticated(&self) -> bool {
        true
    }
}

/// Degraded mode: `plain:` + base64. Every use logs a warning.
#[derive(Debug)]
pub struct PlainEncoding {
    _private: (),
}

impl PlainEncoding {
    pub fn new() -> Self {
        warn!("cipher running in degraded mode; payloads are NOT encrypted");
        Self { _private: () }
    }
}

impl Default for PlainEncoding {
    fn default() -> Self {
        Self::new()
    }
}

impl SymmetricCipher for PlainEncoding {
    fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        warn!("writing unencrypted payload (degraded cipher)");
        Ok(format!("{DEGRADED_PREFIX}{}", STANDARD.encode(plaintext)))
    }

    fn decrypt(&self, ciphertext: &str) -> CryptoResult<String> {
        let encoded = ciphertext
            .trim()
            .strip_prefix(DEGRADED_PREFIX)
            .ok_or_else(|| CryptoError::Decryption("missing degraded-mode prefix".into()))?;
        warn!("reading unencrypted payload (degraded cipher)");
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Decryption(format!("invalid base64: {e}")))?;
        String::from_utf8(bytes)
            .map_err(|e| CryptoError::Decryption(format!("invalid UTF-8: {e}")))
    }

    fn is_authenticated(&self) -> bool {
        false
    }
}
