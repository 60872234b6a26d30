//! ChaCha20-Poly1305 blobs.
//!
//! A blob travels as text: `base64(nonce ‖ ciphertext ‖ tag)`. Reports and
//! record details are both stored this way, so the decoder tolerates the
//! trailing newline an editor or mail client tends to add.

use crate::error::{CryptoError, CryptoResult};
use crate::key::DerivedKey;
use base64::{Engine, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;

pub const NONCE_SIZE: usize = 12;

pub const TAG_SIZE: usize = 16;

/// A decoded blob. `sealed` is the ciphertext with the tag appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedBlob {
    pub nonce: [u8; NONCE_SIZE],
    pub sealed: Vec<u8>,
}

impl SealedBlob {
    /// Length of the decoded byte form.
    pub fn encoded_len(&self) -> usize {
        NONCE_SIZE + self.sealed.len()
    }

    pub fn encode(&self) -> String {
        let bytes: Vec<u8> = self.nonce.iter().chain(&self.sealed).copied().collect();
        STANDARD.encode(bytes)
    }

    pub fn decode(text: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| CryptoError::Decryption(format!("blob is not base64: {e}")))?;
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption(format!(
                "blob of {} bytes cannot hold nonce and tag",
                bytes.len()
            )));
        }
        let (nonce, sealed) = bytes.split_at(NONCE_SIZE);
        let mut fixed = [0u8; NONCE_SIZE];
        fixed.copy_from_slice(nonce);
        Ok(Self {
            nonce: fixed,
            sealed: sealed.to_vec(),
        })
    }
}

fn aead(key: &DerivedKey) -> ChaCha20Poly1305 {
    ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

/// Seals `plaintext` under a fresh random nonce.
pub fn seal(key: &DerivedKey, plaintext: &[u8]) -> CryptoResult<SealedBlob> {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    let sealed = aead(key)
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    Ok(SealedBlob { nonce, sealed })
}

/// Opens a blob. A wrong key and a modified byte fail the same way.
pub fn open(key: &DerivedKey, blob: &SealedBlob) -> CryptoResult<Vec<u8>> {
    aead(key)
        .decrypt(Nonce::from_slice(&blob.nonce), blob.sealed.as_slice())
        .map_err(|_| CryptoError::Decryption("authentication failed".to_string()))
}

/// [`seal`] a string into its text form.
pub fn encrypt_string(key: &DerivedKey, plaintext: &str) -> CryptoResult<String> {
    Ok(seal(key, plaintext.as_bytes())?.encode())
}

/// [`open`] a text blob back into a string.
pub fn decrypt_string(key: &DerivedKey, text: &str) -> CryptoResult<String> {
    let plaintext = open(key, &SealedBlob::decode(text)?)?;
    String::from_utf8(plaintext)
        .map_err(|e| CryptoError::Decryption(format!("plaintext is not UTF-8: {e}")))
}
