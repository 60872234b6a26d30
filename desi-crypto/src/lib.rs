//! Cryptographic building blocks for the DESI usage-integrity engine.
//!
//! - [`derive_key`]: PBKDF2-HMAC-SHA256 over a human-distributable seed
//!   (machine identity or license key) and the embedded shared secret.
//! - [`seal`] / [`open`]: ChaCha20-Poly1305 blobs in base64 text form.
//! - [`SymmetricCipher`]: the mode-aware wrapper used by the rest of the
//!   workspace, including the explicit, observable degraded mode.
//! - [`ChecksumEngine`]: machine-bound HMAC digests for records and the
//!   whole-ledger fingerprint.
//! - [`IntegrityEnvelope`]: encrypt-with-checksum for small JSON payloads.
//!
//! The shared secret is a speed bump against casual edits of local files,
//! not a boundary against someone holding the binary.

mod checksum;
mod cipher;
mod encryptor;
mod envelope;
mod error;
mod key;

pub use checksum::{sha256_hex, ChecksumEngine};
pub use cipher::{
    decrypt_string, encrypt_string, open, seal, SealedBlob, NONCE_SIZE, TAG_SIZE,
};
pub use encryptor::{
    AeadCipher, CipherMode, DEGRADED_PREFIX, PlainEncoding, SymmetricCipher, is_degraded_blob,
};
pub use envelope::IntegrityEnvelope;
pub use error::{CryptoError, CryptoResult};
pub use key::{
    derive_key, salt_for_seed, DerivedKey, KdfParams, DEFAULT_ITERATIONS,
    KEY_SIZE, MIN_SALT_LEN, SHARED_SECRET,
};
