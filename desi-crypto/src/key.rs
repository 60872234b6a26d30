//! Key derivation from human-distributable seeds.
//!
//! The seed (a machine identity or a license key) is the PBKDF2 salt and
//! the embedded [`SHARED_SECRET`] is the password. Identical seeds always
//! give identical keys, which is what lets the administrator rebuild a
//! client's key from nothing but its license key.

use crate::error::{CryptoError, CryptoResult};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of encryption keys in bytes (256 bits for ChaCha20).
pub const KEY_SIZE: usize = 32;

/// Seeds shorter than this are repeated until they reach it.
pub const MIN_SALT_LEN: usize = 16;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Secret compiled into every client and the admin tooling.
pub const SHARED_SECRET: &[u8] = b"DESI_METABOLOMICS_2025_SECRET_KEY";

/// A derived encryption key with automatic zeroization on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    /// Creates a key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Key derivation parameters.
///
/// Both ends of an exchange must agree on these; reports exported with
/// one iteration count cannot be opened with another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KdfParams {
    /// PBKDF2 iteration count.
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl KdfParams {
    /// Parameters with a custom iteration count.
    #[must_use]
    pub const fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }
}

/// Returns the salt bytes for a seed: the full seed, cycled up to
/// [`MIN_SALT_LEN`] when it is shorter.
pub fn salt_for_seed(seed: &str) -> CryptoResult<Vec<u8>> {
    let bytes = seed.as_bytes();
    if bytes.is_empty() {
        return Err(CryptoError::KeyDerivation("seed must not be empty".into()));
    }
    if bytes.len() >= MIN_SALT_LEN {
        return Ok(bytes.to_vec());
    }
    Ok(bytes.iter().copied().cycle().take(MIN_SALT_LEN).collect())
}

/// Derives the symmetric key for `seed`.
pub fn derive_key(seed: &str, params: &KdfParams) -> CryptoResult<DerivedKey> {
    if params.iterations == 0 {
        return Err(CryptoError::KeyDerivation(
            "iteration count must be positive".into(),
        ));
    }
    let salt = salt_for_seed(seed)?;
    let mut key_bytes = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(SHARED_SECRET, &salt, params.iterations, &mut key_bytes);
    Ok(DerivedKey::from_bytes(key_bytes))
}
