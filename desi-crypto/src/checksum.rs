//! Machine-bound record checksums and the whole-ledger fingerprint.

use crate::key::SHARED_SECRET;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Fingerprint input used when the ledger has no records.
const EMPTY_LEDGER: &str = "empty";

/// SHA-256 of `input` as lower-case hex.
pub fn sha256_hex(input: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(input.as_ref()))
}

/// Computes and verifies record checksums for one machine identity.
///
/// A checksum is `HMAC-SHA256(shared secret, canonical_json | machine_id)`.
/// Canonical JSON is compact with object keys sorted, which is what
/// `serde_json::Value` produces since its maps are ordered.
#[derive(Clone, Debug)]
pub struct ChecksumEngine {
    machine_id: String,
}

impl ChecksumEngine {
    pub fn new(machine_id: impl Into<String>) -> Self {
        Self {
            machine_id: machine_id.into(),
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    fn keyed(&self, payload: &[u8]) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(SHARED_SECRET).expect("HMAC accepts keys of any length");
        mac.update(payload);
        mac.update(b"|");
        mac.update(self.machine_id.as_bytes());
        mac
    }

    /// Hex checksum over `fields`.
    pub fn compute(&self, fields: &serde_json::Value) -> String {
        self.sign_bytes(fields.to_string().as_bytes())
    }

    /// Constant-time comparison against a stored hex checksum.
    pub fn verify(&self, fields: &serde_json::Value, expected: &str) -> bool {
        self.verify_bytes(fields.to_string().as_bytes(), expected)
    }

    /// Checksum of a raw payload. Pushed batches are signed this way.
    pub fn sign_bytes(&self, payload: &[u8]) -> String {
        hex::encode(self.keyed(payload).finalize().into_bytes())
    }

    pub fn verify_bytes(&self, payload: &[u8], expected: &str) -> bool {
        let Ok(expected) = hex::decode(expected.trim()) else {
            return false;
        };
        self.keyed(payload).verify_slice(&expected).is_ok()
    }

    /// SHA-256 over the `|`-joined checksums, in the order given.
    pub fn fingerprint<I, S>(checksums: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hasher = Sha256::new();
        let mut any = false;
        for checksum in checksums {
            if any {
                hasher.update(b"|");
            }
            hasher.update(checksum.as_ref().as_bytes());
            any = true;
        }
        if !any {
            return sha256_hex(EMPTY_LEDGER);
        }
        hex::encode(hasher.finalize())
    }
}
