//! Encrypt-with-checksum for small JSON payloads bound to one seed.

use crate::checksum::ChecksumEngine;
use crate::encryptor::{AeadCipher, SymmetricCipher};
use crate::error::{CryptoError, CryptoResult};
use crate::key::KdfParams;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct Sealed {
    checksum: String,
    data: serde_json::Value,
}

/// Seals a value as `encrypt({data, checksum})`, where the checksum is
/// bound to the same seed that keys the cipher. Opening checks both.
#[derive(Debug)]
pub struct IntegrityEnvelope {
    cipher: AeadCipher,
    checksums: ChecksumEngine,
}

impl IntegrityEnvelope {
    pub fn new(seed: &str, params: &KdfParams) -> CryptoResult<Self> {
        Ok(Self {
            cipher: AeadCipher::from_seed(seed, params)?,
            checksums: ChecksumEngine::new(seed),
        })
    }

    pub fn seal<T: Serialize>(&self, value: &T) -> CryptoResult<String> {
        let data = serde_json::to_value(value)?;
        let checksum = self.checksums.compute(&data);
        let body = serde_json::to_string(&Sealed { checksum, data })?;
        self.cipher.encrypt(&body)
    }

    pub fn open<T: DeserializeOwned>(&self, blob: &str) -> CryptoResult<T> {
        let body = self.cipher.decrypt(blob)?;
        let sealed: Sealed = serde_json::from_str(&body)?;
        if !self.checksums.verify(&sealed.data, &sealed.checksum) {
            return Err(CryptoError::Integrity(
                "payload checksum does not match".into(),
            ));
        }
        Ok(serde_json::from_value(sealed.data)?)
    }
}
