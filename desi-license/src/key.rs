//! License key generation and parsing.
//!
//! Keys use the format `DESI-XXXXXXXX-YYYYYYYY-CCCC`: two groups of eight
//! upper-case hex digits and a four-digit checksum, the first four
//! upper-case hex characters of `MD5(group1 ‖ group2)`, which keeps keys
//! issued before this crate existed valid.

use crate::error::{LicenseError, LicenseResult};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use md5::{Digest, Md5};
use std::fmt;
use std::str::FromStr;

/// Literal first segment of every key.
pub const KEY_PREFIX: &str = "DESI";

const GROUP_LEN: usize = 8;
const CHECKSUM_LEN: usize = 4;

/// A well-formed license key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LicenseKey {
    group1: String,
    group2: String,
    checksum: String,
}

impl LicenseKey {
    /// Generates a fresh key from two random groups.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let group1 = format!("{:08X}", rng.next_u32());
        let group2 = format!("{:08X}", rng.next_u32());
        let checksum = group_checksum(&group1, &group2);
        Self {
            group1,
            group2,
            checksum,
        }
    }

    /// Parses a key string. Surrounding whitespace is ignored; prefix and
    /// hex case must match exactly.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidKeyFormat`] naming the first problem found.
    pub fn parse(key: &str) -> LicenseResult<Self> {
        let key = key.trim();
        let parts: Vec<&str> = key.split('-').collect();
        if parts.len() != 4 {
            return Err(LicenseError::InvalidKeyFormat(format!(
                "expected 4 dash-separated segments, found {}",
                parts.len()
            )));
        }
        if parts[0] != KEY_PREFIX {
            return Err(LicenseError::InvalidKeyFormat(format!(
                "prefix must be {KEY_PREFIX}"
            )));
        }
        check_segment("group 1", parts[1], GROUP_LEN)?;
        check_segment("group 2", parts[2], GROUP_LEN)?;
        check_segment("checksum", parts[3], CHECKSUM_LEN)?;

        let expected = group_checksum(parts[1], parts[2]);
        if parts[3] != expected {
            return Err(LicenseError::InvalidKeyFormat(
                "checksum does not match key groups".to_string(),
            ));
        }

        Ok(Self {
            group1: parts[1].to_string(),
            group2: parts[2].to_string(),
            checksum: expected,
        })
    }

    /// True if `key` parses.
    #[must_use]
    pub fn validate(key: &str) -> bool {
        Self::parse(key).is_ok()
    }

    pub fn group1(&self) -> &str {
        &self.group1
    }

    pub fn group2(&self) -> &str {
        &self.group2
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

fn check_segment(name: &str, segment: &str, len: usize) -> LicenseResult<()> {
    if segment.len() != len {
        return Err(LicenseError::InvalidKeyFormat(format!(
            "{name} must be {len} characters"
        )));
    }
    if !segment
        .chars()
        .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
    {
        return Err(LicenseError::InvalidKeyFormat(format!(
            "{name} must be upper-case hex"
        )));
    }
    Ok(())
}

fn group_checksum(group1: &str, group2: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(group1.as_bytes());
    hasher.update(group2.as_bytes());
    hex::encode_upper(hasher.finalize())[..CHECKSUM_LEN].to_string()
}

impl fmt::Display for LicenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{KEY_PREFIX}-{}-{}-{}",
            self.group1, self.group2, self.checksum
        )
    }
}

impl FromStr for LicenseKey {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for LicenseKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LicenseKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
