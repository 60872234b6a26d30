//! Machine identity.
//!
//! A stable hex digest of host characteristics. It seeds the key that
//! protects local record details and binds record checksums to the host.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use std::fmt;

/// Host characteristics that feed the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInfo {
    pub hostname: String,
    pub arch: String,
    pub os: String,
    /// Platform machine id, when one can be read.
    pub machine_id: Option<String>,
}

impl MachineInfo {
    /// Collects information about the current host.
    #[must_use]
    pub fn collect() -> Self {
        Self {
            hostname: get_hostname(),
            arch: env::consts::ARCH.to_string(),
            os: env::consts::OS.to_string(),
            machine_id: get_machine_id(),
        }
    }
}

/// SHA-256 hex of `hostname|arch|os|machine-id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineIdentity(String);

impl MachineIdentity {
    /// Identity of the current host.
    #[must_use]
    pub fn current() -> Self {
        Self::from_info(&MachineInfo::collect())
    }

    #[must_use]
    pub fn from_info(info: &MachineInfo) -> Self {
        let combined = [
            info.hostname.as_str(),
            info.arch.as_str(),
            info.os.as_str(),
            info.machine_id.as_deref().unwrap_or(""),
        ]
        .join("|");
        Self(hex::encode(Sha256::digest(combined.as_bytes())))
    }

    /// Wraps an identity received from elsewhere (reports, pushed batches).
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MachineIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Locations of the systemd / D-Bus machine id.
const MACHINE_ID_FILES: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

fn get_machine_id() -> Option<String> {
    if cfg!(target_os = "linux") {
        MACHINE_ID_FILES
            .iter()
            .filter_map(|path| std::fs::read_to_string(path).ok())
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty())
    } else if cfg!(target_os = "macos") {
        command_output("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"])
            .and_then(|out| quoted_value_after(&out, "IOPlatformUUID"))
    } else if cfg!(target_os = "windows") {
        command_output(
            "reg",
            &["query", r"HKLM\SOFTWARE\Microsoft\Cryptography", "/v", "MachineGuid"],
        )
        .and_then(|out| last_word_after(&out, "MachineGuid"))
    } else {
        None
    }
}

fn command_output(program: &str, args: &[&str]) -> Option<String> {
    let output = std::process::Command::new(program).args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8(output.stdout).ok())
        .flatten()
}

/// `"IOPlatformUUID" = "ABCD-..."` yields `ABCD-...`.
pub(crate) fn quoted_value_after(output: &str, field: &str) -> Option<String> {
    let line = output.lines().find(|l| l.contains(field))?;
    let value = line.split('"').nth(3)?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// `    MachineGuid    REG_SZ    1234-...` yields `1234-...`.
pub(crate) fn last_word_after(output: &str, field: &str) -> Option<String> {
    let line = output.lines().find(|l| l.contains(field))?;
    line.split_whitespace().last().map(str::to_string)
}
