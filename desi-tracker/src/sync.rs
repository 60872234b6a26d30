//! License synchronisation with the license server.
//!
//! The server is the source of truth for expiry. A successful check
//! rewrites the locally installed [`LicenseInfo`]; any failure leaves it
//! untouched so the tracker keeps working offline.

use crate::config::LicenseSyncConfig;
use crate::error::TrackerResult;
use crate::task::{sleep_or_stop, BackgroundTask};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use desi_ledger::LedgerStore;
use desi_license::LicenseInfo;
use desi_types::format_timestamp;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Serialize)]
struct CheckRequest<'a> {
    license_key: &'a str,
    client_version: &'a str,
    last_sync: Option<String>,
}

/// What the license server reports for a key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerLicense {
    /// RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS` taken as UTC, or a bare date.
    pub expires_at: Option<String>,
    pub status: Option<String>,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub billing_mode: Option<String>,
}

impl ServerLicense {
    /// The expiry as a UTC instant. Empty or unparseable text is `None`.
    #[must_use]
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        parse_expiry(self.expires_at.as_deref()?)
    }
}

fn parse_expiry(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Result of one license check against the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The local license was rewritten from the server's answer.
    Updated {
        info: LicenseInfo,
        server: ServerLicense,
    },
    /// The server does not know this key.
    NotFound,
    /// The server has disabled this key.
    Disabled,
    /// Any other non-success status.
    Rejected(u16),
}

/// Checks one license key against the server and stores the answer.
pub struct LicenseSync {
    url: String,
    client: reqwest::Client,
    store: Arc<LedgerStore>,
}

impl LicenseSync {
    pub fn new(
        config: &LicenseSyncConfig,
        endpoint: &str,
        store: Arc<LedgerStore>,
    ) -> TrackerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            url: format!("{}/check", endpoint.trim_end_matches('/')),
            client,
            store,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Asks the server about `license_key` and, on success, rewrites the
    /// local license record. Transport failures surface as errors.
    pub async fn sync_once(&self, license_key: &str) -> TrackerResult<SyncOutcome> {
        let store = Arc::clone(&self.store);
        let installed = tokio::task::spawn_blocking(move || store.load_license_info())
            .await
            .map_err(std::io::Error::other)??;
        let last_sync = installed
            .as_ref()
            .filter(|i| i.license_key == license_key)
            .and_then(|i| i.last_validated.as_ref())
            .map(format_timestamp);

        let request = CheckRequest {
            license_key,
            client_version: env!("CARGO_PKG_VERSION"),
            last_sync,
        };
        let response = self.client.post(&self.url).json(&request).send().await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                warn!("license server does not know this key");
                return Ok(SyncOutcome::NotFound);
            }
            StatusCode::FORBIDDEN => {
                warn!("license server reports this key as disabled");
                return Ok(SyncOutcome::Disabled);
            }
            status => {
                warn!(%status, "license server rejected the check");
                return Ok(SyncOutcome::Rejected(status.as_u16()));
            }
        }
        let server: ServerLicense = response.json().await?;

        let now = Utc::now();
        let info = match installed.filter(|i| i.license_key == license_key) {
            Some(mut info) => {
                if let Some(expiry) = server.expiry() {
                    info.expires_at = Some(expiry);
                }
                info.last_validated = Some(now);
                info
            }
            None => LicenseInfo {
                license_key: license_key.to_string(),
                activated_at: now,
                expires_at: server.expiry(),
                last_validated: Some(now),
            },
        };
        let store = Arc::clone(&self.store);
        let saved = info.clone();
        tokio::task::spawn_blocking(move || store.save_license_info(&saved))
            .await
            .map_err(std::io::Error::other)??;

        info!(
            expires_at = ?info.expires_at,
            status = server.status.as_deref().unwrap_or("active"),
            "license synchronised"
        );
        Ok(SyncOutcome::Updated { info, server })
    }
}

/// Handle to the periodic license check.
pub struct BackgroundLicenseSync {
    task: BackgroundTask,
}

impl BackgroundLicenseSync {
    /// Spawns the periodic check. The key is re-read every cycle so a newly
    /// installed license is picked up.
    pub fn start(
        config: &LicenseSyncConfig,
        sync: Arc<LicenseSync>,
        license_key: Arc<RwLock<String>>,
        runtime: &tokio::runtime::Handle,
    ) -> Self {
        let config = config.clone();
        let task = BackgroundTask::spawn("license-sync", runtime, move |stop_rx| {
            run(config, sync, license_key, stop_rx)
        });
        Self { task }
    }

    pub fn stop(&self) {
        self.task.stop();
    }

    pub async fn stop_and_wait(&self) {
        self.task.stop_and_wait().await;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }
}

async fn run(
    config: LicenseSyncConfig,
    sync: Arc<LicenseSync>,
    license_key: Arc<RwLock<String>>,
    mut stop_rx: watch::Receiver<bool>,
) {
    info!(
        url = sync.url(),
        interval_secs = config.interval_secs,
        "background license sync started"
    );
    if !sleep_or_stop(config.startup_delay(), &mut stop_rx).await {
        return;
    }
    loop {
        let key = license_key.read().map(|k| k.clone()).ok();
        match key {
            Some(key) => {
                if let Err(e) = sync.sync_once(&key).await {
                    warn!(error = %e, "license sync failed; working offline");
                }
            }
            None => warn!("license key lock poisoned; skipping sync"),
        }
        if !sleep_or_stop(config.interval(), &mut stop_rx).await {
            break;
        }
    }
    info!("background license sync stopped");
}
