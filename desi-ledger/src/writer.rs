//! Record construction and the batched writer thread.

use crate::error::{LedgerError, LedgerResult};
use crate::store::LedgerStore;
use chrono::{DateTime, Utc};
use desi_crypto::{sha256_hex, ChecksumEngine, SymmetricCipher};
use desi_types::{ActionType, RecordId, UsageRecord};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Receives every successfully flushed batch, in flush order.
pub type RecordHandoff = tokio::sync::mpsc::UnboundedSender<Vec<UsageRecord>>;

/// Shortest flush interval the writer honours. Anything lower would turn
/// the timed wait into a busy loop.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Flush triggers for the writer thread.
#[derive(Debug, Clone, Copy)]
pub struct WriterConfig {
    /// Flush once this many records are buffered.
    pub batch_size: usize,
    /// Flush buffered records at least this often.
    pub flush_interval: Duration,
}

impl WriterConfig {
    /// Raises a zero batch size to one and a zero interval to
    /// [`MIN_FLUSH_INTERVAL`].
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            batch_size: self.batch_size.max(1),
            flush_interval: self.flush_interval.max(MIN_FLUSH_INTERVAL),
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            flush_interval: Duration::from_secs(60),
        }
    }
}

/// Something the host application did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub action_type: ActionType,
    /// Raw subject name; only its hash is stored in the clear.
    pub subject_name: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl UsageEvent {
    pub fn new(action_type: impl Into<ActionType>, subject_name: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            subject_name: subject_name.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Serialize)]
struct RecordDetails<'a> {
    subject_name: &'a str,
    machine_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
}

enum Command {
    Append(UsageRecord),
    Flush(mpsc::Sender<LedgerResult<usize>>),
    Shutdown(mpsc::Sender<LedgerResult<usize>>),
}

/// Append side of the ledger.
///
/// `append` does all hashing, encryption and checksumming on the calling
/// thread and queues the finished record. A dedicated thread owns the
/// buffer and writes it out in one transaction per flush.
pub struct UsageLedger {
    store: Arc<LedgerStore>,
    checksums: ChecksumEngine,
    cipher: Arc<dyn SymmetricCipher>,
    tx: mpsc::Sender<Command>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl UsageLedger {
    /// Starts the writer thread.
    pub fn start(
        store: Arc<LedgerStore>,
        config: WriterConfig,
        checksums: ChecksumEngine,
        cipher: Arc<dyn SymmetricCipher>,
        handoff: Option<RecordHandoff>,
    ) -> LedgerResult<Self> {
        let config = config.normalized();
        let (tx, rx) = mpsc::channel();
        let writer_store = Arc::clone(&store);
        let handle = std::thread::Builder::new()
            .name("desi-ledger-writer".into())
            .spawn(move || run_writer(&writer_store, config, &rx, handoff.as_ref()))?;
        info!(
            batch_size = config.batch_size,
            flush_interval_secs = config.flush_interval.as_secs(),
            "ledger writer started"
        );
        Ok(Self {
            store,
            checksums,
            cipher,
            tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    /// Builds the record for `event` and queues it for the writer.
    pub fn append(&self, event: UsageEvent) -> LedgerResult<RecordId> {
        let record = self.build_record(&event, Utc::now())?;
        let id = record.record_id;
        self.tx
            .send(Command::Append(record))
            .map_err(|_| LedgerError::WriterStopped)?;
        Ok(id)
    }

    /// Builds a finished record without queueing it.
    pub fn build_record(&self, event: &UsageEvent, at: DateTime<Utc>) -> LedgerResult<UsageRecord> {
        // Stored timestamps carry microseconds; truncate so the in-memory
        // record matches what a reload produces.
        let timestamp = DateTime::from_timestamp_micros(at.timestamp_micros()).unwrap_or(at);
        let details = serde_json::to_string(&RecordDetails {
            subject_name: &event.subject_name,
            machine_id: self.checksums.machine_id(),
            details: event.details.as_ref(),
        })?;
        let mut record = UsageRecord {
            record_id: RecordId::new(),
            timestamp,
            action_type: event.action_type.clone(),
            subject_hash: sha256_hex(&event.subject_name),
            encrypted_details: self.cipher.encrypt(&details)?,
            checksum: String::new(),
            reported: false,
            report_time: None,
            suspicious: false,
            suspicious_reason: None,
        };
        record.checksum = self.checksums.compute(&record.checksum_fields());
        Ok(record)
    }

    /// Writes everything buffered so far and waits for it to commit.
    pub fn flush(&self) -> LedgerResult<usize> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Command::Flush(reply_tx))
            .map_err(|_| LedgerError::WriterStopped)?;
        reply_rx.recv().map_err(|_| LedgerError::WriterStopped)?
    }

    /// Flushes and stops the writer thread. Safe to call more than once.
    pub fn shutdown(&self) -> LedgerResult<usize> {
        let handle = self
            .handle
            .lock()
            .map_err(|_| LedgerError::Poisoned)?
            .take();
        let Some(handle) = handle else {
            return Ok(0);
        };
        let (reply_tx, reply_rx) = mpsc::channel();
        let flushed = match self.tx.send(Command::Shutdown(reply_tx)) {
            Ok(()) => reply_rx.recv().map_err(|_| LedgerError::WriterStopped)?,
            Err(_) => Err(LedgerError::WriterStopped),
        };
        if handle.join().is_err() {
            warn!("ledger writer thread panicked");
        }
        info!("ledger writer stopped");
        flushed
    }
}

impl Drop for UsageLedger {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "ledger shutdown on drop failed");
        }
    }
}

fn run_writer(
    store: &LedgerStore,
    config: WriterConfig,
    rx: &mpsc::Receiver<Command>,
    handoff: Option<&RecordHandoff>,
) {
    let mut buffer: Vec<UsageRecord> = Vec::new();
    let mut last_flush = Instant::now();

    loop {
        let wait = config.flush_interval.saturating_sub(last_flush.elapsed());
        match rx.recv_timeout(wait) {
            Ok(Command::Append(record)) => {
                buffer.push(record);
                if buffer.len() >= config.batch_size {
                    let _ = flush_buffer(store, &mut buffer, handoff);
                    last_flush = Instant::now();
                }
            }
            Ok(Command::Flush(reply)) => {
                let result = flush_buffer(store, &mut buffer, handoff);
                last_flush = Instant::now();
                let _ = reply.send(result);
            }
            Ok(Command::Shutdown(reply)) => {
                let _ = reply.send(flush_buffer(store, &mut buffer, handoff));
                return;
            }
            Err(RecvTimeoutError::Timeout) => {
                if !buffer.is_empty() {
                    debug!(count = buffer.len(), "interval flush");
                    let _ = flush_buffer(store, &mut buffer, handoff);
                }
                last_flush = Instant::now();
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = flush_buffer(store, &mut buffer, handoff);
                return;
            }
        }
    }
}

/// Commits the buffer. On failure the records stay buffered for the next
/// trigger.
fn flush_buffer(
    store: &LedgerStore,
    buffer: &mut Vec<UsageRecord>,
    handoff: Option<&RecordHandoff>,
) -> LedgerResult<usize> {
    if buffer.is_empty() {
        return Ok(0);
    }
    match store.insert_batch(buffer) {
        Ok(()) => {
            let batch = std::mem::take(buffer);
            let count = batch.len();
            if let Some(handoff) = handoff {
                if handoff.send(batch).is_err() {
                    debug!("record handoff receiver dropped");
                }
            }
            Ok(count)
        }
        Err(e) => {
            warn!(error = %e, pending = buffer.len(), "ledger flush failed; will retry");
            Err(e)
        }
    }
}
