//! Periodic push of unreported records to the collector.
//!
//! The reporter runs on its own tokio task. It learns about new records
//! through the hand-off channel the ledger writer feeds after every flush.
//! The in-memory queue holds at most `QUEUE_FACTOR` batches; records past
//! that stay unreported on disk and are pulled back in from the ledger once
//! the queue drains. Failures are logged and the records stay queued for
//! the next cycle.

use crate::config::ReporterConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::task::{sleep_or_stop, BackgroundTask};
use chrono::Utc;
use desi_crypto::ChecksumEngine;
use desi_ledger::LedgerStore;
use desi_types::{PushBatch, RecordId, UsageRecord};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Queue capacity in multiples of `batch_limit`.
const QUEUE_FACTOR: usize = 4;

/// Signs `batch` in place with the checksum engine of its machine.
pub fn sign_batch(batch: &mut PushBatch) {
    let engine = ChecksumEngine::new(batch.machine_id.clone());
    batch.signature = engine.sign_bytes(batch.signing_payload().as_bytes());
}

/// What the reporter needs from the tracker.
#[derive(Clone)]
pub struct ReporterContext {
    pub store: Arc<LedgerStore>,
    pub license_key: String,
    pub machine_id: String,
}

struct ReporterState {
    config: ReporterConfig,
    endpoint: String,
    context: ReporterContext,
    client: reqwest::Client,
    handoff: mpsc::UnboundedReceiver<Vec<UsageRecord>>,
    queue: VecDeque<UsageRecord>,
    queued: HashSet<RecordId>,
    /// Unreported records may exist on disk that are not in the queue.
    needs_seed: bool,
}

impl ReporterState {
    fn new(
        config: ReporterConfig,
        endpoint: String,
        context: ReporterContext,
        client: reqwest::Client,
        handoff: mpsc::UnboundedReceiver<Vec<UsageRecord>>,
    ) -> Self {
        Self {
            config,
            endpoint,
            context,
            client,
            handoff,
            queue: VecDeque::new(),
            queued: HashSet::new(),
            needs_seed: true,
        }
    }

    fn batch_limit(&self) -> usize {
        self.config.batch_limit.max(1)
    }

    fn capacity(&self) -> usize {
        self.batch_limit().saturating_mul(QUEUE_FACTOR)
    }

    fn enqueue(&mut self, records: impl IntoIterator<Item = UsageRecord>) {
        let capacity = self.capacity();
        let mut dropped = 0usize;
        for record in records {
            if record.reported || self.queued.contains(&record.record_id) {
                continue;
            }
            if self.queue.len() >= capacity {
                dropped += 1;
                continue;
            }
            self.queued.insert(record.record_id);
            self.queue.push_back(record);
        }
        if dropped > 0 {
            self.needs_seed = true;
            debug!(dropped, capacity, "reporter queue full; records left on disk");
        }
    }

    async fn seed_from_storage(&mut self) {
        let store = Arc::clone(&self.context.store);
        let limit = self.capacity();
        match tokio::task::spawn_blocking(move || store.unreported(limit)).await {
            Ok(Ok(records)) => {
                debug!(count = records.len(), "reporter queue seeded from ledger");
                self.needs_seed = records.len() >= limit;
                self.enqueue(records);
                // Flushes that landed during the query are already queued.
                self.drain_handoff();
            }
            Ok(Err(e)) => warn!(error = %e, "failed to seed reporter queue"),
            Err(e) => warn!(error = %e, "reporter seed task failed"),
        }
    }

    fn drain_handoff(&mut self) {
        while let Ok(batch) = self.handoff.try_recv() {
            self.enqueue(batch);
        }
    }

    /// Pushes one batch. Returns how many records were acknowledged.
    async fn push_once(&mut self) -> TrackerResult<usize> {
        self.drain_handoff();
        if self.queue.is_empty() && self.needs_seed {
            self.seed_from_storage().await;
        }
        if self.queue.is_empty() {
            return Ok(0);
        }
        let take = self.queue.len().min(self.batch_limit());
        let records: Vec<UsageRecord> = self.queue.iter().take(take).cloned().collect();

        let mut batch = PushBatch::new(
            &self.context.license_key,
            &self.context.machine_id,
            &records,
        );
        sign_batch(&mut batch);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&batch)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%status, pending = self.queue.len(), "collector rejected usage batch");
            return Ok(0);
        }

        let ids: Vec<RecordId> = records.iter().map(|r| r.record_id).collect();
        let store = Arc::clone(&self.context.store);
        let marked = tokio::task::spawn_blocking(move || store.mark_reported(&ids, Utc::now()))
            .await
            .map_err(|e| TrackerError::Io(std::io::Error::other(e)))??;

        for record in self.queue.drain(..take) {
            self.queued.remove(&record.record_id);
        }
        info!(sent = take, marked, "usage batch reported");
        Ok(take)
    }
}

/// Handle to the running reporter task.
pub struct BackgroundReporter {
    task: BackgroundTask,
}

impl BackgroundReporter {
    /// Spawns the reporter on the current tokio runtime.
    pub fn start(
        config: ReporterConfig,
        endpoint: String,
        context: ReporterContext,
        handoff: mpsc::UnboundedReceiver<Vec<UsageRecord>>,
        runtime: &tokio::runtime::Handle,
    ) -> TrackerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let state = ReporterState::new(config, endpoint, context, client, handoff);
        let task = BackgroundTask::spawn("reporter", runtime, move |stop_rx| run(state, stop_rx));
        Ok(Self { task })
    }

    /// Asks the task to stop. An in-flight push finishes first.
    pub fn stop(&self) {
        self.task.stop();
    }

    /// Stops the task and waits for it to exit.
    pub async fn stop_and_wait(&self) {
        self.task.stop_and_wait().await;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }
}

async fn run(mut state: ReporterState, mut stop_rx: watch::Receiver<bool>) {
    info!(
        endpoint = %state.endpoint,
        startup_delay_secs = state.config.startup_delay_secs,
        interval_secs = state.config.interval_secs,
        "background reporter started"
    );

    if !sleep_or_stop(state.config.startup_delay(), &mut stop_rx).await {
        info!("background reporter stopped before first cycle");
        return;
    }

    loop {
        if let Err(e) = state.push_once().await {
            warn!(error = %e, pending = state.queue.len(), "usage push failed; will retry");
        }
        if !sleep_or_stop(state.config.interval(), &mut stop_rx).await {
            break;
        }
    }
    info!("background reporter stopped");
}
