//! Stop/join handle shared by the tracker's background loops.

use std::future::Future;
use std::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// A spawned loop that watches a stop flag.
pub(crate) struct BackgroundTask {
    name: &'static str,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundTask {
    /// Spawns `body` on `runtime`, handing it the stop receiver.
    pub(crate) fn spawn<F, Fut>(name: &'static str, runtime: &tokio::runtime::Handle, body: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = runtime.spawn(body(stop_rx));
        Self {
            name,
            stop_tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub(crate) fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub(crate) async fn stop_and_wait(&self) {
        self.stop();
        let handle = self.handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(task = self.name, error = %e, "background task ended abnormally");
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle
            .lock()
            .ok()
            .and_then(|h| h.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleeps for `delay` unless a stop arrives first. Returns `false` on stop.
pub(crate) async fn sleep_or_stop(
    delay: std::time::Duration,
    stop_rx: &mut watch::Receiver<bool>,
) -> bool {
    if *stop_rx.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = stop_rx.changed() => false,
    }
}
