//! The two long-running tasks behind a store: the debounced flusher and the
//! reconciliation timer.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use crate::store::StoreInner;

/// Handles for a store's background tasks.
///
/// Dropping this drops the shutdown sender, which also ends both tasks.
pub(crate) struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    flush: JoinHandle<()>,
    reconcile: JoinHandle<()>,
}

impl BackgroundTasks {
    pub(crate) fn spawn(inner: &Arc<StoreInner>) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let flush = tokio::spawn(flush_loop(Arc::clone(inner), rx.clone()));
        let reconcile = tokio::spawn(reconcile_loop(Arc::clone(inner), rx));
        Self {
            shutdown,
            flush,
            reconcile,
        }
    }

    /// Signal both tasks and wait for them to exit.
    pub(crate) async fn stop(self) {
        // receivers may already be gone if a task panicked
        let _ = self.shutdown.send(true);

        for (name, handle) in [("flush", self.flush), ("reconcile", self.reconcile)] {
            if let Err(e) = handle.await {
                error!(task = name, error = ?e, "config store task did not exit cleanly");
            }
        }
    }
}

/// Wait for a mutation, then keep waiting until `save_delay` passes with no
/// further mutations, then flush.
async fn flush_loop(inner: Arc<StoreInner>, mut shutdown: watch::Receiver<bool>) {
    let delay = inner.options.save_delay;
    debug!(?delay, "flush task started");

    loop {
        tokio::select! {
            _ = inner.flush_signal.notified() => {}
            _ = shutdown.changed() => break,
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => break,
                // another write restarts the quiet period
                _ = inner.flush_signal.notified() => continue,
                _ = shutdown.changed() => {
                    debug!("flush task stopping with a save pending");
                    return;
                }
            }
        }

        let report = inner.flush_dirty().await;
        if !report.is_clean() {
            // try the failed buckets again after another quiet period
            inner.flush_signal.notify_one();
        }
    }

    debug!("flush task stopped");
}

async fn reconcile_loop(inner: Arc<StoreInner>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(inner.options.reload_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // the first tick completes immediately and startup already loaded everything
    interval.tick().await;
    debug!(period = ?inner.options.reload_interval, "reconcile task started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                inner.reconcile().await;
            }
            _ = shutdown.changed() => break,
        }
    }

    debug!("reconcile task stopped");
}
