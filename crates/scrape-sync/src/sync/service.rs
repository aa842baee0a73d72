//! Periodic sync loop.
//!
//! Runs the reconciler on a background task, sleeping between cycles. At most
//! one loop runs at a time: starting again cancels and awaits the previous
//! loop first. Cancellation is only observed between cycles and while
//! sleeping, so a write that has been issued is never abandoned halfway.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::reconciler::{CycleOutcome, Phase, Reconciler};
use crate::error::{format_error_chain, Result, SyncError};
use crate::health::HealthState;

struct Running {
    token: CancellationToken,
    /// Taken by the first caller that wants the loop's result.
    handle: Option<JoinHandle<Result<()>>>,
    /// Flips to `true` once the loop has exited; readable by every waiter.
    finished: watch::Receiver<bool>,
}

impl Running {
    /// Cancels the loop and waits until it has exited.
    async fn shut_down(mut self) -> Result<()> {
        self.token.cancel();
        match self.handle.take() {
            Some(handle) => flatten(handle.await),
            None => {
                wait_finished(self.finished).await;
                Ok(())
            }
        }
    }
}

/// Keeps the scrape job in sync by reconciling on a fixed interval.
pub struct SyncService {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    health: HealthState,
    shutdown: CancellationToken,
    running: Mutex<Option<Running>>,
}

impl SyncService {
    /// Creates a service whose loops are cancelled along with `shutdown`.
    pub fn new(
        reconciler: Arc<Reconciler>,
        interval: Duration,
        health: HealthState,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reconciler,
            interval,
            health,
            shutdown,
            running: Mutex::new(None),
        }
    }

    pub fn health(&self) -> &HealthState {
        &self.health
    }

    /// Starts the sync loop, stopping any loop that is already running.
    ///
    /// Returns only after the previous loop has exited, even when another
    /// task is waiting on it in [`SyncService::join`].
    pub async fn start(&self) {
        let mut running = self.running.lock().await;

        // Make sure we stop any previous work first
        if let Some(previous) = running.take() {
            if let Err(e) = previous.shut_down().await {
                log::warn!("Previous sync loop ended with an error: {}", e);
            }
        }

        let token = self.shutdown.child_token();
        let (finished_tx, finished) = watch::channel(false);
        let reconciler = Arc::clone(&self.reconciler);
        let interval = self.interval;
        let health = self.health.clone();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            let result = run_loop(reconciler, interval, health, loop_token).await;
            let _ = finished_tx.send(true);
            result
        });

        log::info!("Sync loop started (interval {:?})", self.interval);
        *running = Some(Running {
            token,
            handle: Some(handle),
            finished,
        });
    }

    /// Cancels the running loop and waits for it to finish.
    pub async fn stop(&self) -> Result<()> {
        // Held until the loop exits so a concurrent start waits its turn
        let mut running = self.running.lock().await;
        match running.take() {
            Some(current) => current.shut_down().await,
            None => Ok(()),
        }
    }

    /// Waits for the running loop to end on its own, either through
    /// cancellation or a fatal error.
    ///
    /// Only the first concurrent caller receives the loop's result; others
    /// see `Ok(())` once the loop has exited.
    pub async fn join(&self) -> Result<()> {
        let (handle, finished) = {
            let mut running = self.running.lock().await;
            match running.as_mut() {
                Some(current) => (current.handle.take(), current.finished.clone()),
                None => return Ok(()),
            }
        };

        match handle {
            Some(handle) => flatten(handle.await),
            None => {
                wait_finished(finished).await;
                Ok(())
            }
        }
    }
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.map_err(|e| SyncError::Task(e.to_string()))?
}

/// Resolves once the loop has flagged its exit. A dropped sender means the
/// task is gone as well.
async fn wait_finished(mut finished: watch::Receiver<bool>) {
    let _ = finished.wait_for(|done| *done).await;
}

async fn run_loop(
    reconciler: Arc<Reconciler>,
    interval: Duration,
    health: HealthState,
    token: CancellationToken,
) -> Result<()> {
    health.set_live(true);

    let result = loop {
        if token.is_cancelled() {
            break Ok(());
        }

        match reconciler.reconcile().await {
            Ok(report) => {
                if !matches!(report.outcome, CycleOutcome::Skipped { .. }) {
                    health.record_sync(Utc::now());
                }
                // The first cycle to finish without error marks the service ready
                health.mark_ready();
                log::debug!(
                    "Sync cycle {} finished: {:?} ({} observed, {} change(s))",
                    report.cycle,
                    report.outcome,
                    report.observed,
                    report.changes.len()
                );
            }
            Err(e) => {
                log::error!(
                    "Unexpected error in sync loop: {}",
                    format_error_chain(&e)
                );
                break Err(e);
            }
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => break Ok(()),
            _ = tokio::time::sleep(interval) => {}
        }
    };

    if result.is_ok() {
        reconciler.set_phase(Phase::Cancelled);
        log::info!("Sync loop cancelled");
    }
    health.set_live(false);
    result
}
