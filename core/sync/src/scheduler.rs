//! Sync triggering: connectivity transitions, a periodic timer, manual requests.

use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use tasksync_common::{Error, Result};

use crate::state::DrainOutcome;

/// Why the scheduler is asking for a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// The connectivity signal changed to the carried value.
    Connectivity(bool),
    /// The periodic timer fired.
    Tick,
    /// Someone asked through [`SyncScheduler::request_sync`].
    Manual,
}

enum SchedulerRequest {
    Sync(oneshot::Sender<Result<DrainOutcome>>),
    Shutdown,
}

/// Handle for requesting syncs from a running scheduler.
///
/// Dropping every `SyncScheduler` stops the background task.
#[derive(Clone)]
pub struct SyncScheduler {
    request_tx: mpsc::Sender<SchedulerRequest>,
}

impl SyncScheduler {
    /// Create a scheduler firing its timer every `period`.
    pub fn new(period: Duration) -> (Self, SyncSchedulerHandle) {
        let (request_tx, request_rx) = mpsc::channel(16);

        let scheduler = Self { request_tx };
        let handle = SyncSchedulerHandle { period, request_rx };

        (scheduler, handle)
    }

    /// Request a sync and wait for its outcome.
    pub async fn request_sync(&self) -> Result<DrainOutcome> {
        let (response_tx, response_rx) = oneshot::channel();

        self.request_tx
            .send(SchedulerRequest::Sync(response_tx))
            .await
            .map_err(|_| Error::InvalidInput("Scheduler not running".to_string()))?;

        response_rx
            .await
            .map_err(|_| Error::InvalidInput("Failed to receive sync result".to_string()))?
    }

    /// Stop the scheduler task.
    pub async fn shutdown(&self) {
        let _ = self.request_tx.send(SchedulerRequest::Shutdown).await;
    }
}

/// Background half of the scheduler.
pub struct SyncSchedulerHandle {
    period: Duration,
    request_rx: mpsc::Receiver<SchedulerRequest>,
}

impl SyncSchedulerHandle {
    /// Run the scheduler loop.
    ///
    /// This should be spawned in a tokio task. `sync_fn` is called with the
    /// trigger whenever connectivity changes, the timer fires or a manual
    /// request arrives. Calls are sequential. The first tick fires one full
    /// period after start.
    pub async fn run<F, Fut>(mut self, mut connectivity: watch::Receiver<bool>, sync_fn: F)
    where
        F: Fn(SyncTrigger) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<DrainOutcome>> + Send,
    {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut connectivity_open = true;

        info!("Sync scheduler started (interval {:?})", self.period);

        loop {
            tokio::select! {
                request = self.request_rx.recv() => {
                    match request {
                        Some(SchedulerRequest::Sync(response_tx)) => {
                            let result = sync_fn(SyncTrigger::Manual).await;
                            log_outcome(SyncTrigger::Manual, &result);
                            let _ = response_tx.send(result);
                        }
                        Some(SchedulerRequest::Shutdown) | None => {
                            info!("Sync scheduler shutting down");
                            break;
                        }
                    }
                }

                changed = connectivity.changed(), if connectivity_open => {
                    match changed {
                        Ok(()) => {
                            let online = *connectivity.borrow_and_update();
                            let trigger = SyncTrigger::Connectivity(online);
                            let result = sync_fn(trigger).await;
                            log_outcome(trigger, &result);
                        }
                        Err(_) => {
                            debug!("Connectivity source closed");
                            connectivity_open = false;
                        }
                    }
                }

                _ = ticker.tick() => {
                    let result = sync_fn(SyncTrigger::Tick).await;
                    log_outcome(SyncTrigger::Tick, &result);
                }
            }
        }
    }
}

fn log_outcome(trigger: SyncTrigger, result: &Result<DrainOutcome>) {
    match result {
        Ok(DrainOutcome::Completed(sync_result)) => {
            info!(
                "Sync after {:?} completed: {} synced, {} failed in {:?}",
                trigger, sync_result.synced, sync_result.failed, sync_result.duration
            );
        }
        Ok(outcome) => {
            debug!("Sync after {:?}: {:?}", trigger, outcome);
        }
        Err(e) => {
            error!("Sync after {:?} failed: {}", trigger, e);
        }
    }
}
