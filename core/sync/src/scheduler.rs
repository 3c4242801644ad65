//! Sync scheduling - on-demand and periodic modes.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify, RwLock};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use tracesync_common::{Error, Result};

/// Time between periodic cycles.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(120);

/// Capacity of the request queue.
const REQUEST_QUEUE: usize = 100;

/// Sync mode configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Cycles run only when requested.
    Manual,
    /// Cycles run at regular intervals and when requested.
    Periodic { interval: Duration },
}

impl Default for SyncMode {
    fn default() -> Self {
        SyncMode::Periodic {
            interval: DEFAULT_SYNC_INTERVAL,
        }
    }
}

/// Sync request types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRequest {
    /// Push pending points, then pull the remote delta.
    Cycle,
    /// Stop the scheduler.
    Shutdown,
}

/// Outcome of a sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Points confirmed by the remote.
    pub pushed: usize,
    /// Points left pending after a failed write.
    pub push_failed: usize,
    /// Points received from the remote.
    pub added: usize,
    /// Points deleted because the remote no longer has them.
    pub removed: usize,
    /// Level at which the pull reconciled, if it ran.
    pub level: Option<u32>,
    /// Whether the pull used the full content listing.
    pub full_content: bool,
    pub duration: Duration,
}

type Reply = Option<oneshot::Sender<Result<SyncReport>>>;

/// Scheduler for managing sync timing and requests.
pub struct SyncScheduler {
    /// Current sync mode.
    mode: Arc<RwLock<SyncMode>>,
    /// Wakes the loop so it picks up a new mode.
    mode_changed: Arc<Notify>,
    /// Channel to send sync requests.
    request_tx: mpsc::Sender<(SyncRequest, Reply)>,
    /// Shutdown signal.
    shutdown: Arc<RwLock<bool>>,
}

impl SyncScheduler {
    /// Create a new scheduler with the given mode.
    pub fn new(mode: SyncMode) -> (Self, SyncSchedulerHandle) {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE);
        let mode = Arc::new(RwLock::new(mode));
        let mode_changed = Arc::new(Notify::new());
        let shutdown = Arc::new(RwLock::new(false));

        let scheduler = Self {
            mode: mode.clone(),
            mode_changed: mode_changed.clone(),
            request_tx,
            shutdown: shutdown.clone(),
        };

        let handle = SyncSchedulerHandle {
            mode,
            mode_changed,
            request_rx,
            shutdown,
        };

        (scheduler, handle)
    }

    /// Queue a cycle and wait for its report.
    ///
    /// # Errors
    /// - `Scheduler` if the loop is not running
    /// - Any error of the cycle itself
    pub async fn request_sync(&self) -> Result<SyncReport> {
        let (response_tx, response_rx) = oneshot::channel();

        self.request_tx
            .send((SyncRequest::Cycle, Some(response_tx)))
            .await
            .map_err(|_| Error::Scheduler("Scheduler not running".to_string()))?;

        response_rx
            .await
            .map_err(|_| Error::Scheduler("Failed to receive sync result".to_string()))?
    }

    /// Queue a cycle without waiting for it.
    ///
    /// The cycle runs after any cycle already queued or in flight.
    ///
    /// # Errors
    /// - `Scheduler` if the loop is not running
    pub async fn trigger(&self) -> Result<()> {
        self.request_tx
            .send((SyncRequest::Cycle, None))
            .await
            .map_err(|_| Error::Scheduler("Scheduler not running".to_string()))
    }

    /// Change the sync mode.
    pub async fn set_mode(&self, mode: SyncMode) {
        let mut current_mode = self.mode.write().await;
        *current_mode = mode;
        self.mode_changed.notify_one();
    }

    /// Get current sync mode.
    pub async fn get_mode(&self) -> SyncMode {
        self.mode.read().await.clone()
    }

    /// Shutdown the scheduler.
    pub async fn shutdown(&self) {
        let mut is_shutdown = self.shutdown.write().await;
        *is_shutdown = true;

        let _ = self.request_tx.send((SyncRequest::Shutdown, None)).await;
    }
}

/// Handle for the scheduler background task.
pub struct SyncSchedulerHandle {
    mode: Arc<RwLock<SyncMode>>,
    mode_changed: Arc<Notify>,
    request_rx: mpsc::Receiver<(SyncRequest, Reply)>,
    shutdown: Arc<RwLock<bool>>,
}

impl SyncSchedulerHandle {
    /// Run the scheduler background task.
    ///
    /// This should be spawned in a tokio task. `sync_fn` runs inline for
    /// every requested or periodic cycle, so cycles never overlap.
    pub async fn run<F, Fut>(mut self, sync_fn: F)
    where
        F: Fn(SyncRequest) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<SyncReport>> + Send,
    {
        let mut periodic_interval = self.create_periodic_interval().await;

        info!("Sync scheduler started");

        loop {
            if *self.shutdown.read().await {
                info!("Sync scheduler shutting down");
                break;
            }

            tokio::select! {
                request = self.request_rx.recv() => {
                    let Some((request, response_tx)) = request else {
                        info!("All schedulers dropped, stopping");
                        break;
                    };

                    match request {
                        SyncRequest::Shutdown => {
                            info!("Received shutdown request");
                            break;
                        }
                        SyncRequest::Cycle => {
                            debug!("Processing sync request");
                            let result = sync_fn(request).await;
                            match response_tx {
                                Some(response_tx) => {
                                    let _ = response_tx.send(result);
                                }
                                None => Self::log_result("Triggered", &result),
                            }
                        }
                    }
                }

                _ = Self::wait_for_periodic(&mut periodic_interval) => {
                    debug!("Triggering periodic sync");
                    let result = sync_fn(SyncRequest::Cycle).await;
                    Self::log_result("Periodic", &result);
                }

                _ = self.mode_changed.notified() => {
                    debug!("Sync mode changed to {:?}", *self.mode.read().await);
                    periodic_interval = self.create_periodic_interval().await;
                }
            }
        }
    }

    fn log_result(kind: &str, result: &Result<SyncReport>) {
        match result {
            Ok(report) => {
                info!(
                    "{} sync completed: {} pushed, {} failed, {} added, {} removed",
                    kind, report.pushed, report.push_failed, report.added, report.removed
                );
            }
            Err(e) => {
                error!("{} sync failed: {}", kind, e);
            }
        }
    }

    async fn create_periodic_interval(&self) -> Option<Interval> {
        let mode = self.mode.read().await;
        match &*mode {
            SyncMode::Periodic { interval: duration } => {
                let mut ticker = interval(*duration);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Some(ticker)
            }
            SyncMode::Manual => None,
        }
    }

    async fn wait_for_periodic(interval: &mut Option<Interval>) {
        match interval {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
