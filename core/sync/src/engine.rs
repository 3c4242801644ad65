//! Core sync engine that orchestrates push and pull.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use tracesync_common::{Error, Point, PointRecord, Result, MAX_EXACT_TIMESTAMP};
use tracesync_remote::RemoteStore;
use tracesync_storage::LocalStore;

use crate::events::StoreEvent;
use crate::resolver::{Resolution, Resolver, DEFAULT_MAX_LEVEL};
use crate::scheduler::{SyncMode, SyncReport, SyncRequest, SyncScheduler, SyncSchedulerHandle};
use crate::state::{SyncPhase, SyncState};

/// Buffered store events per subscriber before the slowest one lags.
const EVENT_CAPACITY: usize = 256;

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Highest digest level tried before a pull gives up.
    pub max_level: u32,
    /// Remote writes in flight at once during push.
    pub push_concurrency: usize,
    /// Sync mode.
    pub sync_mode: SyncMode,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_level: DEFAULT_MAX_LEVEL,
            push_concurrency: 4,
            sync_mode: SyncMode::default(),
        }
    }
}

/// Main sync engine for one client.
///
/// Owns the link between a local store and a remote store. A cycle pushes
/// every pending record, then pulls the remote delta into the confirmed
/// records. Cycles are serialized: concurrent calls to [`SyncEngine::sync`]
/// run one after the other.
pub struct SyncEngine<S: LocalStore + ?Sized, R: RemoteStore + ?Sized> {
    /// Local point store.
    store: Arc<S>,
    /// Remote point store.
    remote: Arc<R>,
    /// Digest reconciliation.
    resolver: Resolver,
    /// Sync state tracking.
    state: Arc<RwLock<SyncState>>,
    /// Store change notifications.
    events: broadcast::Sender<StoreEvent>,
    /// Held for the duration of a cycle.
    cycle: Mutex<()>,
    /// Bumped after every successful re-login.
    session_generation: Mutex<u64>,
    /// Sync scheduler.
    scheduler: Option<SyncScheduler>,
    /// Configuration.
    config: SyncConfig,
}

impl<S: LocalStore + ?Sized, R: RemoteStore + ?Sized> SyncEngine<S, R> {
    /// Create a new sync engine.
    pub fn new(store: Arc<S>, remote: Arc<R>, config: SyncConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            store,
            remote,
            resolver: Resolver::new(config.max_level),
            state: Arc::new(RwLock::new(SyncState::new())),
            events,
            cycle: Mutex::new(()),
            session_generation: Mutex::new(0),
            scheduler: None,
            config,
        }
    }

    /// Resume from a previously saved state.
    pub fn with_state(self, mut state: SyncState) -> Self {
        state.phase = SyncPhase::Idle;
        Self {
            state: Arc::new(RwLock::new(state)),
            ..self
        }
    }

    /// Initialize the scheduler and return a handle for running it.
    pub fn init_scheduler(&mut self) -> SyncSchedulerHandle {
        let (scheduler, handle) = SyncScheduler::new(self.config.sync_mode.clone());
        self.scheduler = Some(scheduler);
        handle
    }

    /// Get the scheduler for requesting syncs.
    pub fn scheduler(&self) -> Option<&SyncScheduler> {
        self.scheduler.as_ref()
    }

    /// Get a reference to the sync state.
    pub fn state(&self) -> Arc<RwLock<SyncState>> {
        self.state.clone()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Subscribe to changes the engine makes to the local store.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Store a freshly captured point as pending.
    ///
    /// A record already stored under the same timestamp is replaced.
    ///
    /// # Errors
    /// - `InvalidInput` if the timestamp cannot be encoded exactly or a
    ///   coordinate is not finite
    /// - Storage errors
    pub fn record_point(&self, point: Point) -> Result<PointRecord> {
        if point.timestamp.abs() > MAX_EXACT_TIMESTAMP {
            return Err(Error::InvalidInput(format!(
                "Timestamp {} out of range",
                point.timestamp
            )));
        }
        if !point.lat.is_finite() || !point.lng.is_finite() {
            return Err(Error::InvalidInput(format!(
                "Coordinates of point {} are not finite",
                point.timestamp
            )));
        }

        let record = PointRecord::pending(point);
        self.store.upsert(record)?;
        debug!("Recorded pending point {}", point);
        self.emit(StoreEvent::Saved(record));

        Ok(record)
    }

    /// Run one full cycle: push pending points, then pull.
    ///
    /// Individual push failures are counted in the report and never prevent
    /// the pull. A push phase that fails as a whole still lets the pull run,
    /// then fails the cycle with its own error if the pull succeeded. A
    /// failed pull fails the cycle, but store changes already applied are
    /// kept.
    pub async fn sync(&self) -> Result<SyncReport> {
        let _cycle = self.cycle.lock().await;
        let start = Instant::now();
        let mut report = SyncReport::default();

        info!(
            "Starting sync between {} store and {} remote",
            self.store.name(),
            self.remote.name()
        );

        self.state.write().await.begin_push();
        let pushed = self.push_pending(&mut report).await;
        if let Err(e) = &pushed {
            warn!("Push phase failed, pulling anyway: {}", e);
        }

        self.state.write().await.begin_pull();
        if let Err(e) = self.pull_changes(&mut report).await {
            return Err(self.record_failure(e).await);
        }
        if let Err(e) = pushed {
            return Err(self.record_failure(e).await);
        }

        self.state.write().await.finish_success();
        report.duration = start.elapsed();
        info!(
            "Full sync completed in {:?}: {} pushed, {} push failures, {} added, {} removed",
            report.duration, report.pushed, report.push_failed, report.added, report.removed
        );

        Ok(report)
    }

    /// Push pending points only.
    pub async fn push(&self) -> Result<SyncReport> {
        let _cycle = self.cycle.lock().await;
        let start = Instant::now();
        let mut report = SyncReport::default();

        self.state.write().await.begin_push();
        if let Err(e) = self.push_pending(&mut report).await {
            return Err(self.record_failure(e).await);
        }

        self.state.write().await.finish_success();
        report.duration = start.elapsed();
        Ok(report)
    }

    /// Pull the remote delta only.
    pub async fn pull(&self) -> Result<SyncReport> {
        let _cycle = self.cycle.lock().await;
        let start = Instant::now();
        let mut report = SyncReport::default();

        self.state.write().await.begin_pull();
        if let Err(e) = self.pull_changes(&mut report).await {
            return Err(self.record_failure(e).await);
        }

        self.state.write().await.finish_success();
        report.duration = start.elapsed();
        Ok(report)
    }

    /// Process a sync request (for scheduler).
    pub async fn process_request(&self, request: SyncRequest) -> Result<SyncReport> {
        match request {
            SyncRequest::Cycle => self.sync().await,
            SyncRequest::Shutdown => Ok(SyncReport::default()),
        }
    }

    async fn record_failure(&self, error: Error) -> Error {
        error!("Sync failed: {}", error);
        self.state.write().await.finish_failure(error.to_string());
        error
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Write every pending record to the remote.
    async fn push_pending(&self, report: &mut SyncReport) -> Result<()> {
        let pending = self.store.list_pending()?;
        if pending.is_empty() {
            debug!("No pending points to push");
            return Ok(());
        }

        info!("Pushing {} pending points", pending.len());

        let writes: Vec<_> = pending
            .into_iter()
            .map(|record| self.push_record(record))
            .collect();
        let results: Vec<(Point, Result<()>)> = stream::iter(writes)
            .buffer_unordered(self.config.push_concurrency.max(1))
            .collect()
            .await;

        for (point, result) in results {
            match result {
                Ok(()) => match self.confirm(point) {
                    Ok(()) => report.pushed += 1,
                    Err(e) => {
                        warn!("Failed to confirm pushed point {}: {}", point.timestamp, e);
                        report.push_failed += 1;
                    }
                },
                Err(e) => {
                    warn!("Failed to push point {}: {}", point.timestamp, e);
                    report.push_failed += 1;
                }
            }
        }

        Ok(())
    }

    async fn push_record(&self, record: PointRecord) -> (Point, Result<()>) {
        (record.point, self.push_one(&record.point).await)
    }

    /// Write one point, re-logging in once if the session was rejected.
    async fn push_one(&self, point: &Point) -> Result<()> {
        let generation = *self.session_generation.lock().await;

        match self.remote.push(point).await {
            Err(Error::AuthExpired) => {
                self.relogin(generation).await?;
                match self.remote.push(point).await {
                    Err(Error::AuthExpired) => Err(Error::Network(format!(
                        "Session rejected again after re-login while pushing point {}",
                        point.timestamp
                    ))),
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Log in unless another push already did since `seen` was read.
    async fn relogin(&self, seen: u64) -> Result<()> {
        let mut generation = self.session_generation.lock().await;
        if *generation != seen {
            debug!("Session already renewed");
            return Ok(());
        }

        info!("Session expired, logging in again");
        self.remote.login().await?;
        *generation += 1;
        Ok(())
    }

    /// Mark a pushed point confirmed if it was not changed in the meantime.
    fn confirm(&self, point: Point) -> Result<()> {
        match self.store.get(point.timestamp)? {
            Some(current) if current.pending && current.point == point => {
                let record = PointRecord::confirmed(point);
                self.store.upsert(record)?;
                self.emit(StoreEvent::Saved(record));
            }
            _ => debug!(
                "Point {} changed while being pushed, leaving it as is",
                point.timestamp
            ),
        }
        Ok(())
    }

    /// Reconcile the confirmed records with the remote and apply the delta.
    async fn pull_changes(&self, report: &mut SyncReport) -> Result<()> {
        let resolution = self.resolve().await?;

        report.level = Some(resolution.level);
        report.full_content = resolution.full_content;

        for point in resolution.difference.removed {
            match self.store.get(point.timestamp)? {
                Some(current) if current.pending => {
                    debug!("Keeping pending point {} absent remotely", point.timestamp);
                }
                Some(_) => {
                    if let Some(removed) = self.store.remove(point.timestamp)? {
                        report.removed += 1;
                        self.emit(StoreEvent::Removed(removed.point));
                    }
                }
                None => {}
            }
        }

        for point in resolution.difference.added {
            let record = PointRecord::confirmed(point);
            self.store.upsert(record)?;
            report.added += 1;
            self.emit(StoreEvent::Saved(record));
        }

        Ok(())
    }

    async fn resolve(&self) -> Result<Resolution> {
        let local = self.store.confirmed_points()?;
        debug!("Resolving {} confirmed points", local.len());
        let generation = *self.session_generation.lock().await;

        match self.resolver.resolve(&local, self.remote.as_ref()).await {
            Err(Error::AuthExpired) => {
                self.relogin(generation).await?;
                self.resolver.resolve(&local, self.remote.as_ref()).await
            }
            other => other,
        }
    }
}

impl<S, R> SyncEngine<S, R>
where
    S: LocalStore + ?Sized + 'static,
    R: RemoteStore + ?Sized + 'static,
{
    /// Spawn the scheduler loop, driving cycles on this engine.
    pub fn spawn_scheduler(self: &Arc<Self>, handle: SyncSchedulerHandle) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            handle
                .run(move |request| {
                    let engine = engine.clone();
                    async move { engine.process_request(request).await }
                })
                .await;
        })
    }
}
