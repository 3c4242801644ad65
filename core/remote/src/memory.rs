//! In-memory remote for testing.
//!
//! Mirrors the server-side views: digests are precomputed for levels
//! `0..=max_summary_level` over the confirmed points, and any other request
//! (or any request against an empty set) is answered with the full content
//! listing.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tracing::debug;

use tracesync_common::{encode, Error, Point, Result};
use tracesync_digest::{FullContent, Ibf, Summary};

use crate::provider::{RemoteStore, RemoteSummarizer};

/// Highest level the server view emits a summary for.
pub const DEFAULT_MAX_SUMMARY_LEVEL: u32 = 9;

/// Decrements the in-flight counter when a call completes.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory remote store.
///
/// Besides the store itself it offers fault injection (expired sessions,
/// refused logins, failing writes, unavailability) and call accounting so
/// tests can observe what the sync engine did.
pub struct MemoryRemote {
    points: RwLock<BTreeMap<i64, Point>>,
    max_summary_level: u32,
    latency: Option<Duration>,
    session_valid: AtomicBool,
    logins_refresh_session: AtomicBool,
    unavailable: AtomicBool,
    failing_pushes: Mutex<HashSet<i64>>,
    requested_levels: Mutex<Vec<u32>>,
    logins: AtomicUsize,
    push_attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryRemote {
    /// Create a new empty remote with a valid session.
    pub fn new() -> Self {
        Self {
            points: RwLock::new(BTreeMap::new()),
            max_summary_level: DEFAULT_MAX_SUMMARY_LEVEL,
            latency: None,
            session_valid: AtomicBool::new(true),
            logins_refresh_session: AtomicBool::new(true),
            unavailable: AtomicBool::new(false),
            failing_pushes: Mutex::new(HashSet::new()),
            requested_levels: Mutex::new(Vec::new()),
            logins: AtomicUsize::new(0),
            push_attempts: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Create a remote already holding confirmed points.
    pub fn with_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = Point>,
    {
        let remote = Self::new();
        for point in points {
            remote.insert(point);
        }
        remote
    }

    /// Set the highest level a digest is served for.
    pub fn with_max_summary_level(mut self, level: u32) -> Self {
        self.max_summary_level = level;
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Store a point server-side, as if another client had pushed it.
    pub fn insert(&self, point: Point) {
        if let Ok(mut points) = self.points.write() {
            points.insert(point.timestamp, point);
        }
    }

    /// Delete a point server-side.
    pub fn delete(&self, timestamp: i64) -> Option<Point> {
        self.points
            .write()
            .ok()
            .and_then(|mut points| points.remove(&timestamp))
    }

    /// Snapshot of the confirmed points, ordered by timestamp.
    pub fn points(&self) -> Vec<Point> {
        self.points
            .read()
            .map(|points| points.values().copied().collect())
            .unwrap_or_default()
    }

    /// Invalidate the current session; the next write gets a 401.
    pub fn expire_session(&self) {
        self.session_valid.store(false, Ordering::SeqCst);
    }

    /// Whether logins restore the session (false simulates repeated 401s).
    pub fn set_logins_refresh_session(&self, refresh: bool) {
        self.logins_refresh_session.store(refresh, Ordering::SeqCst);
    }

    /// Make every call fail with a network error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make writes of this point fail with a network error.
    pub fn fail_pushes_for(&self, timestamp: i64) {
        if let Ok(mut failing) = self.failing_pushes.lock() {
            failing.insert(timestamp);
        }
    }

    /// Levels requested so far, in order.
    pub fn requested_levels(&self) -> Vec<u32> {
        self.requested_levels
            .lock()
            .map(|levels| levels.clone())
            .unwrap_or_default()
    }

    /// Forget recorded levels.
    pub fn clear_requested_levels(&self) {
        if let Ok(mut levels) = self.requested_levels.lock() {
            levels.clear();
        }
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn push_attempts(&self) -> usize {
        self.push_attempts.load(Ordering::SeqCst)
    }

    /// Largest number of calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<InFlight<'_>> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Network("Remote unavailable".to_string()));
        }
        Ok(guard)
    }

    fn encoded_points(&self) -> Result<Vec<Vec<u8>>> {
        let points = self
            .points
            .read()
            .map_err(|_| Error::Storage("Remote lock poisoned".to_string()))?;
        Ok(points.values().map(|p| encode(p).to_vec()).collect())
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteSummarizer for MemoryRemote {
    type Digest = Ibf;

    async fn summarize(&self, level: u32) -> Result<Summary<Ibf>> {
        let _guard = self.enter().await?;

        if let Ok(mut levels) = self.requested_levels.lock() {
            levels.push(level);
        }

        let items = self.encoded_points()?;
        if items.is_empty() || level > self.max_summary_level {
            debug!("Serving full content ({} points) for level {}", items.len(), level);
            return Ok(Summary::FullContent(FullContent::from_items(items)));
        }

        Ok(Summary::Digest(Ibf::from_items(
            level,
            items.iter().map(|i| i.as_slice()),
        )))
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    fn name(&self) -> &str {
        "memory"
    }

    async fn push(&self, point: &Point) -> Result<()> {
        self.push_attempts.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await?;

        if !self.session_valid.load(Ordering::SeqCst) {
            return Err(Error::AuthExpired);
        }

        let failing = self
            .failing_pushes
            .lock()
            .map(|failing| failing.contains(&point.timestamp))
            .unwrap_or(false);
        if failing {
            return Err(Error::Network(format!(
                "Failed to push point {}: 500 Internal Server Error",
                point.timestamp
            )));
        }

        self.insert(*point);
        Ok(())
    }

    async fn login(&self) -> Result<()> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter().await?;

        if self.logins_refresh_session.load(Ordering::SeqCst) {
            self.session_valid.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracesync_digest::Digest;

    #[tokio::test]
    async fn test_empty_remote_serves_full_content() {
        let remote = MemoryRemote::new();
        match remote.summarize(0).await.unwrap() {
            Summary::FullContent(content) => assert!(content.is_empty()),
            Summary::Digest(_) => panic!("expected full content"),
        }
    }

    #[tokio::test]
    async fn test_digest_up_to_max_level() {
        let remote = MemoryRemote::with_points(vec![Point::new(1, 1.0, 1.0)])
            .with_max_summary_level(3);

        match remote.summarize(3).await.unwrap() {
            Summary::Digest(ibf) => assert_eq!(ibf.bucket_count(), 8),
            Summary::FullContent(_) => panic!("expected digest"),
        }
        assert!(matches!(
            remote.summarize(4).await.unwrap(),
            Summary::FullContent(_)
        ));
        assert_eq!(remote.requested_levels(), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_digest_decodes_single_point() {
        let point = Point::new(100, 1.0, 2.0);
        let remote = MemoryRemote::with_points(vec![point]);

        let Summary::Digest(ibf) = remote.summarize(0).await.unwrap() else {
            panic!("expected digest");
        };
        let diff = ibf.peel().unwrap();
        assert_eq!(diff.added, vec![encode(&point).to_vec()]);
    }

    #[tokio::test]
    async fn test_expired_session_until_login() {
        let remote = MemoryRemote::new();
        remote.expire_session();

        let point = Point::new(5, 0.0, 0.0);
        assert!(matches!(remote.push(&point).await, Err(Error::AuthExpired)));
        remote.login().await.unwrap();
        remote.push(&point).await.unwrap();

        assert_eq!(remote.points(), vec![point]);
        assert_eq!(remote.login_count(), 1);
        assert_eq!(remote.push_attempts(), 2);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let remote = MemoryRemote::new();
        remote.set_unavailable(true);
        assert!(matches!(remote.summarize(0).await, Err(Error::Network(_))));
    }
}
