//! Local store trait definition.

use tracesync_common::{Point, PointRecord, Result};

/// Durable mapping from timestamp to point record.
///
/// Implementations provide no isolation between calls. Callers that scan
/// and then mutate must tolerate records changing in between.
pub trait LocalStore: Send + Sync {
    /// Get the store name (e.g., "memory", "sqlite").
    fn name(&self) -> &str;

    /// Snapshot of every record, in ascending timestamp order.
    fn list_all(&self) -> Result<Vec<PointRecord>>;

    /// Records not yet acknowledged by the remote.
    fn list_pending(&self) -> Result<Vec<PointRecord>> {
        Ok(self.list_all()?.into_iter().filter(|r| r.pending).collect())
    }

    /// Records acknowledged by, or received from, the remote.
    fn list_confirmed(&self) -> Result<Vec<PointRecord>> {
        Ok(self.list_all()?.into_iter().filter(|r| !r.pending).collect())
    }

    /// Confirmed points only, as fed to reconciliation.
    fn confirmed_points(&self) -> Result<Vec<Point>> {
        Ok(self.list_confirmed()?.into_iter().map(|r| r.point).collect())
    }

    /// Get the record stored under a timestamp.
    fn get(&self, timestamp: i64) -> Result<Option<PointRecord>>;

    /// Insert or replace the record with the same timestamp.
    fn upsert(&self, record: PointRecord) -> Result<()>;

    /// Remove the record with this timestamp, returning it if it existed.
    fn remove(&self, timestamp: i64) -> Result<Option<PointRecord>>;

    /// Number of stored records.
    fn len(&self) -> Result<usize> {
        Ok(self.list_all()?.len())
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
