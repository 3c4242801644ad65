//! In-memory local store for testing.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::store::LocalStore;
use tracesync_common::{Error, PointRecord, Result};

/// In-memory local store.
///
/// Useful for testing and ephemeral clients. All records are lost on drop.
pub struct MemoryStore {
    records: RwLock<BTreeMap<i64, PointRecord>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a store pre-populated with records.
    pub fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = PointRecord>,
    {
        Self {
            records: RwLock::new(records.into_iter().map(|r| (r.timestamp(), r)).collect()),
        }
    }

    fn poisoned<T>(_: T) -> Error {
        Error::Storage("Memory store lock poisoned".to_string())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn list_all(&self) -> Result<Vec<PointRecord>> {
        let records = self.records.read().map_err(Self::poisoned)?;
        Ok(records.values().copied().collect())
    }

    fn get(&self, timestamp: i64) -> Result<Option<PointRecord>> {
        let records = self.records.read().map_err(Self::poisoned)?;
        Ok(records.get(&timestamp).copied())
    }

    fn upsert(&self, record: PointRecord) -> Result<()> {
        let mut records = self.records.write().map_err(Self::poisoned)?;
        records.insert(record.timestamp(), record);
        Ok(())
    }

    fn remove(&self, timestamp: i64) -> Result<Option<PointRecord>> {
        let mut records = self.records.write().map_err(Self::poisoned)?;
        Ok(records.remove(&timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracesync_common::Point;

    #[test]
    fn test_upsert_and_get() {
        let store = MemoryStore::new();
        store
            .upsert(PointRecord::pending(Point::new(10, 1.0, 2.0)))
            .unwrap();

        let record = store.get(10).unwrap().unwrap();
        assert!(record.pending);
        assert_eq!(record.point.lat, 1.0);
        assert!(store.get(11).unwrap().is_none());
    }

    #[test]
    fn test_one_record_per_timestamp() {
        let store = MemoryStore::new();
        store
            .upsert(PointRecord::pending(Point::new(10, 1.0, 2.0)))
            .unwrap();
        store
            .upsert(PointRecord::confirmed(Point::new(10, 1.0, 2.0)))
            .unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert!(!store.get(10).unwrap().unwrap().pending);
    }

    #[test]
    fn test_pending_and_confirmed_listings() {
        let store = MemoryStore::with_records(vec![
            PointRecord::pending(Point::new(3, 0.0, 0.0)),
            PointRecord::confirmed(Point::new(1, 0.0, 0.0)),
            PointRecord::confirmed(Point::new(2, 0.0, 0.0)),
        ]);

        let pending: Vec<_> = store.list_pending().unwrap().iter().map(|r| r.timestamp()).collect();
        let confirmed: Vec<_> = store.confirmed_points().unwrap().iter().map(|p| p.timestamp).collect();
        assert_eq!(pending, vec![3]);
        assert_eq!(confirmed, vec![1, 2]);
    }

    #[test]
    fn test_remove() {
        let store = MemoryStore::with_records(vec![PointRecord::confirmed(Point::new(5, 0.5, 0.5))]);
        let removed = store.remove(5).unwrap();
        assert_eq!(removed.map(|r| r.timestamp()), Some(5));
        assert!(store.remove(5).unwrap().is_none());
        assert!(store.is_empty().unwrap());
    }
}
