//! SQLite-backed local store.
//!
//! Persists one row per point: the decimal timestamp as key and the JSON
//! `{lat, lng, pending?}` as value.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::store::LocalStore;
use tracesync_common::{Error, PointRecord, Result, StoredValue};

/// Local store manager using SQLite.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open a point database.
    ///
    /// # Errors
    /// - Database creation or migration failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref()).map_err(sqlite_error)?;
        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sqlite_error)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS points (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .map_err(sqlite_error)?;

        info!("Point store opened successfully");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Storage("SQLite connection lock poisoned".to_string()))?;
        f(&conn)
    }
}

fn sqlite_error(err: rusqlite::Error) -> Error {
    Error::Storage(err.to_string())
}

/// Coordinates come back bit-exact only with serde_json's `float_roundtrip`
/// parser; anything less re-encodes differently from the remote copy.
fn parse_row(key: &str, value: &str) -> Result<PointRecord> {
    let value: StoredValue = serde_json::from_str(value)?;
    PointRecord::from_stored(key, value)
}

impl LocalStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn list_all(&self) -> Result<Vec<PointRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT key, value FROM points ORDER BY CAST(key AS INTEGER)")
                .map_err(sqlite_error)?;

            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
                .map_err(sqlite_error)?;

            let mut result = Vec::new();
            for row in rows {
                let (key, value) = row.map_err(sqlite_error)?;
                result.push(parse_row(&key, &value)?);
            }
            Ok(result)
        })
    }

    fn get(&self, timestamp: i64) -> Result<Option<PointRecord>> {
        let key = timestamp.to_string();
        self.with_conn(|conn| {
            let value: Option<String> = conn
                .query_row("SELECT value FROM points WHERE key = ?1", [&key], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(sqlite_error)?;

            value.map(|v| parse_row(&key, &v)).transpose()
        })
    }

    fn upsert(&self, record: PointRecord) -> Result<()> {
        let (key, value) = record.to_stored();
        let value = serde_json::to_string(&value)?;

        debug!("Upserting point: {}", key);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO points (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(sqlite_error)?;
            Ok(())
        })
    }

    fn remove(&self, timestamp: i64) -> Result<Option<PointRecord>> {
        let existing = self.get(timestamp)?;
        if existing.is_some() {
            debug!("Deleting point: {}", timestamp);
            self.with_conn(|conn| {
                conn.execute(
                    "DELETE FROM points WHERE key = ?1",
                    params![timestamp.to_string()],
                )
                .map_err(sqlite_error)?;
                Ok(())
            })?;
        }
        Ok(existing)
    }

    fn len(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM points", [], |row| row.get(0))
                .map_err(sqlite_error)?;
            Ok(count as usize)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;
    use tracesync_common::{encode, Point};

    #[test]
    fn test_upsert_and_get() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .upsert(PointRecord::pending(Point::new(1_700_000_000_000, 45.5, -73.6)))
            .unwrap();

        let record = store.get(1_700_000_000_000).unwrap().unwrap();
        assert!(record.pending);
        assert_eq!(record.point, Point::new(1_700_000_000_000, 45.5, -73.6));
    }

    #[test]
    fn test_persisted_format() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .upsert(PointRecord::confirmed(Point::new(100, 1.0, 2.0)))
            .unwrap();

        let value: String = store
            .with_conn(|conn| {
                conn.query_row("SELECT value FROM points WHERE key = '100'", [], |row| {
                    row.get(0)
                })
                .map_err(sqlite_error)
            })
            .unwrap();
        assert_eq!(value, r#"{"lat":1.0,"lng":2.0}"#);
    }

    #[test]
    fn test_list_sorted_numerically() {
        let store = SqliteStore::in_memory().unwrap();
        for ts in [100, 9, 20] {
            store
                .upsert(PointRecord::confirmed(Point::new(ts, 0.0, 0.0)))
                .unwrap();
        }

        let timestamps: Vec<_> = store.list_all().unwrap().iter().map(|r| r.timestamp()).collect();
        assert_eq!(timestamps, vec![9, 20, 100]);
    }

    #[test]
    fn test_remove_and_len() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .upsert(PointRecord::confirmed(Point::new(1, 0.0, 0.0)))
            .unwrap();
        store
            .upsert(PointRecord::pending(Point::new(2, 0.0, 0.0)))
            .unwrap();
        assert_eq!(store.len().unwrap(), 2);

        assert!(store.remove(1).unwrap().is_some());
        assert!(store.remove(1).unwrap().is_none());
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.list_pending().unwrap().len(), 1);
    }

    #[test]
    fn test_reopen_keeps_records() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("points.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .upsert(PointRecord::pending(Point::new(7, 1.5, 2.5)))
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let record = store.get(7).unwrap().unwrap();
        assert!(record.pending);
    }

    #[test]
    fn test_coordinates_read_back_exactly() {
        let store = SqliteStore::in_memory().unwrap();
        let point = Point::new(4, 65.85838639744097, 21.877423353265442);
        store.upsert(PointRecord::confirmed(point)).unwrap();

        let record = store.get(4).unwrap().unwrap();
        assert_eq!(record.point.lng.to_bits(), 21.877423353265442f64.to_bits());
        assert_eq!(encode(&record.point), encode(&point));
    }

    proptest! {
        #[test]
        fn prop_coordinates_survive_storage(
            timestamp in 0i64..(1 << 53),
            lat in -90.0f64..90.0,
            lng in proptest::num::f64::NORMAL | proptest::num::f64::SUBNORMAL | proptest::num::f64::ZERO,
        ) {
            let store = SqliteStore::in_memory().unwrap();
            let point = Point::new(timestamp, lat, lng);
            store.upsert(PointRecord::confirmed(point)).unwrap();

            let record = store.get(timestamp).unwrap().unwrap();
            prop_assert_eq!(encode(&record.point), encode(&point));
        }
    }
}
