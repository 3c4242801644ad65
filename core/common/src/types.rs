//! Common types used throughout TraceSync.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A recorded position.
///
/// `timestamp` is the acquisition time in milliseconds and doubles as the
/// identity of the point: two points with the same timestamp are the same
/// point, whatever their coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub timestamp: i64,
    pub lat: f64,
    pub lng: f64,
}

impl Point {
    /// Create a new point.
    pub fn new(timestamp: i64, lat: f64, lng: f64) -> Self {
        Self {
            timestamp,
            lat,
            lng,
        }
    }

    /// Storage key of this point (decimal timestamp).
    pub fn key(&self) -> String {
        self.timestamp.to_string()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@({}, {})", self.timestamp, self.lat, self.lng)
    }
}

/// A point as held by the local store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub point: Point,
    /// Recorded locally but not yet acknowledged by the remote.
    pub pending: bool,
}

impl PointRecord {
    /// A freshly captured point awaiting push.
    pub fn pending(point: Point) -> Self {
        Self {
            point,
            pending: true,
        }
    }

    /// A point acknowledged by, or received from, the remote.
    pub fn confirmed(point: Point) -> Self {
        Self {
            point,
            pending: false,
        }
    }

    pub fn timestamp(&self) -> i64 {
        self.point.timestamp
    }

    /// Split into the persisted key and value.
    pub fn to_stored(&self) -> (String, StoredValue) {
        (
            self.point.key(),
            StoredValue {
                lat: self.point.lat,
                lng: self.point.lng,
                pending: self.pending,
            },
        )
    }

    /// Rebuild a record from its persisted key and value.
    ///
    /// # Errors
    /// - Returns error if the key is not a decimal timestamp
    pub fn from_stored(key: &str, value: StoredValue) -> crate::Result<Self> {
        let timestamp = key.parse::<i64>().map_err(|e| {
            crate::Error::Storage(format!("Invalid point key {:?}: {}", key, e))
        })?;

        Ok(Self {
            point: Point::new(timestamp, value.lat, value.lng),
            pending: value.pending,
        })
    }
}

/// Persisted value of a point, keyed externally by its timestamp.
///
/// `pending` is only written when set; its absence means confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredValue {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub pending: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_key() {
        let point = Point::new(1_700_000_000_123, 48.85, 2.35);
        assert_eq!(point.key(), "1700000000123");
    }

    #[test]
    fn test_stored_value_omits_confirmed_flag() {
        let (key, value) = PointRecord::confirmed(Point::new(100, 1.0, 2.0)).to_stored();
        assert_eq!(key, "100");
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"{"lat":1.0,"lng":2.0}"#
        );
    }

    #[test]
    fn test_stored_value_keeps_pending_flag() {
        let (_, value) = PointRecord::pending(Point::new(100, 1.0, 2.0)).to_stored();
        let json = serde_json::to_string(&value).unwrap();
        assert!(json.contains(r#""pending":true"#));
    }

    #[test]
    fn test_missing_pending_means_confirmed() {
        let value: StoredValue = serde_json::from_str(r#"{"lat":3.5,"lng":-1.25}"#).unwrap();
        let record = PointRecord::from_stored("42", value).unwrap();
        assert!(!record.pending);
        assert_eq!(record.point, Point::new(42, 3.5, -1.25));
    }

    #[test]
    fn test_invalid_key_fails() {
        let value = StoredValue {
            lat: 0.0,
            lng: 0.0,
            pending: false,
        };
        assert!(PointRecord::from_stored("not-a-number", value).is_err());
    }
}
