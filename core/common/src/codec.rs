//! Fixed-width binary encoding of points.
//!
//! A point is encoded as three big-endian IEEE-754 doubles in the order
//! `timestamp, lat, lng`. This is the element format folded into digests
//! on both the client and the server, so it must never change.

use crate::{Error, Point, Result};

/// Size of one float64 field.
const FIELD_LEN: usize = 8;

/// Encoded size of a point.
pub const POINT_LEN: usize = 3 * FIELD_LEN;

/// Largest timestamp magnitude that survives the float64 round trip.
pub const MAX_EXACT_TIMESTAMP: i64 = 1 << 53;

/// Encode a point into its 24-byte wire form.
pub fn encode(point: &Point) -> [u8; POINT_LEN] {
    let mut buf = [0u8; POINT_LEN];
    buf[..FIELD_LEN].copy_from_slice(&(point.timestamp as f64).to_be_bytes());
    buf[FIELD_LEN..2 * FIELD_LEN].copy_from_slice(&point.lat.to_be_bytes());
    buf[2 * FIELD_LEN..].copy_from_slice(&point.lng.to_be_bytes());
    buf
}

/// Decode a point from its wire form.
///
/// # Errors
/// - Buffer is not exactly [`POINT_LEN`] bytes
/// - Timestamp field is not an exactly representable integer
pub fn decode(buf: &[u8]) -> Result<Point> {
    if buf.len() != POINT_LEN {
        return Err(Error::Encoding(format!(
            "Expected {} bytes, got {}",
            POINT_LEN,
            buf.len()
        )));
    }

    let timestamp = read_f64(&buf[..FIELD_LEN]);
    let lat = read_f64(&buf[FIELD_LEN..2 * FIELD_LEN]);
    let lng = read_f64(&buf[2 * FIELD_LEN..]);

    if !timestamp.is_finite()
        || timestamp.fract() != 0.0
        || timestamp.abs() > MAX_EXACT_TIMESTAMP as f64
    {
        return Err(Error::Encoding(format!("Invalid timestamp {}", timestamp)));
    }

    Ok(Point::new(timestamp as i64, lat, lng))
}

fn read_f64(field: &[u8]) -> f64 {
    let mut bytes = [0u8; FIELD_LEN];
    bytes.copy_from_slice(field);
    f64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_layout_is_big_endian() {
        let buf = encode(&Point::new(100, 1.0, 2.0));
        assert_eq!(&buf[..8], &100f64.to_be_bytes());
        assert_eq!(&buf[8..16], &[0x3f, 0xf0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&buf[16..], &[0x40, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_wrong_length_fails() {
        assert!(matches!(decode(&[0u8; 23]), Err(Error::Encoding(_))));
        assert!(matches!(decode(&[0u8; 25]), Err(Error::Encoding(_))));
        assert!(matches!(decode(&[]), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_decode_fractional_timestamp_fails() {
        let mut buf = encode(&Point::new(0, 1.0, 1.0));
        buf[..8].copy_from_slice(&1.5f64.to_be_bytes());
        assert!(matches!(decode(&buf), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_negative_zero_survives() {
        let point = Point::new(-7, -0.0, 0.0);
        let decoded = decode(&encode(&point)).unwrap();
        assert_eq!(decoded.lat.to_bits(), (-0.0f64).to_bits());
        assert_eq!(decoded.timestamp, -7);
    }

    proptest! {
        #[test]
        fn prop_round_trip_is_exact(
            timestamp in -MAX_EXACT_TIMESTAMP..=MAX_EXACT_TIMESTAMP,
            lat in proptest::num::f64::NORMAL | proptest::num::f64::SUBNORMAL | proptest::num::f64::ZERO,
            lng in proptest::num::f64::NORMAL | proptest::num::f64::SUBNORMAL | proptest::num::f64::ZERO,
        ) {
            let point = Point::new(timestamp, lat, lng);
            let decoded = decode(&encode(&point)).unwrap();
            prop_assert_eq!(decoded.timestamp, timestamp);
            prop_assert_eq!(decoded.lat.to_bits(), lat.to_bits());
            prop_assert_eq!(decoded.lng.to_bits(), lng.to_bits());
        }
    }
}
