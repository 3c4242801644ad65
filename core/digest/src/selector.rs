//! Deterministic element-to-bucket mapping.
//!
//! The selector pads the element with a counter, hashes it, and reduces the
//! hash modulo the bucket count, repeating until `spread` distinct buckets
//! are found (or every bucket is used when there are fewer than `spread`).

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

/// Default number of buckets each element is spread over.
pub const DEFAULT_SPREAD: usize = 3;

/// Hash-based bucket selector, identical on client and server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSelector {
    spread: usize,
}

impl BucketSelector {
    /// Create a selector placing each element in `spread` buckets.
    ///
    /// # Preconditions
    /// - `spread` must be at least 1
    pub fn new(spread: usize) -> Self {
        Self {
            spread: spread.max(1),
        }
    }

    pub fn spread(&self) -> usize {
        self.spread
    }

    /// Distinct bucket indices for `item` among `bucket_count` buckets.
    pub fn select(&self, item: &[u8], bucket_count: usize) -> Vec<usize> {
        if bucket_count == 0 {
            return Vec::new();
        }

        let wanted = self.spread.min(bucket_count);
        let mut buckets = Vec::with_capacity(wanted);
        let mut pad: u32 = 0;

        while buckets.len() < wanted {
            let mut hasher = Blake2b::<U32>::new();
            hasher.update(item);
            hasher.update(pad.to_be_bytes());
            let hash = hasher.finalize();

            let mut prefix = [0u8; 8];
            prefix.copy_from_slice(&hash[..8]);
            let index = (u64::from_be_bytes(prefix) % bucket_count as u64) as usize;

            if !buckets.contains(&index) {
                buckets.push(index);
            }
            pad = pad.wrapping_add(1);
        }

        buckets
    }
}

impl Default for BucketSelector {
    fn default() -> Self {
        Self::new(DEFAULT_SPREAD)
    }
}

/// Checksum stored alongside the xored content of a bucket.
pub fn checksum(item: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(item);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_is_deterministic() {
        let selector = BucketSelector::default();
        assert_eq!(selector.select(b"point", 64), selector.select(b"point", 64));
    }

    #[test]
    fn test_select_distinct_buckets() {
        let selector = BucketSelector::default();
        let buckets = selector.select(b"some element", 8);
        assert_eq!(buckets.len(), 3);
        assert!(buckets.iter().all(|b| *b < 8));
        let mut sorted = buckets.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 3);
    }

    #[test]
    fn test_select_fewer_buckets_than_spread() {
        let selector = BucketSelector::default();
        assert_eq!(selector.select(b"x", 1), vec![0]);
        let mut two = selector.select(b"x", 2);
        two.sort_unstable();
        assert_eq!(two, vec![0, 1]);
    }

    #[test]
    fn test_checksum_differs() {
        assert_ne!(checksum(b"a"), checksum(b"b"));
    }
}
