//! Invertible bloom filter.
//!
//! Each bucket keeps a signed element count, the xor of the elements and
//! the xor of their checksums. Subtracting two filters cancels common
//! elements; a bucket holding exactly one element (count of +1 or -1 and a
//! matching checksum) is pure and can be peeled, which may in turn make
//! other buckets pure.
//!
//! On the wire a filter is a JSON array of buckets, each bucket being
//! `[count, base64(xored), base64(hashed)]`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use tracesync_common::{Error, Result};

use crate::difference::{Difference, Digest};
use crate::selector::{checksum, BucketSelector};

type WireBucket = (i64, String, String);

/// Largest element count a bucket received from the wire may claim.
const MAX_BUCKET_ITEMS: u64 = 1 << 48;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bucket {
    items: i64,
    xored: Vec<u8>,
    hashed: [u8; 32],
}

impl Bucket {
    fn empty() -> Self {
        Self {
            items: 0,
            xored: Vec::new(),
            hashed: [0u8; 32],
        }
    }

    fn apply(&mut self, item: &[u8], hash: &[u8; 32], count: i64) {
        self.items = self.items.saturating_add(count);
        xor_into(&mut self.xored, item);
        for (dst, src) in self.hashed.iter_mut().zip(hash.iter()) {
            *dst ^= src;
        }
    }

    fn is_pure(&self) -> bool {
        (self.items == 1 || self.items == -1) && checksum(&self.xored) == self.hashed
    }

    fn is_empty(&self) -> bool {
        self.items == 0
            && self.xored.iter().all(|b| *b == 0)
            && self.hashed.iter().all(|b| *b == 0)
    }
}

fn xor_into(dst: &mut Vec<u8>, src: &[u8]) {
    if dst.len() < src.len() {
        dst.resize(src.len(), 0);
    }
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d ^= s;
    }
}

/// Invertible bloom filter with `2^level` buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<WireBucket>", try_from = "Vec<WireBucket>")]
pub struct Ibf {
    buckets: Vec<Bucket>,
    selector: BucketSelector,
}

impl Ibf {
    /// Level of this filter (log2 of its bucket count).
    pub fn level(&self) -> u32 {
        self.buckets.len().trailing_zeros()
    }

    /// Number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Build a filter at `level` over a set of elements.
    pub fn from_items<'a, I>(level: u32, items: I) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut ibf = Self::with_level(level);
        for item in items {
            ibf.insert(item);
        }
        ibf
    }

    fn add(&mut self, item: &[u8], count: i64) {
        let hash = checksum(item);
        for index in self.selector.select(item, self.buckets.len()) {
            self.buckets[index].apply(item, &hash, count);
        }
    }

    /// Parse a filter from its JSON wire form.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

impl Digest for Ibf {
    fn with_level(level: u32) -> Self {
        Self {
            buckets: vec![Bucket::empty(); 1usize << level],
            selector: BucketSelector::default(),
        }
    }

    fn insert(&mut self, item: &[u8]) {
        self.add(item, 1);
    }

    fn subtract(&self, other: &Self) -> Result<Self> {
        if self.buckets.len() != other.buckets.len() {
            return Err(Error::Protocol(format!(
                "Cannot subtract a digest of {} buckets from one of {}",
                other.buckets.len(),
                self.buckets.len()
            )));
        }

        let mut result = self.clone();
        for (bucket, theirs) in result.buckets.iter_mut().zip(other.buckets.iter()) {
            bucket.apply(&theirs.xored, &theirs.hashed, theirs.items.saturating_neg());
        }
        Ok(result)
    }

    fn peel(&self) -> Option<Difference<Vec<u8>>> {
        let mut work = self.buckets.clone();
        let mut difference = Difference::new();

        // Every genuine peel removes one element; anything beyond this
        // means a checksum collision fooled the purity test.
        let budget = work
            .iter()
            .map(|b| usize::try_from(b.items.unsigned_abs()).unwrap_or(usize::MAX))
            .fold(work.len(), usize::saturating_add);
        let mut steps = 0;

        let mut candidates: Vec<usize> = (0..work.len()).filter(|&i| work[i].is_pure()).collect();

        while let Some(index) = candidates.pop() {
            if !work[index].is_pure() {
                continue;
            }
            steps += 1;
            if steps > budget {
                return None;
            }

            let sign = work[index].items;
            let item = work[index].xored.clone();
            let hash = checksum(&item);

            for target in self.selector.select(&item, work.len()) {
                work[target].apply(&item, &hash, -sign);
                if work[target].is_pure() {
                    candidates.push(target);
                }
            }

            if sign > 0 {
                difference.added.push(item);
            } else {
                difference.removed.push(item);
            }
        }

        if work.iter().all(Bucket::is_empty) {
            Some(difference)
        } else {
            None
        }
    }
}

impl From<Ibf> for Vec<WireBucket> {
    fn from(ibf: Ibf) -> Self {
        ibf.buckets
            .into_iter()
            .map(|b| (b.items, STANDARD.encode(&b.xored), STANDARD.encode(b.hashed)))
            .collect()
    }
}

impl TryFrom<Vec<WireBucket>> for Ibf {
    type Error = Error;

    fn try_from(wire: Vec<WireBucket>) -> Result<Self> {
        if wire.is_empty() || !wire.len().is_power_of_two() {
            return Err(Error::Protocol(format!(
                "Digest bucket count {} is not a power of two",
                wire.len()
            )));
        }

        let buckets = wire
            .into_iter()
            .map(|(items, xored, hashed)| {
                if items.unsigned_abs() > MAX_BUCKET_ITEMS {
                    return Err(Error::Protocol(format!(
                        "Bucket count {} is out of range",
                        items
                    )));
                }
                let xored = STANDARD
                    .decode(xored)
                    .map_err(|e| Error::Protocol(format!("Invalid bucket content: {}", e)))?;
                let hashed = STANDARD
                    .decode(hashed)
                    .map_err(|e| Error::Protocol(format!("Invalid bucket checksum: {}", e)))?;

                let mut checksum = [0u8; 32];
                match hashed.len() {
                    0 => {}
                    32 => checksum.copy_from_slice(&hashed),
                    n => {
                        return Err(Error::Protocol(format!(
                            "Bucket checksum has {} bytes, expected 32",
                            n
                        )))
                    }
                }

                Ok(Bucket {
                    items,
                    xored,
                    hashed: checksum,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            buckets,
            selector: BucketSelector::default(),
        })
    }
}
