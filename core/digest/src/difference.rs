//! The digest contract and the differences it yields.

use tracesync_common::Result;

use crate::full_content::FullContent;

/// Elements present on one side of a comparison but not the other.
#[derive(Debug, Clone, PartialEq)]
pub struct Difference<T> {
    /// Present remotely, absent locally.
    pub added: Vec<T>,
    /// Present locally, absent remotely.
    pub removed: Vec<T>,
}

impl<T> Difference<T> {
    pub fn new() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// Check if both sides are empty.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Total number of differing elements.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }

    /// Convert every element, failing on the first conversion error.
    pub fn try_map<U, F>(self, mut f: F) -> Result<Difference<U>>
    where
        F: FnMut(T) -> Result<U>,
    {
        Ok(Difference {
            added: self.added.into_iter().map(&mut f).collect::<Result<_>>()?,
            removed: self.removed.into_iter().map(&mut f).collect::<Result<_>>()?,
        })
    }
}

impl<T> Default for Difference<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An invertible set summary partitioned into `2^level` buckets.
///
/// Implementations must be linear: summarizing `A` and subtracting the
/// summary of `B` gives the same digest as summarizing `A - B` with the
/// elements of `B \ A` counted negatively. The client and the server must
/// agree on the bucket selection for a given level.
pub trait Digest: Sized {
    /// An empty digest with `2^level` buckets.
    fn with_level(level: u32) -> Self;

    /// Fold one element in.
    fn insert(&mut self, item: &[u8]);

    /// Bucket-wise subtraction, `self - other`.
    ///
    /// # Errors
    /// - The two digests do not have the same number of buckets
    fn subtract(&self, other: &Self) -> Result<Self>;

    /// Recover the elements with a non-zero net count.
    ///
    /// Positive elements are reported as `added`, negative ones as
    /// `removed`. Returns `None` when buckets hold too many overlapping
    /// elements to separate.
    fn peel(&self) -> Option<Difference<Vec<u8>>>;
}

/// What a remote answers when asked for a summary at some level.
#[derive(Debug, Clone)]
pub enum Summary<D> {
    /// Aggregated digest at the requested level.
    Digest(D),
    /// No aggregate exists; the complete confirmed set instead.
    FullContent(FullContent),
}
