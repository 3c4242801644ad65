//! Set reconciliation by digest peeling.
//!
//! The resolver asks the remote for a digest at level 0, subtracts a digest
//! of the local confirmed points built the same way, and peels the result.
//! When peeling fails the buckets were too crowded, so the level goes up by
//! one (twice the buckets) and the exchange is repeated. The amount of data
//! transferred therefore grows with the size of the difference, not with
//! the size of either set. A remote with no digest for a level answers with
//! its full content, which is compared directly.

use tracing::debug;

use tracesync_common::{decode, encode, Error, Point, Result, POINT_LEN};
use tracesync_digest::{Difference, Digest, Summary};
use tracesync_remote::RemoteSummarizer;

/// Default escalation ceiling.
pub const DEFAULT_MAX_LEVEL: u32 = 20;

/// Hard cap on the configurable ceiling; a digest at this level already
/// holds sixteen million buckets.
const LEVEL_LIMIT: u32 = 24;

/// Outcome of a reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Points to add to and remove from the local confirmed set.
    pub difference: Difference<Point>,
    /// Level at which reconciliation succeeded.
    pub level: u32,
    /// Whether the remote answered with its full content.
    pub full_content: bool,
}

/// Computes the difference between local and remote confirmed points.
#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    max_level: u32,
}

impl Resolver {
    /// Create a resolver that gives up above `max_level`.
    pub fn new(max_level: u32) -> Self {
        Self {
            max_level: max_level.min(LEVEL_LIMIT),
        }
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Reconcile `local` (the confirmed points only) with the remote.
    ///
    /// # Postconditions
    /// - Removing `difference.removed` from `local` and then adding
    ///   `difference.added` yields the remote confirmed set
    ///
    /// # Errors
    /// - `EscalationLimit` if no level up to the ceiling peels cleanly
    /// - `Encoding` if a recovered element is not a valid point
    /// - `Protocol` if the remote digest has the wrong size
    /// - Any error from the remote
    pub async fn resolve<R>(&self, local: &[Point], remote: &R) -> Result<Resolution>
    where
        R: RemoteSummarizer + ?Sized,
    {
        let encoded: Vec<[u8; POINT_LEN]> = local.iter().map(encode).collect();

        for level in 0..=self.max_level {
            match remote.summarize(level).await? {
                Summary::FullContent(content) => {
                    debug!(
                        "Comparing {} local points with full remote content of {}",
                        encoded.len(),
                        content.len()
                    );
                    let difference = content.difference(encoded.iter().map(|e| e.as_slice()));
                    return Self::finish(difference, level, true);
                }
                Summary::Digest(remote_digest) => {
                    let mut local_digest = R::Digest::with_level(level);
                    for item in &encoded {
                        local_digest.insert(item);
                    }

                    match remote_digest.subtract(&local_digest)?.peel() {
                        Some(difference) => return Self::finish(difference, level, false),
                        None => debug!("Digest at level {} is ambiguous, escalating", level),
                    }
                }
            }
        }

        Err(Error::EscalationLimit(self.max_level))
    }

    fn finish(difference: Difference<Vec<u8>>, level: u32, full_content: bool) -> Result<Resolution> {
        let difference = difference.try_map(|item| decode(&item))?;
        debug!(
            "Resolved at level {}: {} added, {} removed",
            level,
            difference.added.len(),
            difference.removed.len()
        );

        Ok(Resolution {
            difference,
            level,
            full_content,
        })
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LEVEL)
    }
}
