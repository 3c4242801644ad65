//! Remote capability traits.

use async_trait::async_trait;

use tracesync_common::{Point, Result};
use tracesync_digest::{Digest, Summary};

/// Source of set summaries for the remote confirmed points.
#[async_trait]
pub trait RemoteSummarizer: Send + Sync {
    /// Digest structure produced by this remote.
    type Digest: Digest + Send;

    /// Summarize the remote confirmed set at `level`.
    ///
    /// # Postconditions
    /// - Returns a digest with `2^level` buckets, or the full content
    ///   listing when the remote has no aggregate for this level
    ///
    /// # Errors
    /// - `AuthExpired` if the session was rejected
    /// - Network errors
    /// - Protocol errors for malformed responses
    async fn summarize(&self, level: u32) -> Result<Summary<Self::Digest>>;
}

/// Full remote store: summaries plus authenticated writes.
#[async_trait]
pub trait RemoteStore: RemoteSummarizer {
    /// Get the remote name (e.g., "http", "memory").
    fn name(&self) -> &str;

    /// Write a new point.
    ///
    /// # Postconditions
    /// - On success the point is durably stored remotely
    ///
    /// # Errors
    /// - `AuthExpired` if the session was rejected
    /// - Network errors for any other failure
    async fn push(&self, point: &Point) -> Result<()>;

    /// Establish a new session.
    ///
    /// # Errors
    /// - `Authentication` if the credentials were refused
    /// - Network errors
    async fn login(&self) -> Result<()>;
}
