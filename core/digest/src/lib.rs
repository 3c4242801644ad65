//! Set reconciliation digests for TraceSync.
//!
//! This module provides:
//! - The [`Digest`] capability (subtract, peel) the resolver relies on
//! - An invertible bloom filter implementation sized by level
//! - The deterministic bucket selector shared with the server
//! - The full-content listing the server falls back to
//!
//! Elements are opaque byte strings. Every element folded into one digest
//! is expected to have the same width (points are always 24 bytes).

pub mod difference;
pub mod full_content;
pub mod ibf;
pub mod selector;

pub use difference::{Difference, Digest, Summary};
pub use full_content::FullContent;
pub use ibf::Ibf;
pub use selector::BucketSelector;
