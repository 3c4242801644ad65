//! Common utilities and types shared across TraceSync modules.
//!
//! This module provides the point model, its fixed-width binary codec and
//! the error type used by every other crate in the workspace.

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{decode, encode, MAX_EXACT_TIMESTAMP, POINT_LEN};
pub use error::{Error, Result};
pub use types::{Point, PointRecord, StoredValue};
