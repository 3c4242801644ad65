//! Document database remote over HTTP.
//!
//! This module provides:
//! - Cookie session handling with explicit re-login
//! - Point writes as JSON documents
//! - Summary queries against the `summary` view, falling back to the
//!   `fullcontent` list when the view has no row for a level

pub mod client;
pub mod session;

pub use client::HttpRemote;
pub use session::Session;
