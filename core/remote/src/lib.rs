//! Remote point store access for TraceSync.
//!
//! This module provides the two capabilities the sync engine needs from
//! the server (writing points, summarizing the confirmed set at a level)
//! and two implementations:
//! - `HttpRemote`: the document database over HTTP with cookie sessions
//! - `MemoryRemote`: an in-process server with the same summary rules,
//!   used in tests and demos

pub mod config;
pub mod http;
pub mod memory;
pub mod provider;

pub use config::{Password, RemoteConfig};
pub use http::HttpRemote;
pub use memory::{MemoryRemote, DEFAULT_MAX_SUMMARY_LEVEL};
pub use provider::{RemoteStore, RemoteSummarizer};
