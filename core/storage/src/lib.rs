//! Local point storage for TraceSync.
//!
//! This module provides a trait-based interface over the durable key-value
//! store that holds recorded points on the client, each tagged pending or
//! confirmed.
//!
//! # Design Principles
//! - Synchronous operations: the store is only touched from the sync timeline
//! - Timestamp identity: at most one record per timestamp
//! - Snapshot listings: listing returns a copy that later writes do not affect

pub mod memory;
pub mod sqlite;
pub mod store;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::LocalStore;
