//! TraceSync Sync Engine
//!
//! This module reconciles a local, possibly offline point store with a
//! remote store, including:
//! - Push of locally recorded points with one re-login on session expiry
//! - Pull of the add/remove delta through digest peeling with level escalation
//! - Serialized sync cycles, on demand and periodic
//! - Store change notifications for observers

pub mod engine;
pub mod events;
pub mod resolver;
pub mod scheduler;
pub mod state;

// Re-export main types
pub use engine::{SyncConfig, SyncEngine};
pub use events::StoreEvent;
pub use resolver::{Resolution, Resolver, DEFAULT_MAX_LEVEL};
pub use scheduler::{
    SyncMode, SyncReport, SyncRequest, SyncScheduler, SyncSchedulerHandle, DEFAULT_SYNC_INTERVAL,
};
pub use state::{SyncPhase, SyncState};
