//! Sync state tracking and persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tracesync_common::{Error, Result};

/// Phase of the sync cycle currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncPhase {
    /// No cycle in progress.
    Idle,
    /// Writing pending points to the remote.
    Pushing,
    /// Reconciling confirmed points with the remote.
    Pulling,
}

/// Observable state of the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    /// Current phase.
    pub phase: SyncPhase,
    /// When the last successful cycle finished.
    pub last_success: Option<DateTime<Utc>>,
    /// When the last failed cycle finished.
    pub last_failure: Option<DateTime<Utc>>,
    /// Error message of the last failed cycle.
    pub last_error: Option<String>,
    /// Number of cycles that completed successfully.
    pub cycles_completed: u64,
    /// Number of cycles that failed.
    pub cycles_failed: u64,
}

impl SyncState {
    /// Create a new idle state.
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Idle,
            last_success: None,
            last_failure: None,
            last_error: None,
            cycles_completed: 0,
            cycles_failed: 0,
        }
    }

    /// Whether a cycle is running.
    pub fn is_busy(&self) -> bool {
        self.phase != SyncPhase::Idle
    }

    pub fn begin_push(&mut self) {
        self.phase = SyncPhase::Pushing;
    }

    pub fn begin_pull(&mut self) {
        self.phase = SyncPhase::Pulling;
    }

    /// Mark the running cycle as completed.
    pub fn finish_success(&mut self) {
        self.phase = SyncPhase::Idle;
        self.last_success = Some(Utc::now());
        self.cycles_completed += 1;
    }

    /// Mark the running cycle as failed.
    pub fn finish_failure(&mut self, error: impl Into<String>) {
        self.phase = SyncPhase::Idle;
        self.last_failure = Some(Utc::now());
        self.last_error = Some(error.into());
        self.cycles_failed += 1;
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}
