//! Client configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use tracesync_remote::{Password, RemoteConfig};
use tracesync_sync::SyncConfig;

/// Environment variable overriding the configured password.
pub const PASSWORD_ENV: &str = "TRACESYNC_PASSWORD";

/// Everything a client needs: where points live and how to reach the remote.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    /// SQLite database; defaults to the platform data directory.
    pub store_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Load from a JSON file, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&json)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            config.remote.password = Password::new(password);
        }

        Ok(config)
    }

    /// Resolved location of the point database.
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => {
                let data_dir = dirs::data_dir().context("No data directory on this platform")?;
                Ok(data_dir.join("tracesync").join("points.db"))
            }
        }
    }

    /// Where the sync status is saved between runs.
    pub fn state_path(&self) -> Result<PathBuf> {
        Ok(self.store_path()?.with_extension("state.json"))
    }
}
