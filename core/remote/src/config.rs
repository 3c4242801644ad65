//! Remote connection configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Password that zeroizes on drop and never prints.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password([REDACTED])")
    }
}

/// Configuration for the HTTP remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Server root, e.g. `http://localhost:5984/`.
    pub base_url: String,
    /// Database holding the points.
    pub database: String,
    /// Design document providing the summary view and listing.
    pub design: String,
    /// Session user.
    pub username: String,
    /// Session password.
    pub password: Password,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5984/".to_string(),
            database: "trace".to_string(),
            design: "sync".to_string(),
            username: String::new(),
            password: Password::default(),
            timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_redacted() {
        let config = RemoteConfig {
            password: Password::new("hunter2"),
            ..RemoteConfig::default()
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RemoteConfig =
            serde_json::from_str(r#"{"base_url": "https://db.example.org/", "username": "me"}"#)
                .unwrap();
        assert_eq!(config.database, "trace");
        assert_eq!(config.design, "sync");
        assert_eq!(config.username, "me");
        assert!(config.password.is_empty());
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }
}
