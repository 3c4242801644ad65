//! Cookie session state.

use reqwest::header::{HeaderMap, SET_COOKIE};
use tokio::sync::RwLock;

/// Session credential shared by every request of one remote.
#[derive(Debug, Default)]
pub struct Session {
    cookie: RwLock<Option<String>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current `Cookie` header value, if logged in.
    pub async fn cookie(&self) -> Option<String> {
        self.cookie.read().await.clone()
    }

    /// Store the session cookie from a login response.
    ///
    /// Returns false if the response carried no cookie.
    pub async fn update_from_headers(&self, headers: &HeaderMap) -> bool {
        let cookie = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .map(str::trim)
            .find(|pair| !pair.is_empty());

        match cookie {
            Some(pair) => {
                *self.cookie.write().await = Some(pair.to_string());
                true
            }
            None => false,
        }
    }

    /// Forget the session.
    pub async fn clear(&self) {
        *self.cookie.write().await = None;
    }
}
