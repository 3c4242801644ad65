//! HTTP remote client.

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use tracesync_common::{Error, Point, Result};
use tracesync_digest::{FullContent, Ibf, Summary};

use super::session::Session;
use crate::config::RemoteConfig;
use crate::provider::{RemoteStore, RemoteSummarizer};

/// One row of the summary view.
#[derive(Debug, Deserialize)]
struct ViewRow {
    value: serde_json::Value,
}

/// Response from querying a view.
#[derive(Debug, Deserialize)]
struct ViewResponse {
    rows: Vec<ViewRow>,
}

/// Body of a login request.
#[derive(Serialize)]
struct LoginRequest<'a> {
    name: &'a str,
    password: &'a str,
}

/// Body of a point write.
#[derive(Serialize)]
struct PointDocument {
    lat: f64,
    lng: f64,
    timestamp: i64,
}

/// Remote store backed by a document database over HTTP.
pub struct HttpRemote {
    http: Client,
    base: Url,
    config: RemoteConfig,
    session: Session,
}

impl HttpRemote {
    /// Create a new HTTP remote.
    ///
    /// # Errors
    /// - Invalid base URL
    /// - HTTP client construction failure
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base = Url::parse(&base_url)
            .map_err(|e| Error::InvalidInput(format!("Invalid base URL {}: {}", base_url, e)))?;

        let http = Client::builder()
            .user_agent("TraceSync/0.1")
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base,
            config,
            session: Session::new(),
        })
    }

    /// Get the session state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::InvalidInput(format!("Invalid URL path {}: {}", path, e)))
    }

    fn design_url(&self, path: &str) -> Result<Url> {
        self.url(&format!(
            "{}/_design/{}/{}",
            self.config.database, self.config.design, path
        ))
    }

    /// Attach the session cookie, if any.
    async fn authenticated(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.cookie().await {
            Some(cookie) => request.header(header::COOKIE, cookie),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self
            .authenticated(request)
            .await
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to {}: {}", what, e)))?;

        Self::check_status(response, what).await
    }

    /// Map non-success statuses onto the error taxonomy.
    async fn check_status(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::AuthExpired);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::Network(format!(
            "Failed to {}: {} - {}",
            what, status, body
        )))
    }

    async fn full_content(&self) -> Result<FullContent> {
        let url = self.design_url("_list/fullcontent/fullcontent")?;
        let response = self.send(self.http.get(url), "fetch full content").await?;

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Protocol(format!("Invalid full content response: {}", e)))?;
        FullContent::from_json(value)
    }
}

#[async_trait]
impl RemoteSummarizer for HttpRemote {
    type Digest = Ibf;

    async fn summarize(&self, level: u32) -> Result<Summary<Ibf>> {
        let url = self.design_url("_view/summary")?;
        let request = self.http.get(url).query(&[("key", level)]);
        let response = self.send(request, "fetch summary").await?;

        let view: ViewResponse = response
            .json()
            .await
            .map_err(|e| Error::Protocol(format!("Invalid summary response: {}", e)))?;

        match view.rows.into_iter().next() {
            Some(row) => {
                debug!("Received digest at level {}", level);
                Ok(Summary::Digest(Ibf::from_json(row.value)?))
            }
            None => {
                debug!("No digest at level {}, fetching full content", level);
                Ok(Summary::FullContent(self.full_content().await?))
            }
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    fn name(&self) -> &str {
        "http"
    }

    async fn push(&self, point: &Point) -> Result<()> {
        let url = self.url(&self.config.database)?;
        let document = PointDocument {
            lat: point.lat,
            lng: point.lng,
            timestamp: point.timestamp,
        };

        self.send(self.http.post(url).json(&document), "push point")
            .await?;
        Ok(())
    }

    async fn login(&self) -> Result<()> {
        let url = self.url("_session")?;
        let body = LoginRequest {
            name: &self.config.username,
            password: self.config.password.expose(),
        };

        info!("Logging in as {}", self.config.username);
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to log in: {}", e)))?;

        let response = match Self::check_status(response, "log in").await {
            Err(Error::AuthExpired) => {
                self.session.clear().await;
                return Err(Error::Authentication("Credentials refused".to_string()));
            }
            other => other?,
        };

        if !self.session.update_from_headers(response.headers()).await {
            warn!("Login response carried no session cookie");
            return Err(Error::Authentication(
                "No session cookie in login response".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let remote = HttpRemote::new(RemoteConfig {
            base_url: "http://db.local:5984".to_string(),
            ..RemoteConfig::default()
        })
        .unwrap();

        assert_eq!(remote.url("trace").unwrap().as_str(), "http://db.local:5984/trace");
        assert_eq!(
            remote.design_url("_view/summary").unwrap().as_str(),
            "http://db.local:5984/trace/_design/sync/_view/summary"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = HttpRemote::new(RemoteConfig {
            base_url: "not a url".to_string(),
            ..RemoteConfig::default()
        });
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
