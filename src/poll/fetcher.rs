use crate::config::types::ApiConfig;
use crate::entry::LogEntry;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("API returned error status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl FetchError {
    /// Fatal errors end a polling session without retry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotAuthenticated(_) | Self::NotFound(_))
    }

    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => Self::NotAuthenticated(message),
            404 => Self::NotFound(message),
            _ => Self::Status { status, message },
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// One page of the live-tail API.
#[derive(Debug, Clone, Default)]
pub struct LogPage {
    pub entries: Vec<LogEntry>,
    pub next_token: Option<String>,
}

/// Paginated source of recent log entries.
///
/// Implementations return entries in ascending time order within a page.
/// Empty `region`/`instance` mean no filter.
#[async_trait]
pub trait LogFetcher: Send + Sync {
    async fn fetch(
        &self,
        app_name: &str,
        token: &str,
        region: &str,
        instance: &str,
    ) -> Result<LogPage, FetchError>;
}

/// `LogFetcher` backed by the platform's REST logs endpoint.
#[derive(Debug)]
pub struct HttpLogFetcher {
    base_url: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl HttpLogFetcher {
    pub fn new(config: &ApiConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn logs_url(&self, app_name: &str) -> String {
        format!("{}/api/v1/apps/{}/logs", self.base_url, app_name)
    }
}

#[async_trait]
impl LogFetcher for HttpLogFetcher {
    async fn fetch(
        &self,
        app_name: &str,
        token: &str,
        region: &str,
        instance: &str,
    ) -> Result<LogPage, FetchError> {
        let mut query = vec![("next_token", token)];
        if !instance.is_empty() {
            query.push(("instance", instance));
        }
        if !region.is_empty() {
            query.push(("region", region));
        }

        let mut request = self.client.get(self.logs_url(app_name)).query(&query);
        if let Some(access_token) = &self.access_token {
            request = request.bearer_auth(access_token);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(FetchError::from_status(
                response.status().as_u16(),
                response.text().await.unwrap_or_default(),
            ));
        }

        let body: LogsResponse = response.json().await?;
        Ok(body.into_page())
    }
}

// ===== Response Types =====

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LogsResponse {
    data: Vec<LogsResponseItem>,
    meta: LogsResponseMeta,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LogsResponseItem {
    attributes: LogEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LogsResponseMeta {
    next_token: String,
}

impl LogsResponse {
    fn into_page(self) -> LogPage {
        let next_token = Some(self.meta.next_token).filter(|t| !t.is_empty());
        LogPage {
            entries: self.data.into_iter().map(|item| item.attributes).collect(),
            next_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fetcher_constructs_logs_url() {
        let config = ApiConfig {
            base_url: "http://localhost:4000/".to_string(),
            access_token: Some("secret".to_string()),
            timeout: Duration::from_secs(5),
        };

        let fetcher = HttpLogFetcher::new(&config).unwrap();
        assert_eq!(fetcher.base_url(), "http://localhost:4000");
        assert_eq!(
            fetcher.logs_url("web"),
            "http://localhost:4000/api/v1/apps/web/logs"
        );
    }

    #[test]
    fn test_status_classification() {
        assert!(FetchError::from_status(401, String::new()).is_fatal());
        assert!(FetchError::from_status(404, String::new()).is_fatal());

        let server_error = FetchError::from_status(503, "unavailable".to_string());
        assert!(!server_error.is_fatal());
        assert!(matches!(server_error, FetchError::Status { status: 503, .. }));

        assert!(!FetchError::Transport("connection reset".to_string()).is_fatal());
    }

    #[test]
    fn test_response_into_page() {
        let json = r#"{
            "data": [
                {"id": "1", "attributes": {"timestamp": "2025-03-01T12:00:00Z", "message": "a"}},
                {"id": "2", "attributes": {"timestamp": "2025-03-01T12:00:01Z", "message": "b"}}
            ],
            "meta": {"next_token": "abc"}
        }"#;
        let response: LogsResponse = serde_json::from_str(json).unwrap();
        let page = response.into_page();

        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[1].message, "b");
        assert_eq!(page.next_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_empty_next_token_is_none() {
        let response: LogsResponse = serde_json::from_str(r#"{"data": []}"#).unwrap();
        let page = response.into_page();
        assert!(page.entries.is_empty());
        assert!(page.next_token.is_none());
    }
}
