//! Fetch client for the JSON talk index.

use crate::error::{FetchError, Result};
use crate::types::FeedTalk;
use tracing::debug;

/// Fetches the upstream talk index
pub struct FeedClient {
    /// HTTP client shared with the other components
    http: reqwest::Client,
    /// URL of the JSON index
    url: String,
}

impl FeedClient {
    /// Create a feed client for the given index URL
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    /// Fetch and decode the talk index
    ///
    /// Non-success statuses and undecodable bodies are fetch errors; the
    /// caller decides whether the pass can proceed without an index (it
    /// cannot).
    pub async fn fetch_talks(&self) -> Result<Vec<FeedTalk>> {
        debug!("Fetching talk index: {}", self.url);

        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&self.url, &e))?;

        // Check HTTP status before trying to parse the response body
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            }
            .into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(&self.url, &e))?;

        let talks: Vec<FeedTalk> = serde_json::from_str(&body).map_err(|e| FetchError::Parse {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;

        debug!("Feed returned {} talk records", talks.len());
        Ok(talks)
    }
}
