//! Spotify Web API client
//!
//! - `GET {base}/me` for the user id
//! - `GET {base}/me/player/currently-playing` for snapshots
//!
//! Status mapping for polls:
//! - 200 with JSON → `Some(body)`; 200 with a non-JSON body → `Some(Null)`,
//!   which the normalizer turns into an empty snapshot
//! - 204 or empty body → `None` (nothing playing)
//! - 429 → [`PollError::RateLimited`] honoring `Retry-After`
//! - 401/403 → [`PollError::Unauthorized`]
//! - anything else → [`PollError::Status`]

use super::NowPlayingSource;
use crate::error::PollError;
use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// User-Agent sent with every request
const USER_AGENT: &str = concat!("tuneflow-tracker/", env!("CARGO_PKG_VERSION"));

/// Spotify client bound to one user's bearer token
pub struct SpotifyClient {
    http_client: Client,
    base_url: String,
    access_token: String,
}

impl SpotifyClient {
    /// Create a client for `base_url` (e.g. `https://api.spotify.com/v1`)
    pub fn new(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http_client: Client::builder()
                .user_agent(USER_AGENT)
                .timeout(request_timeout)
                .build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    async fn get(&self, path: &str) -> Result<Response, PollError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Querying upstream");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => PollError::RateLimited {
                retry_after: parse_retry_after(response.headers()),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PollError::Unauthorized {
                status: status.as_u16(),
            },
            _ => PollError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            },
        })
    }
}

/// `Retry-After` in delta-seconds form
fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl NowPlayingSource for SpotifyClient {
    async fn current_user_id(&self) -> Result<String, PollError> {
        let response = self.get("/me").await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| PollError::Transport(format!("Failed to read /me response: {}", e)))?;

        body.get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| PollError::MissingField("id".to_string()))
    }

    async fn poll(&self) -> Result<Option<Value>, PollError> {
        let response = self.get("/me/player/currently-playing").await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let text = response
            .text()
            .await
            .map_err(|e| PollError::Transport(format!("Failed to read snapshot body: {}", e)))?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        match serde_json::from_str(&text) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(error = %e, "Upstream returned a non-JSON snapshot; treating as empty");
                Ok(Some(Value::Null))
            }
        }
    }
}
