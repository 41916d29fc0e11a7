//! HTTP ingestion publisher
//!
//! Request body:
//! ```json
//! { "records": [ { "partition_key": "<user_id>", "data": { ...PlaybackEvent... } } ] }
//! ```
//!
//! A 2xx response may report per-record rejection, in request order:
//! ```json
//! { "failed_record_count": 1,
//!   "records": [ {}, { "error_code": "Throttled", "error_message": "slow down" } ] }
//! ```
//! An empty or non-JSON 2xx body means every record was accepted.
//!
//! Retries: transport errors, 429 and 5xx retry the whole pending set; after
//! a partial failure only the rejected records are resent. Backoff doubles
//! from `initial_backoff` up to `max_backoff`.

use super::{PublishReport, Publisher, RecordOutcome};
use crate::error::PublishError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use tuneflow_common::config::HttpSinkConfig;
use tuneflow_common::events::PlaybackEvent;

/// Retry schedule for one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl From<&HttpSinkConfig> for RetryPolicy {
    fn from(config: &HttpSinkConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

#[derive(Serialize)]
struct PutRecordsRequest<'a> {
    records: Vec<PutRecord<'a>>,
}

#[derive(Serialize)]
struct PutRecord<'a> {
    partition_key: &'a str,
    data: &'a PlaybackEvent,
}

#[derive(Deserialize, Default)]
struct PutRecordsResponse {
    #[serde(default)]
    failed_record_count: u64,
    #[serde(default)]
    records: Vec<PutRecordResult>,
}

#[derive(Deserialize, Default)]
struct PutRecordResult {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

/// Publisher POSTing batches to an ingestion endpoint
pub struct HttpPublisher {
    http_client: Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl HttpPublisher {
    /// Create a publisher for `endpoint`
    pub fn new(
        endpoint: impl Into<String>,
        retry: RetryPolicy,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http_client: Client::builder().timeout(request_timeout).build()?,
            endpoint: endpoint.into(),
            retry,
        })
    }

    /// One POST; returns a failure reason per record (None = accepted)
    async fn send(&self, batch: &[&PlaybackEvent]) -> Result<Vec<Option<String>>, PublishError> {
        let body = PutRecordsRequest {
            records: batch
                .iter()
                .map(|event| PutRecord {
                    partition_key: &event.user_id,
                    data: event,
                })
                .collect(),
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        // An unread body may hold per-record rejections; retry rather than assume success
        let text = response.text().await.map_err(|e| {
            PublishError::Transport(format!("Failed to read ingestion response: {}", e))
        })?;

        let parsed: PutRecordsResponse = if text.trim().is_empty() {
            PutRecordsResponse::default()
        } else {
            serde_json::from_str(&text).unwrap_or_default()
        };

        if parsed.failed_record_count == 0 {
            return Ok(vec![None; batch.len()]);
        }

        if parsed.records.len() != batch.len() {
            // Cannot tell which records failed; treat all as failed so they are retried
            let reason = format!(
                "{} record(s) failed but response listed {} result(s) for {} record(s)",
                parsed.failed_record_count,
                parsed.records.len(),
                batch.len()
            );
            return Ok(vec![Some(reason); batch.len()]);
        }

        Ok(parsed
            .records
            .into_iter()
            .map(|r| {
                r.error_code.map(|code| match r.error_message {
                    Some(message) => format!("{}: {}", code, message),
                    None => code,
                })
            })
            .collect())
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    fn name(&self) -> &str {
        "http"
    }

    async fn publish_batch(&self, events: &[PlaybackEvent]) -> Result<PublishReport, PublishError> {
        if events.is_empty() {
            return Ok(PublishReport::default());
        }

        let mut outcomes: Vec<Option<RecordOutcome>> = vec![None; events.len()];
        let mut pending: Vec<usize> = (0..events.len()).collect();
        let mut last_batch_error: Option<PublishError> = None;
        let mut any_record_level_result = false;

        for attempt in 1..=self.retry.max_attempts {
            if attempt > 1 {
                let delay = self.retry.backoff_for(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying publish");
                sleep(delay).await;
            }

            let batch: Vec<&PlaybackEvent> = pending.iter().map(|&i| &events[i]).collect();
            match self.send(&batch).await {
                Ok(results) => {
                    any_record_level_result = true;
                    last_batch_error = None;
                    let mut still_pending = Vec::new();
                    for (&index, result) in pending.iter().zip(results) {
                        match result {
                            None => outcomes[index] = Some(RecordOutcome::Delivered),
                            Some(reason) => {
                                outcomes[index] = Some(RecordOutcome::Failed { reason });
                                still_pending.push(index);
                            }
                        }
                    }
                    if !still_pending.is_empty() {
                        warn!(
                            endpoint = %self.endpoint,
                            attempt,
                            failed = still_pending.len(),
                            "Ingestion endpoint rejected records"
                        );
                    }
                    pending = still_pending;
                }
                Err(e) if e.is_retryable() => {
                    warn!(endpoint = %self.endpoint, attempt, error = %e, "Publish attempt failed");
                    last_batch_error = Some(e);
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint, error = %e, "Publish failed (not retryable)");
                    last_batch_error = Some(e);
                    break;
                }
            }

            if pending.is_empty() {
                break;
            }
        }

        if let Some(error) = last_batch_error {
            if !any_record_level_result {
                return Err(error);
            }
            let reason = error.to_string();
            for &index in &pending {
                outcomes[index] = Some(RecordOutcome::Failed {
                    reason: reason.clone(),
                });
            }
        }

        Ok(PublishReport {
            outcomes: outcomes
                .into_iter()
                .map(|o| {
                    o.unwrap_or(RecordOutcome::Failed {
                        reason: "record was never attempted".to_string(),
                    })
                })
                .collect(),
        })
    }
}
