//! Event publishers
//!
//! A publisher is the durable-ingestion seam: it accepts an ordered batch of
//! events and reports success or failure per record. Retry and backoff live
//! here, never in the deriver.
//!
//! Implementations:
//! - [`HttpPublisher`]: batched POST to an ingestion endpoint, with retries
//! - [`JsonLinesPublisher`]: append-only local file
//! - [`LogPublisher`]: dry run

mod http;
mod jsonl;
mod log;

pub use self::http::{HttpPublisher, RetryPolicy};
pub use self::jsonl::JsonLinesPublisher;
pub use self::log::LogPublisher;

use crate::error::{Error, PublishError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tuneflow_common::config::SinkConfig;
use tuneflow_common::events::PlaybackEvent;

/// Delivery outcome for one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Delivered,
    Failed { reason: String },
}

impl RecordOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, RecordOutcome::Delivered)
    }
}

/// Per-record outcomes of a batch publish, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub outcomes: Vec<RecordOutcome>,
}

impl PublishReport {
    /// Report with every one of `count` records delivered
    pub fn all_delivered(count: usize) -> Self {
        Self {
            outcomes: vec![RecordOutcome::Delivered; count],
        }
    }

    pub fn delivered_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.delivered_count()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed_count() == 0
    }

    /// Reasons of the failed records, with their batch index
    pub fn failures(&self) -> impl Iterator<Item = (usize, &str)> {
        self.outcomes.iter().enumerate().filter_map(|(i, o)| match o {
            RecordOutcome::Failed { reason } => Some((i, reason.as_str())),
            RecordOutcome::Delivered => None,
        })
    }
}

/// Durable ingestion transport
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Publish an ordered batch
    ///
    /// `Err` means the batch as a whole could not be attempted; per-record
    /// rejection is reported through [`PublishReport`].
    async fn publish_batch(
        &self,
        events: &[PlaybackEvent],
    ) -> std::result::Result<PublishReport, PublishError>;

    /// Publish a single event
    async fn publish(&self, event: &PlaybackEvent) -> std::result::Result<(), PublishError> {
        let report = self.publish_batch(std::slice::from_ref(event)).await?;
        match report.outcomes.into_iter().next() {
            Some(RecordOutcome::Delivered) => Ok(()),
            Some(RecordOutcome::Failed { reason }) => Err(PublishError::Rejected(reason)),
            None => Err(PublishError::Rejected(
                "publisher returned no outcome for record".to_string(),
            )),
        }
    }
}

/// Build the publisher for a configured sink
pub fn from_config(sink: &SinkConfig) -> Result<Arc<dyn Publisher>> {
    Ok(match sink {
        SinkConfig::Http(http) => Arc::new(
            HttpPublisher::new(
                &http.endpoint,
                RetryPolicy::from(http),
                Duration::from_secs(http.request_timeout_secs),
            )
            .map_err(|e| Error::Config(format!("Failed to build HTTP publisher: {}", e)))?,
        ),
        SinkConfig::Jsonl { path } => Arc::new(JsonLinesPublisher::new(path.clone())),
        SinkConfig::Log => Arc::new(LogPublisher::new()),
    })
}
