//! Event router
//!
//! Sends each event to the publisher for its `processing_path`. Batches are
//! split into a hot and a cold sub-batch; relative order inside each path is
//! preserved and an empty sub-batch is never published.

use crate::error::{Error, PublishError, Result};
use crate::publish::{self, PublishReport, Publisher};
use std::sync::Arc;
use tracing::debug;
use tuneflow_common::config::SinksConfig;
use tuneflow_common::events::{PlaybackEvent, ProcessingPath};

/// Outcome of routing one batch
#[derive(Debug, Default)]
pub struct RoutingReport {
    /// Hot sub-batch result; `None` when no event was hot
    pub hot: Option<std::result::Result<PublishReport, PublishError>>,
    /// Cold sub-batch result; `None` when no event was cold
    pub cold: Option<std::result::Result<PublishReport, PublishError>>,
}

impl RoutingReport {
    /// Records confirmed delivered across both paths
    pub fn delivered_count(&self) -> usize {
        [&self.hot, &self.cold]
            .into_iter()
            .flatten()
            .filter_map(|r| r.as_ref().ok())
            .map(PublishReport::delivered_count)
            .sum()
    }

    /// True when every routed record was delivered
    pub fn is_complete_success(&self) -> bool {
        [&self.hot, &self.cold]
            .into_iter()
            .flatten()
            .all(|r| matches!(r, Ok(report) if report.is_complete_success()))
    }
}

/// Hot/cold fan-out over two publishers
#[derive(Clone)]
pub struct EventRouter {
    hot: Arc<dyn Publisher>,
    cold: Arc<dyn Publisher>,
}

impl EventRouter {
    pub fn new(hot: Arc<dyn Publisher>, cold: Arc<dyn Publisher>) -> Self {
        Self { hot, cold }
    }

    /// Route both paths through the same publisher
    pub fn single(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            hot: Arc::clone(&publisher),
            cold: publisher,
        }
    }

    /// Build publishers from sink configuration
    ///
    /// Without a `cold` sink, cold events share the hot publisher.
    pub fn from_config(sinks: &SinksConfig) -> Result<Self> {
        let hot = publish::from_config(&sinks.hot)?;
        let cold = match &sinks.cold {
            Some(cold) => publish::from_config(cold)?,
            None => Arc::clone(&hot),
        };
        Ok(Self::new(hot, cold))
    }

    /// Publisher serving `path`
    pub fn publisher_for(&self, path: ProcessingPath) -> &Arc<dyn Publisher> {
        match path {
            ProcessingPath::Hot => &self.hot,
            ProcessingPath::Cold => &self.cold,
        }
    }

    /// Publish one event on its path
    pub async fn dispatch(&self, event: &PlaybackEvent) -> Result<()> {
        let publisher = self.publisher_for(event.processing_path);
        debug!(
            track_id = %event.track_id,
            path = %event.processing_path,
            publisher = publisher.name(),
            "Dispatching event"
        );
        publisher.publish(event).await.map_err(Error::from)
    }

    /// Publish an ordered batch, split by path
    pub async fn route(&self, events: &[PlaybackEvent]) -> RoutingReport {
        let (hot, cold): (Vec<PlaybackEvent>, Vec<PlaybackEvent>) = events
            .iter()
            .cloned()
            .partition(|e| e.processing_path == ProcessingPath::Hot);

        let mut report = RoutingReport::default();
        if !hot.is_empty() {
            report.hot = Some(self.hot.publish_batch(&hot).await);
        }
        if !cold.is_empty() {
            report.cold = Some(self.cold.publish_batch(&cold).await);
        }
        report
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("hot", &self.hot.name())
            .field("cold", &self.cold.name())
            .finish()
    }
}
