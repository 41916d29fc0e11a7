//! Dry-run publisher: logs events instead of delivering them

use super::{PublishReport, Publisher};
use crate::error::PublishError;
use async_trait::async_trait;
use tracing::info;
use tuneflow_common::events::PlaybackEvent;

#[derive(Debug, Default)]
pub struct LogPublisher;

impl LogPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Publisher for LogPublisher {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish_batch(&self, events: &[PlaybackEvent]) -> Result<PublishReport, PublishError> {
        for event in events {
            info!(
                user_id = %event.user_id,
                track_id = %event.track_id,
                status = %event.status,
                listened_secs = event.duration_listened_seconds,
                path = %event.processing_path,
                "[dry-run] {}",
                serde_json::to_string(event)?
            );
        }
        Ok(PublishReport::all_delivered(events.len()))
    }
}
