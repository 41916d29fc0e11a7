//! JSON-lines file publisher
//!
//! Appends one serialized event per line. A single write per batch, guarded
//! by a mutex, keeps lines from concurrent pollers from interleaving.

use super::{PublishReport, Publisher};
use crate::error::PublishError;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tuneflow_common::events::PlaybackEvent;

pub struct JsonLinesPublisher {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesPublisher {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Publisher for JsonLinesPublisher {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn publish_batch(&self, events: &[PlaybackEvent]) -> Result<PublishReport, PublishError> {
        if events.is_empty() {
            return Ok(PublishReport::default());
        }

        let mut buffer = String::new();
        for event in events {
            buffer.push_str(&serde_json::to_string(event)?);
            buffer.push('\n');
        }

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;

        Ok(PublishReport::all_delivered(events.len()))
    }
}
