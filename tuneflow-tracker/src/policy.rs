//! Processing path policies
//!
//! A policy looks at a fully-built event and decides which delivery path it
//! takes. The deriver applies it exactly once, when the event is created.

use std::sync::Arc;
use tuneflow_common::config::RoutingConfig;
use tuneflow_common::events::{ListenStatus, PlaybackEvent, ProcessingPath};

/// Decides the delivery path of an event
pub trait PathPolicy: Send + Sync + std::fmt::Debug {
    fn classify(&self, event: &PlaybackEvent) -> ProcessingPath;
}

/// Same path for every event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPath(pub ProcessingPath);

impl Default for FixedPath {
    fn default() -> Self {
        FixedPath(ProcessingPath::Hot)
    }
}

impl PathPolicy for FixedPath {
    fn classify(&self, _event: &PlaybackEvent) -> ProcessingPath {
        self.0
    }
}

/// Path chosen by how the track ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPathPolicy {
    pub completed: ProcessingPath,
    pub skipped: ProcessingPath,
}

impl PathPolicy for StatusPathPolicy {
    fn classify(&self, event: &PlaybackEvent) -> ProcessingPath {
        match event.status {
            ListenStatus::Completed => self.completed,
            ListenStatus::Skipped => self.skipped,
        }
    }
}

/// Build the configured policy
pub fn from_config(config: &RoutingConfig) -> Arc<dyn PathPolicy> {
    match *config {
        RoutingConfig::Fixed { path } => Arc::new(FixedPath(path)),
        RoutingConfig::ByStatus { completed, skipped } => {
            Arc::new(StatusPathPolicy { completed, skipped })
        }
    }
}
