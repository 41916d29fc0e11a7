//! Playback event wire types
//!
//! `PlaybackEvent` is the record handed to the ingestion transport. Its JSON
//! form is consumed by downstream fan-out, so field names and enum spellings
//! here are the wire contract.

use serde::{Deserialize, Serialize};

/// Event type tag carried by every playback event
///
/// Only one kind of event exists today; modelling it as an enum keeps the
/// wire tag fixed and makes deserialization reject foreign records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// The tracked track ended (replaced by another track or by silence)
    #[default]
    TrackChange,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::TrackChange => write!(f, "track_change"),
        }
    }
}

/// How the outgoing track ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListenStatus {
    /// Listened for at least the completion threshold
    Completed,
    /// Left before reaching the completion threshold
    Skipped,
}

impl std::fmt::Display for ListenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenStatus::Completed => write!(f, "COMPLETED"),
            ListenStatus::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Delivery route for an event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingPath {
    /// Near-real-time storage
    #[default]
    Hot,
    /// Archival, batch-oriented storage
    Cold,
}

impl std::fmt::Display for ProcessingPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingPath::Hot => write!(f, "hot"),
            ProcessingPath::Cold => write!(f, "cold"),
        }
    }
}

impl std::str::FromStr for ProcessingPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hot" => Ok(ProcessingPath::Hot),
            "cold" => Ok(ProcessingPath::Cold),
            other => Err(format!("unknown processing path '{}' (expected hot or cold)", other)),
        }
    }
}

/// Discrete playback event for a track that just ended
///
/// Built once by the deriver at the moment a track change is observed and
/// never mutated afterwards; publishers only borrow it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaybackEvent {
    /// Always `track_change`
    pub event_type: EventType,
    /// Identity of the track that ended
    pub track_id: String,
    /// Display name of the track that ended, if the upstream reported one
    pub track_name: Option<String>,
    /// Completed vs skipped
    pub status: ListenStatus,
    /// High-water mark of observed progress, whole seconds
    pub duration_listened_seconds: u64,
    /// Emission time, epoch seconds
    pub timestamp: i64,
    /// Owning user
    pub user_id: String,
    /// Routing tag for downstream fan-out
    pub processing_path: ProcessingPath,
}

impl PlaybackEvent {
    /// Copy of this event tagged for a different path
    ///
    /// Used by path policies, which classify a fully-built event.
    pub fn with_path(mut self, path: ProcessingPath) -> Self {
        self.processing_path = path;
        self
    }
}
