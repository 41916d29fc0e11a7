//! Event types for the TuneFlow event system
//!
//! Two families live here:
//! - [`PlaybackEvent`]: the wire record delivered to the ingestion transport
//! - [`TrackerEvent`]: in-process notifications broadcast on the [`EventBus`]

mod playback_types;

pub use playback_types::{EventType, ListenStatus, PlaybackEvent, ProcessingPath};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// In-process tracker notifications
///
/// Broadcast so that logging, health reporting and tests can observe poller
/// activity without coupling to it. Never sent over the wire to ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TrackerEvent {
    /// A user's poll loop started
    SessionStarted {
        user_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A new track began being tracked
    ///
    /// Fired on IDLE → TRACKING and on every track change that lands on a track.
    TrackStarted {
        user_id: String,
        track_id: String,
        track_name: Option<String>,
        artists: Vec<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A playback event was derived (before publishing)
    TrackChanged { event: PlaybackEvent },

    /// Upstream poll failed; session state was left untouched
    PollFailed {
        user_id: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A derived event could not be delivered
    PublishFailed {
        user_id: String,
        track_id: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A user's poll loop exited
    SessionStopped {
        user_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl TrackerEvent {
    /// User the notification belongs to
    pub fn user_id(&self) -> &str {
        match self {
            TrackerEvent::SessionStarted { user_id, .. }
            | TrackerEvent::TrackStarted { user_id, .. }
            | TrackerEvent::PollFailed { user_id, .. }
            | TrackerEvent::PublishFailed { user_id, .. }
            | TrackerEvent::SessionStopped { user_id, .. } => user_id,
            TrackerEvent::TrackChanged { event } => &event.user_id,
        }
    }
}

/// Central distribution bus for tracker notifications
///
/// Wraps `tokio::sync::broadcast`: publishing never blocks, slow subscribers
/// lag and drop old events instead of stalling pollers.
///
/// # Examples
///
/// ```
/// use tuneflow_common::events::{EventBus, TrackerEvent};
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(TrackerEvent::SessionStarted {
///     user_id: "listener-1".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TrackerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` when nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: TrackerEvent,
    ) -> Result<usize, broadcast::error::SendError<TrackerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: TrackerEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
