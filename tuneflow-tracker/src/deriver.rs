//! Playback event derivation
//!
//! Per-user state machine converting a sequence of snapshots into a sparse
//! sequence of [`PlaybackEvent`]s, at most one per track change.
//!
//! **States:**
//! - `Idle`: no track is being observed
//! - `Tracking`: a track is being observed; we hold its latest snapshot and
//!   the high-water mark of its progress
//!
//! **Transitions** (per poll, snapshot `S`):
//!
//! | State    | S                     | Event                 | Next                 |
//! |----------|-----------------------|-----------------------|----------------------|
//! | Tracking | same track id         | none                  | Tracking (max grows) |
//! | Tracking | other track           | previous track ended  | Tracking (reset)     |
//! | Tracking | no track              | previous track ended  | Idle                 |
//! | Idle     | track (playing/paused)| none                  | Tracking             |
//! | Idle     | no track              | none                  | Idle                 |
//!
//! Listen time is the high-water mark of observed progress, not wall-clock
//! time, so pauses, backward seeks and polling gaps never under-count it.

use crate::error::{Error, Result};
use crate::policy::PathPolicy;
use crate::snapshot::PlaybackSnapshot;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tuneflow_common::events::{EventType, ListenStatus, PlaybackEvent};
use tuneflow_common::time::{epoch_seconds, millis_to_whole_seconds};

/// Observation state for the track currently being tracked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedTrack {
    /// Most recent snapshot of this track (always has a track id)
    pub last_snapshot: PlaybackSnapshot,
    /// When this track was first observed
    pub track_start_observed_at: DateTime<Utc>,
    /// Highest progress seen for this track
    pub max_progress_observed_ms: u64,
}

impl TrackedTrack {
    fn begin(snapshot: PlaybackSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            max_progress_observed_ms: snapshot.progress_ms.unwrap_or(0),
            last_snapshot: snapshot,
            track_start_observed_at: now,
        }
    }

    /// Track id of the tracked track
    pub fn track_id(&self) -> &str {
        self.last_snapshot.track_id.as_deref().unwrap_or_default()
    }
}

/// Per-user session state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Nothing being tracked (also the state before the first poll)
    #[default]
    Idle,
    /// A track is being observed
    Tracking(TrackedTrack),
}

impl SessionState {
    pub fn is_tracking(&self) -> bool {
        matches!(self, SessionState::Tracking(_))
    }

    /// Track id currently tracked, if any
    pub fn current_track_id(&self) -> Option<&str> {
        match self {
            SessionState::Idle => None,
            SessionState::Tracking(t) => Some(t.track_id()),
        }
    }

    /// High-water mark of the tracked track, if any
    pub fn max_progress_observed_ms(&self) -> Option<u64> {
        match self {
            SessionState::Idle => None,
            SessionState::Tracking(t) => Some(t.max_progress_observed_ms),
        }
    }
}

/// Result of one derivation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivation {
    /// State after this snapshot
    pub state: SessionState,
    /// Event for the track that just ended, if any
    pub event: Option<PlaybackEvent>,
    /// True when this snapshot began tracking a new track
    pub track_started: bool,
}

/// Stateless derivation rules for one user
///
/// [`derive`](Self::derive) is a pure function of its inputs; session
/// state is passed in and handed back rather than held here.
#[derive(Debug, Clone)]
pub struct PlaybackEventDeriver {
    user_id: String,
    completion_threshold_secs: u64,
    path_policy: Arc<dyn PathPolicy>,
}

impl PlaybackEventDeriver {
    /// Create a deriver
    ///
    /// Fails on a zero threshold; this is a startup configuration error.
    pub fn new(
        user_id: impl Into<String>,
        completion_threshold_secs: u64,
        path_policy: Arc<dyn PathPolicy>,
    ) -> Result<Self> {
        if completion_threshold_secs == 0 {
            return Err(Error::Config(
                "completion threshold must be at least 1 second".to_string(),
            ));
        }
        Ok(Self {
            user_id: user_id.into(),
            completion_threshold_secs,
            path_policy,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn completion_threshold_secs(&self) -> u64 {
        self.completion_threshold_secs
    }

    /// Classify a listen duration (threshold is inclusive)
    pub fn classify(&self, duration_listened_seconds: u64) -> ListenStatus {
        if duration_listened_seconds >= self.completion_threshold_secs {
            ListenStatus::Completed
        } else {
            ListenStatus::Skipped
        }
    }

    /// Apply one snapshot to the session state
    pub fn derive(
        &self,
        state: SessionState,
        snapshot: PlaybackSnapshot,
        now: DateTime<Utc>,
    ) -> Derivation {
        match state {
            SessionState::Tracking(mut tracked)
                if snapshot.track_id.as_deref() == Some(tracked.track_id()) =>
            {
                // Same track: progress may go backwards (seek) or be missing;
                // the high-water mark only ever grows
                if let Some(progress) = snapshot.progress_ms {
                    tracked.max_progress_observed_ms =
                        tracked.max_progress_observed_ms.max(progress);
                }
                tracked.last_snapshot = snapshot;
                Derivation {
                    state: SessionState::Tracking(tracked),
                    event: None,
                    track_started: false,
                }
            }
            SessionState::Tracking(outgoing) => {
                let event = self.close_out(&outgoing, now);
                let (state, track_started) = if snapshot.has_track() {
                    (SessionState::Tracking(TrackedTrack::begin(snapshot, now)), true)
                } else {
                    (SessionState::Idle, false)
                };
                Derivation {
                    state,
                    event: Some(event),
                    track_started,
                }
            }
            SessionState::Idle if snapshot.has_track() => Derivation {
                state: SessionState::Tracking(TrackedTrack::begin(snapshot, now)),
                event: None,
                track_started: true,
            },
            SessionState::Idle => Derivation {
                state: SessionState::Idle,
                event: None,
                track_started: false,
            },
        }
    }

    /// Build the event for a track that just ended
    fn close_out(&self, outgoing: &TrackedTrack, now: DateTime<Utc>) -> PlaybackEvent {
        let duration_listened_seconds = millis_to_whole_seconds(outgoing.max_progress_observed_ms);
        let event = PlaybackEvent {
            event_type: EventType::TrackChange,
            track_id: outgoing.track_id().to_string(),
            track_name: outgoing.last_snapshot.track_name.clone(),
            status: self.classify(duration_listened_seconds),
            duration_listened_seconds,
            timestamp: epoch_seconds(now),
            user_id: self.user_id.clone(),
            processing_path: Default::default(),
        };
        let path = self.path_policy.classify(&event);
        event.with_path(path)
    }
}

/// What one observation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub event: Option<PlaybackEvent>,
    pub track_started: bool,
}

/// A deriver together with the session state it owns
///
/// This is the single writer of a user's state; the poller holds one per
/// user and never shares it.
#[derive(Debug)]
pub struct Session {
    deriver: PlaybackEventDeriver,
    state: SessionState,
}

impl Session {
    /// New session starting in `Idle` (first poll becomes the baseline)
    pub fn new(deriver: PlaybackEventDeriver) -> Self {
        Self {
            deriver,
            state: SessionState::Idle,
        }
    }

    /// Feed one snapshot
    pub fn observe(&mut self, snapshot: PlaybackSnapshot, now: DateTime<Utc>) -> Observation {
        let state = std::mem::take(&mut self.state);
        let derivation = self.deriver.derive(state, snapshot, now);
        self.state = derivation.state;
        Observation {
            event: derivation.event,
            track_started: derivation.track_started,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn user_id(&self) -> &str {
        self.deriver.user_id()
    }
}
