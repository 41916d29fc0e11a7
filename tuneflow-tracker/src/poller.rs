//! Session poller
//!
//! Drives one user's [`Session`]: poll → normalize → derive → publish →
//! sleep. Session state is owned here and never shared.
//!
//! Cancellation is observed while waiting on the upstream and while
//! sleeping. Derivation and publishing of an already-polled snapshot always
//! run to completion, and no event is synthesized for the track being
//! tracked at shutdown.

use crate::deriver::{Session, SessionState};
use crate::error::PollError;
use crate::router::EventRouter;
use crate::snapshot::normalize;
use crate::upstream::NowPlayingSource;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tuneflow_common::events::{EventBus, PlaybackEvent, TrackerEvent};
use tuneflow_common::time;

/// Poll loop for a single user
pub struct SessionPoller {
    session: Session,
    source: Arc<dyn NowPlayingSource>,
    router: EventRouter,
    bus: EventBus,
    poll_interval: Duration,
}

impl SessionPoller {
    pub fn new(
        session: Session,
        source: Arc<dyn NowPlayingSource>,
        router: EventRouter,
        bus: EventBus,
        poll_interval: Duration,
    ) -> Self {
        Self {
            session,
            source,
            router,
            bus,
            poll_interval,
        }
    }

    pub fn user_id(&self) -> &str {
        self.session.user_id()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run until `cancel` fires; returns the session in its final state
    pub async fn run(mut self, cancel: CancellationToken) -> Session {
        let user_id = self.user_id().to_string();
        info!(user_id = %user_id, interval_ms = self.poll_interval.as_millis() as u64, "Session poller started");
        self.bus.emit_lossy(TrackerEvent::SessionStarted {
            user_id: user_id.clone(),
            timestamp: time::now(),
        });

        loop {
            let source = Arc::clone(&self.source);
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                polled = source.poll() => polled,
            };

            let delay = self.handle_poll(polled).await;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        if let Some(track_id) = self.session.state().current_track_id() {
            debug!(user_id = %user_id, track_id = %track_id, "Stopping while tracking; no event emitted");
        }
        info!(user_id = %user_id, "Session poller stopped");
        self.bus.emit_lossy(TrackerEvent::SessionStopped {
            user_id,
            timestamp: time::now(),
        });
        self.session
    }

    /// Process one poll result; returns how long to wait before the next poll
    pub async fn handle_poll(&mut self, polled: Result<Option<Value>, PollError>) -> Duration {
        let raw = match polled {
            Ok(raw) => raw,
            Err(e) => return self.poll_failed(e),
        };

        let now = time::now();
        let snapshot = normalize(raw.as_ref(), now);
        let observation = self.session.observe(snapshot, now);

        if let Some(event) = observation.event {
            self.publish(event).await;
        }

        if observation.track_started {
            self.announce_track();
        }

        self.poll_interval
    }

    fn poll_failed(&self, e: PollError) -> Duration {
        let user_id = self.user_id();
        warn!(
            user_id = %user_id,
            error = %e,
            tracking = self.session.state().is_tracking(),
            "Poll failed; keeping session state"
        );
        self.bus.emit_lossy(TrackerEvent::PollFailed {
            user_id: user_id.to_string(),
            error: e.to_string(),
            timestamp: time::now(),
        });

        match e.retry_after() {
            Some(retry_after) => self.poll_interval.max(retry_after),
            None => self.poll_interval,
        }
    }

    async fn publish(&self, event: PlaybackEvent) {
        info!(
            user_id = %event.user_id,
            track_id = %event.track_id,
            status = %event.status,
            listened_secs = event.duration_listened_seconds,
            path = %event.processing_path,
            "Track change"
        );
        self.bus.emit_lossy(TrackerEvent::TrackChanged {
            event: event.clone(),
        });

        if let Err(e) = self.router.dispatch(&event).await {
            error!(
                user_id = %event.user_id,
                track_id = %event.track_id,
                error = %e,
                "Failed to publish playback event"
            );
            self.bus.emit_lossy(TrackerEvent::PublishFailed {
                user_id: event.user_id,
                track_id: event.track_id,
                error: e.to_string(),
                timestamp: time::now(),
            });
        }
    }

    fn announce_track(&self) {
        let SessionState::Tracking(track) = self.session.state() else {
            return;
        };
        let snapshot = &track.last_snapshot;
        info!(
            user_id = %self.user_id(),
            track_id = %track.track_id(),
            "Now playing: {} by {}",
            snapshot.track_name.as_deref().unwrap_or("<unknown>"),
            snapshot.artist_line()
        );
        self.bus.emit_lossy(TrackerEvent::TrackStarted {
            user_id: self.user_id().to_string(),
            track_id: track.track_id().to_string(),
            track_name: snapshot.track_name.clone(),
            artists: snapshot.artists.clone(),
            timestamp: time::now(),
        });
    }
}
