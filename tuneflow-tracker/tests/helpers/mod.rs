//! Test helper modules for tuneflow-tracker integration tests
//!
//! - ScriptedSource: replays a fixed sequence of poll results
//! - RecordingPublisher: captures published events, optionally rejecting them
//! - spawn_server: runs an axum router on an ephemeral local port
//! - Snapshot builders for the upstream JSON shape

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use tuneflow_common::events::{PlaybackEvent, TrackerEvent};
use tuneflow_tracker::error::{PollError, PublishError};
use tuneflow_tracker::publish::{PublishReport, Publisher, RecordOutcome};
use tuneflow_tracker::upstream::NowPlayingSource;

/// Replays poll results in order, then cancels `done` and blocks forever
pub struct ScriptedSource {
    user_id: String,
    script: Mutex<VecDeque<Result<Option<Value>, PollError>>>,
    done: CancellationToken,
}

impl ScriptedSource {
    pub fn new(
        script: Vec<Result<Option<Value>, PollError>>,
        done: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            user_id: "listener-1".to_string(),
            script: Mutex::new(script.into()),
            done,
        })
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl NowPlayingSource for ScriptedSource {
    async fn current_user_id(&self) -> Result<String, PollError> {
        Ok(self.user_id.clone())
    }

    async fn poll(&self) -> Result<Option<Value>, PollError> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => {
                self.done.cancel();
                std::future::pending().await
            }
        }
    }
}

/// Captures every event it is asked to publish
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<PlaybackEvent>>,
    reject: bool,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publisher that reports every record as rejected
    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            reject: true,
            ..Default::default()
        })
    }

    pub fn events(&self) -> Vec<PlaybackEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish_batch(&self, events: &[PlaybackEvent]) -> Result<PublishReport, PublishError> {
        self.events.lock().unwrap().extend_from_slice(events);
        if self.reject {
            return Ok(PublishReport {
                outcomes: vec![
                    RecordOutcome::Failed {
                        reason: "ProvisionedThroughputExceeded".to_string(),
                    };
                    events.len()
                ],
            });
        }
        Ok(PublishReport::all_delivered(events.len()))
    }
}

/// Serve `router` on 127.0.0.1 and return its base URL
pub async fn spawn_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    format!("http://{}", addr)
}

/// Base URL of a port nothing listens on
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{}", addr)
}

/// Upstream body for a track at `progress_ms`
pub fn playing(track_id: &str, progress_ms: u64) -> Value {
    json!({
        "is_playing": true,
        "progress_ms": progress_ms,
        "item": {
            "id": track_id,
            "uri": format!("spotify:track:{}", track_id),
            "name": format!("Song {}", track_id),
            "duration_ms": 240_000,
            "artists": [{ "name": "The Testers" }],
            "album": { "name": "Fixtures" }
        }
    })
}

/// Same as [`playing`] but paused
pub fn paused(track_id: &str, progress_ms: u64) -> Value {
    let mut body = playing(track_id, progress_ms);
    body["is_playing"] = json!(false);
    body
}

/// Drain every notification currently buffered on `rx`
pub fn drain(rx: &mut broadcast::Receiver<TrackerEvent>) -> Vec<TrackerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
