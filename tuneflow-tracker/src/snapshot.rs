//! Snapshot normalization
//!
//! Turns a raw "currently playing" response into a [`PlaybackSnapshot`].
//! Normalization is total: any missing or malformed input degrades to the
//! empty snapshot rather than an error, so the deriver only ever sees
//! well-formed values.
//!
//! Expected upstream shape (Spotify Web API):
//! ```json
//! { "is_playing": true, "progress_ms": 42000,
//!   "item": { "id": "...", "uri": "spotify:track:...", "name": "...",
//!             "duration_ms": 215000, "artists": [{"name": "..."}],
//!             "album": {"name": "..."} } }
//! ```

use chrono::{DateTime, Utc};
use serde_json::Value;

/// One normalized observation of the player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    /// Track identity; `None` means nothing is playing
    pub track_id: Option<String>,
    pub track_name: Option<String>,
    pub artists: Vec<String>,
    pub album: Option<String>,
    /// Position within the track, never above `duration_ms`
    pub progress_ms: Option<u64>,
    /// Track length, positive when present
    pub duration_ms: Option<u64>,
    pub observed_at: DateTime<Utc>,
}

impl PlaybackSnapshot {
    /// Snapshot meaning "nothing is playing"
    pub fn empty(observed_at: DateTime<Utc>) -> Self {
        Self {
            is_playing: false,
            track_id: None,
            track_name: None,
            artists: Vec::new(),
            album: None,
            progress_ms: None,
            duration_ms: None,
            observed_at,
        }
    }

    /// Whether a track is present (playing or paused)
    pub fn has_track(&self) -> bool {
        self.track_id.is_some()
    }

    /// Artists joined for log output
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

/// Normalize a raw upstream response
///
/// `None` (e.g. HTTP 204) and any body without a usable track identity
/// produce [`PlaybackSnapshot::empty`].
pub fn normalize(raw: Option<&Value>, observed_at: DateTime<Utc>) -> PlaybackSnapshot {
    let Some(root) = raw.and_then(Value::as_object) else {
        return PlaybackSnapshot::empty(observed_at);
    };
    let Some(item) = root.get("item").and_then(Value::as_object) else {
        return PlaybackSnapshot::empty(observed_at);
    };

    // Local files carry a null id but a stable uri
    let track_id = non_blank_str(item.get("id")).or_else(|| non_blank_str(item.get("uri")));
    let Some(track_id) = track_id else {
        return PlaybackSnapshot::empty(observed_at);
    };

    let duration_ms = non_negative_ms(item.get("duration_ms")).filter(|d| *d > 0);
    let progress_ms = non_negative_ms(root.get("progress_ms"))
        .map(|p| duration_ms.map_or(p, |d| p.min(d)));

    let artists = item
        .get("artists")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|a| non_blank_str(a.get("name")))
                .collect()
        })
        .unwrap_or_default();

    let album = item
        .get("album")
        .and_then(|a| non_blank_str(a.get("name")));

    PlaybackSnapshot {
        is_playing: root
            .get("is_playing")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        track_id: Some(track_id),
        track_name: non_blank_str(item.get("name")),
        artists,
        album,
        progress_ms,
        duration_ms,
        observed_at,
    }
}

fn non_blank_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Integer milliseconds; negatives, fractions and strings are absent
fn non_negative_ms(value: Option<&Value>) -> Option<u64> {
    value.and_then(Value::as_u64)
}
