//! Upstream "now playing" data sources

mod spotify;

pub use spotify::SpotifyClient;

use crate::error::PollError;
use async_trait::async_trait;
use serde_json::Value;

/// Source of raw "currently playing" snapshots for one user
#[async_trait]
pub trait NowPlayingSource: Send + Sync {
    /// Identity of the user the credentials belong to
    async fn current_user_id(&self) -> Result<String, PollError>;

    /// Fetch the raw snapshot
    ///
    /// `Ok(None)` means the upstream reported nothing playing. `Err` means
    /// no information was obtained and must not be treated as "nothing playing".
    async fn poll(&self) -> Result<Option<Value>, PollError>;
}
