//! Supervisor for per-user poller tasks
//!
//! One [`SessionPoller`] per configured user, each in its own task on a
//! shared [`JoinSet`]. Users share the router and event bus read-only and
//! nothing else.

use crate::deriver::{PlaybackEventDeriver, Session};
use crate::error::{Error, Result};
use crate::policy::{self, PathPolicy};
use crate::poller::SessionPoller;
use crate::router::EventRouter;
use crate::upstream::{NowPlayingSource, SpotifyClient};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tuneflow_common::config::{TomlConfig, UserConfig};
use tuneflow_common::events::EventBus;

/// Owns every running poller
pub struct Supervisor {
    router: EventRouter,
    bus: EventBus,
    path_policy: Arc<dyn PathPolicy>,
    poll_interval: Duration,
    completion_threshold_secs: u64,
    cancel: CancellationToken,
    tasks: JoinSet<Session>,
    tracked: HashSet<String>,
}

impl Supervisor {
    /// Create a supervisor with session settings taken from `config`
    pub fn new(config: &TomlConfig, router: EventRouter, bus: EventBus) -> Self {
        Self {
            router,
            bus,
            path_policy: policy::from_config(&config.routing),
            poll_interval: config.poll_interval(),
            completion_threshold_secs: config.completion_threshold_secs,
            cancel: CancellationToken::new(),
            tasks: JoinSet::new(),
            tracked: HashSet::new(),
        }
    }

    /// Start a poller for every configured user
    ///
    /// A user whose client cannot be built or whose id cannot be resolved
    /// is logged and skipped. Returns the number of pollers started.
    pub async fn spawn_all(&mut self, config: &TomlConfig) -> usize {
        let mut started = 0;
        for user in &config.users {
            match self.spawn_configured(config, user).await {
                Ok(user_id) => {
                    info!(user_id = %user_id, "Tracking user");
                    started += 1;
                }
                Err(e) => {
                    error!(user = %user.label(), error = %e, "Skipping user");
                }
            }
        }
        started
    }

    async fn spawn_configured(&mut self, config: &TomlConfig, user: &UserConfig) -> Result<String> {
        let token = user.resolve_access_token()?;
        let client = SpotifyClient::new(&config.upstream.base_url, token, config.upstream_timeout())
            .map_err(|e| Error::Config(format!("Failed to build upstream client: {}", e)))?;
        self.spawn_user(user.user_id.clone(), Arc::new(client)).await
    }

    /// Start a poller for one source
    ///
    /// When `user_id` is `None` it is resolved through the source first.
    /// A user id already being tracked is rejected.
    pub async fn spawn_user(
        &mut self,
        user_id: Option<String>,
        source: Arc<dyn NowPlayingSource>,
    ) -> Result<String> {
        let user_id = match user_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id,
            None => {
                let id = source.current_user_id().await?;
                info!(user_id = %id, "Resolved user id from upstream");
                id
            }
        };
        if self.tracked.contains(&user_id) {
            return Err(Error::Config(format!("User {} is already tracked", user_id)));
        }

        let deriver = PlaybackEventDeriver::new(
            user_id.clone(),
            self.completion_threshold_secs,
            Arc::clone(&self.path_policy),
        )?;
        let poller = SessionPoller::new(
            Session::new(deriver),
            source,
            self.router.clone(),
            self.bus.clone(),
            self.poll_interval,
        );
        self.tasks.spawn(poller.run(self.cancel.child_token()));
        self.tracked.insert(user_id.clone());
        Ok(user_id)
    }

    /// Number of pollers still owned
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel every poller and wait for them; returns their final sessions
    pub async fn shutdown(mut self) -> Vec<Session> {
        info!(pollers = self.tasks.len(), "Stopping session pollers");
        self.cancel.cancel();

        let mut sessions = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(error = %e, "Poller task ended abnormally"),
            }
        }
        sessions
    }
}
