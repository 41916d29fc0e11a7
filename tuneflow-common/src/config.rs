//! Configuration loading, resolution and validation
//!
//! Config file resolution priority:
//! 1. Explicit path (command-line argument, or `TUNEFLOW_CONFIG`)
//! 2. `~/.config/tuneflow/config.toml`, then `/etc/tuneflow/config.toml`
//! 3. Compiled defaults
//!
//! A missing default-location file is not fatal; an explicitly named file
//! that cannot be read is. Validation runs once at startup so that bad
//! settings fail fast instead of per poll.

use crate::events::ProcessingPath;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "TUNEFLOW_CONFIG";

/// Environment variable consulted for a user's token when none is configured
pub const DEFAULT_TOKEN_ENV_VAR: &str = "SPOTIFY_ACCESS_TOKEN";

/// Default Spotify Web API base URL
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.spotify.com/v1";

/// Default delay between polls
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default listen time separating SKIPPED from COMPLETED (inclusive)
pub const DEFAULT_COMPLETION_THRESHOLD_SECS: u64 = 30;

/// Root TOML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Seconds between polls of the upstream source
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Minimum whole seconds listened for a track to count as completed
    #[serde(default = "default_completion_threshold_secs")]
    pub completion_threshold_secs: u64,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Users to track, one poller each
    #[serde(default)]
    pub users: Vec<UserConfig>,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub sinks: SinksConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Upstream "now playing" API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// One tracked user
///
/// `user_id` may be omitted, in which case the tracker asks the upstream API
/// who the token belongs to.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub user_id: Option<String>,

    /// Inline bearer token (prefer `access_token_env`)
    #[serde(default)]
    pub access_token: Option<String>,

    /// Name of the environment variable holding the bearer token
    #[serde(default)]
    pub access_token_env: Option<String>,
}

impl std::fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserConfig")
            .field("user_id", &self.user_id)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("access_token_env", &self.access_token_env)
            .finish()
    }
}

impl UserConfig {
    /// Resolve the bearer token: inline value first, then the named env var
    /// (or `SPOTIFY_ACCESS_TOKEN` when no name is given)
    pub fn resolve_access_token(&self) -> Result<String> {
        if let Some(token) = self.access_token.as_deref().filter(|t| !t.trim().is_empty()) {
            return Ok(token.trim().to_string());
        }

        let var = self
            .access_token_env
            .as_deref()
            .unwrap_or(DEFAULT_TOKEN_ENV_VAR);
        match std::env::var(var) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(Error::Config(format!(
                "No access token for user {}: set access_token or environment variable {}",
                self.label(),
                var
            ))),
        }
    }

    /// Human-readable label for logs and errors (never the token)
    pub fn label(&self) -> String {
        self.user_id
            .clone()
            .unwrap_or_else(|| "<unresolved>".to_string())
    }
}

/// Processing path assignment policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RoutingConfig {
    /// Every event gets the same path
    Fixed {
        #[serde(default)]
        path: ProcessingPath,
    },
    /// Path chosen by listen status
    ByStatus {
        #[serde(default)]
        completed: ProcessingPath,
        #[serde(default)]
        skipped: ProcessingPath,
    },
}

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig::Fixed {
            path: ProcessingPath::Hot,
        }
    }
}

/// Publisher per delivery path
///
/// When `cold` is absent, cold-tagged events share the hot sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinksConfig {
    #[serde(default)]
    pub hot: SinkConfig,

    #[serde(default)]
    pub cold: Option<SinkConfig>,
}

/// Destination for published events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    /// POST batches to an ingestion endpoint
    Http(HttpSinkConfig),
    /// Append JSON lines to a local file
    Jsonl { path: PathBuf },
    /// Log events only (dry run)
    #[default]
    Log,
}

/// HTTP ingestion endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSinkConfig {
    pub endpoint: String,

    /// Total delivery attempts per record, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_completion_threshold_secs() -> u64 {
    DEFAULT_COMPLETION_THRESHOLD_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_upstream_url() -> String {
    DEFAULT_UPSTREAM_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5000
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            completion_threshold_secs: default_completion_threshold_secs(),
            logging: LoggingConfig::default(),
            upstream: UpstreamConfig::default(),
            users: Vec::new(),
            routing: RoutingConfig::default(),
            sinks: SinksConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl TomlConfig {
    /// Parse a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Delay between polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Upstream request timeout
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.request_timeout_secs)
    }

    /// Check every setting that would otherwise fail at poll time
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be at least 1".to_string()));
        }
        if self.completion_threshold_secs == 0 {
            return Err(Error::Config(
                "completion_threshold_secs must be at least 1".to_string(),
            ));
        }
        if self.upstream.base_url.trim().is_empty() {
            return Err(Error::Config("upstream.base_url must not be empty".to_string()));
        }
        if self.upstream.request_timeout_secs == 0 {
            return Err(Error::Config(
                "upstream.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.users.is_empty() {
            return Err(Error::Config(
                "No users configured: add at least one [[users]] entry".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for user in &self.users {
            if let Some(id) = &user.user_id {
                if id.trim().is_empty() {
                    return Err(Error::Config("users.user_id must not be blank".to_string()));
                }
                if !seen.insert(id.as_str()) {
                    return Err(Error::Config(format!("Duplicate user_id '{}'", id)));
                }
            }
            user.resolve_access_token()?;
        }

        validate_sink("sinks.hot", &self.sinks.hot)?;
        if let Some(cold) = &self.sinks.cold {
            validate_sink("sinks.cold", cold)?;
        }

        Ok(())
    }
}

fn validate_sink(name: &str, sink: &SinkConfig) -> Result<()> {
    match sink {
        SinkConfig::Http(http) => {
            if http.endpoint.trim().is_empty() {
                return Err(Error::Config(format!("{}.endpoint must not be empty", name)));
            }
            if http.max_attempts == 0 {
                return Err(Error::Config(format!("{}.max_attempts must be at least 1", name)));
            }
            if http.max_backoff_ms < http.initial_backoff_ms {
                return Err(Error::Config(format!(
                    "{}.max_backoff_ms must be >= initial_backoff_ms",
                    name
                )));
            }
            if http.request_timeout_secs == 0 {
                return Err(Error::Config(format!(
                    "{}.request_timeout_secs must be at least 1",
                    name
                )));
            }
        }
        SinkConfig::Jsonl { path } => {
            if path.as_os_str().is_empty() {
                return Err(Error::Config(format!("{}.path must not be empty", name)));
            }
        }
        SinkConfig::Log => {}
    }
    Ok(())
}

/// Locate the config file following the resolution priority
///
/// Returns the path and whether it was explicitly requested.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<(PathBuf, bool)> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some((path.to_path_buf(), true));
    }

    // Priority 1b: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some((PathBuf::from(path), true));
        }
    }

    // Priority 2: Default locations, only if present
    default_config_paths()
        .into_iter()
        .find(|p| p.exists())
        .map(|p| (p, false))
}

/// Platform default config locations, most specific first
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("tuneflow").join("config.toml"));
    }
    if cfg!(unix) {
        paths.push(PathBuf::from("/etc/tuneflow/config.toml"));
    }
    paths
}

/// Load the effective config
///
/// Falls back to compiled defaults (with a warning) when no file is found at
/// a default location. Does not validate; call [`TomlConfig::validate`] once
/// CLI overrides have been applied.
pub fn load_config(cli_arg: Option<&Path>) -> Result<(TomlConfig, Option<PathBuf>)> {
    match resolve_config_path(cli_arg) {
        Some((path, explicit)) => {
            if explicit && !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            let config = TomlConfig::load(&path)?;
            info!("Loaded configuration from {}", path.display());
            Ok((config, Some(path)))
        }
        None => {
            warn!("No config file found; using compiled defaults");
            Ok((TomlConfig::default(), None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_token() -> UserConfig {
        UserConfig {
            user_id: Some("listener-1".to_string()),
            access_token: Some("token-abc".to_string()),
            access_token_env: None,
        }
    }

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.completion_threshold_secs, 30);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.upstream.base_url, DEFAULT_UPSTREAM_URL);
        assert_eq!(config.routing, RoutingConfig::Fixed { path: ProcessingPath::Hot });
        assert_eq!(config.sinks.hot, SinkConfig::Log);
        assert!(config.sinks.cold.is_none());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        assert!(config.users.is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut config = TomlConfig {
            users: vec![user_with_token()],
            ..Default::default()
        };
        config.completion_threshold_secs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = TomlConfig {
            poll_interval_secs: 0,
            users: vec![user_with_token()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_users() {
        let err = TomlConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("No users configured"));
    }

    #[test]
    fn test_validate_rejects_duplicate_users() {
        let config = TomlConfig {
            users: vec![user_with_token(), user_with_token()],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate user_id"));
    }

    #[test]
    fn test_validate_http_sink() {
        let mut config = TomlConfig {
            users: vec![user_with_token()],
            ..Default::default()
        };
        config.sinks.hot = SinkConfig::Http(HttpSinkConfig {
            endpoint: "http://127.0.0.1:9/ingest".to_string(),
            max_attempts: 0,
            initial_backoff_ms: 200,
            max_backoff_ms: 5000,
            request_timeout_secs: 10,
        });
        assert!(config.validate().is_err());

        if let SinkConfig::Http(http) = &mut config.sinks.hot {
            http.max_attempts = 3;
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_user_debug_redacts_token() {
        let rendered = format!("{:?}", user_with_token());
        assert!(!rendered.contains("token-abc"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_inline_token_wins() {
        let user = UserConfig {
            user_id: None,
            access_token: Some("  inline  ".to_string()),
            access_token_env: Some("TUNEFLOW_TEST_UNSET_VAR_1".to_string()),
        };
        assert_eq!(user.resolve_access_token().unwrap(), "inline");
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let user = UserConfig {
            user_id: Some("nobody".to_string()),
            access_token: None,
            access_token_env: Some("TUNEFLOW_TEST_UNSET_VAR_2".to_string()),
        };
        let err = user.resolve_access_token().unwrap_err();
        assert!(err.to_string().contains("TUNEFLOW_TEST_UNSET_VAR_2"));
    }
}
