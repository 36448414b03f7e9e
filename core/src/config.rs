//! Engine configuration loading
//!
//! Loads configuration from `~/.config/bundlesync/config.toml` (or the path in
//! `BUNDLESYNC_CONFIG`). Missing files fall back to defaults; the server URL
//! and token can be overridden from the environment.

use serde::Deserialize;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default cadence for both polling loops and the keepalive timer.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 4000;

/// Default number of lines kept from each end of a summary blob.
pub const DEFAULT_SUMMARY_LINES: u32 = 50;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// What to do when a stdout/stderr/file summary fetch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryErrorPolicy {
    /// Record the failure in the error log and clear the affected field.
    #[default]
    Record,
    /// Log only; the affected field keeps its previous value.
    Absorb,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Backend base URL. The REST root is `{server_url}/rest`.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Polling cadence while the bundle may still change
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Keepalive notification period
    #[serde(default = "default_poll_interval_ms")]
    pub keepalive_interval_ms: u64,

    #[serde(default = "default_summary_lines")]
    pub summary_head_lines: u32,

    #[serde(default = "default_summary_lines")]
    pub summary_tail_lines: u32,

    #[serde(default)]
    pub summary_error_policy: SummaryErrorPolicy,

    /// Read the contents one last time after the bundle turns terminal.
    /// Off means nothing is fetched automatically once the bundle is terminal.
    #[serde(default)]
    pub final_contents_fetch: bool,

    /// Per-request timeout. Unset means wait as long as the backend takes.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Bearer token sent with every request
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_server_url() -> String {
    "https://worksheets.codalab.org".to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_summary_lines() -> u32 {
    DEFAULT_SUMMARY_LINES
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            poll_interval_ms: default_poll_interval_ms(),
            keepalive_interval_ms: default_poll_interval_ms(),
            summary_head_lines: default_summary_lines(),
            summary_tail_lines: default_summary_lines(),
            summary_error_policy: SummaryErrorPolicy::default(),
            final_contents_fetch: false,
            request_timeout_secs: None,
            auth_token: None,
        }
    }
}

impl SyncConfig {
    /// Environment variable for config path override
    pub const ENV_CONFIG_PATH: &'static str = "BUNDLESYNC_CONFIG";

    /// Environment variable overriding `server_url`
    pub const ENV_SERVER: &'static str = "BUNDLESYNC_SERVER";

    /// Environment variable overriding `auth_token`
    pub const ENV_TOKEN: &'static str = "BUNDLESYNC_TOKEN";

    pub const DEFAULT_CONFIG_FILENAME: &'static str = "config.toml";

    /// Load configuration
    ///
    /// Resolution order:
    /// 1. `BUNDLESYNC_CONFIG` environment variable
    /// 2. `~/.config/bundlesync/config.toml`
    ///
    /// If the file doesn't exist, defaults are used. Environment overrides
    /// are applied last in both cases.
    pub fn load() -> Result<Self> {
        let path = Self::resolve_config_path();

        let mut cfg = if path.exists() {
            Self::load_from_path(&path)?
        } else {
            tracing::debug!(path = %path.display(), "config not found, using defaults");
            Self::default()
        };

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load an explicitly named file. Unlike [`SyncConfig::load`], a missing
    /// file is an error. Environment overrides still apply.
    pub fn load_explicit(path: &Path) -> Result<Self> {
        let mut cfg = Self::load_from_path(path)?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: SyncConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|h| {
                h.join(".config")
                    .join("bundlesync")
                    .join(Self::DEFAULT_CONFIG_FILENAME)
            })
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(server) = std::env::var(Self::ENV_SERVER)
            && !server.trim().is_empty()
        {
            self.server_url = server.trim().to_string();
        }
        if let Ok(token) = std::env::var(Self::ENV_TOKEN)
            && !token.trim().is_empty()
        {
            self.auth_token = Some(token.trim().to_string());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.keepalive_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "keepalive_interval_ms must be greater than zero".to_string(),
            ));
        }
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "server_url must be an http(s) URL, got {:?}",
                self.server_url
            )));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// REST root, without a trailing slash.
    pub fn rest_root(&self) -> String {
        format!("{}/rest", self.server_url.trim_end_matches('/'))
    }
}
