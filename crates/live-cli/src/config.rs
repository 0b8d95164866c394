//! TOML configuration file schema and parsing.
//!
//! Every field has a default, so the file itself is optional. Environment
//! variables are applied on top of whatever the file says.
//!
//! Example config file:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8000"
//! log_format = "json"
//!
//! [twitch]
//! client_id = "abc123"
//! auth_key = "secret-token"
//!
//! [poll]
//! interval_secs = 60
//! max_concurrent_probes = 4
//!
//! [storage]
//! snapshot_path = "save_data.json"
//! seed_path = "channels.txt"
//!
//! [webhook]
//! url = "https://discord.com/api/webhooks/..."
//! role_id = "1305260106417569812"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use live_core::{HelixCredentials, HelixProbe, PollConfig, WebhookConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },
    #[error("Missing required setting {0}")]
    Missing(&'static str),
    #[error("{0}")]
    Invalid(String),
}

/// What the loaded config is about to be used for. Each command needs a
/// different subset of settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Run,
    Add,
    Status,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub twitch: TwitchConfig,

    #[serde(default)]
    pub poll: PollSection,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub webhook: WebhookSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The API server only starts when a listen address is configured.
    #[serde(default)]
    pub listen: Option<SocketAddr>,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: None,
            log_format: default_log_format(),
        }
    }
}

fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitchConfig {
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub auth_key: Option<String>,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Where records with a missing live flag are saved. Unset disables it.
    #[serde(default = "default_archive_dir")]
    pub archive_dir: Option<PathBuf>,
}

impl Default for TwitchConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            auth_key: None,
            api_base: default_api_base(),
            archive_dir: default_archive_dir(),
        }
    }
}

fn default_api_base() -> String {
    HelixProbe::DEFAULT_API_BASE.into()
}

fn default_archive_dir() -> Option<PathBuf> {
    Some(PathBuf::from("troubleshooting"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollSection {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_true")]
    pub jitter: bool,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            jitter: true,
            request_timeout_ms: default_request_timeout_ms(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_concurrent_probes: default_max_concurrent_probes(),
        }
    }
}

fn default_interval_secs() -> u64 {
    60
}

/// One week. Longer intervals are treated as a misconfiguration.
const MAX_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

fn default_true() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_max_concurrent_probes() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    #[serde(default)]
    pub seed_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            seed_path: None,
        }
    }
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("save_data.json")
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookSection {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub role_id: Option<String>,

    #[serde(default)]
    pub channel_url_base: Option<String>,

    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default)]
    pub secret: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn check_http_url(what: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value)
        .map_err(|e| ConfigError::Invalid(format!("Invalid {}: {} ({})", what, value, e)))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::Invalid(format!(
            "{} must use http or https: {}",
            what, value
        )));
    }
    Ok(())
}

impl AppConfig {
    /// Reads the file when one is given, then applies the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overrides file values with the environment variables the service has
    /// always been configured through.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CLIENT_ID") {
            self.twitch.client_id = Some(v);
        }
        if let Some(v) = get("AUTH_KEY") {
            self.twitch.auth_key = Some(v);
        }
        if let Some(v) = get("DISCORD_WEBHOOK_URL") {
            self.webhook.url = Some(v);
        }
        if let Some(v) = get("TWITCH_ROLE_ID") {
            self.webhook.role_id = Some(v);
        }
        if let Some(v) = get("CHANNEL_LIST") {
            self.storage.seed_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("SAVE_FILE") {
            self.storage.snapshot_path = PathBuf::from(v);
        }
        if let Some(v) = get("UPDATE_DELAY_MIN") {
            let minutes: f64 = v.trim().parse().map_err(|_| ConfigError::Env {
                var: "UPDATE_DELAY_MIN",
                value: v.clone(),
            })?;
            if !minutes.is_finite() || minutes <= 0.0 || minutes * 60.0 > MAX_INTERVAL_SECS as f64 {
                return Err(ConfigError::Env {
                    var: "UPDATE_DELAY_MIN",
                    value: v,
                });
            }
            self.poll.interval_secs = ((minutes * 60.0).round() as u64).max(1);
        }
        Ok(())
    }

    pub fn validate(&self, purpose: Purpose) -> Result<(), ConfigError> {
        match self.server.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "Invalid log_format '{}': must be 'pretty' or 'json'",
                    other
                )));
            }
        }

        if self.poll.interval_secs == 0 {
            return Err(ConfigError::Invalid("poll.interval_secs must be at least 1".into()));
        }
        if self.poll.interval_secs > MAX_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "poll.interval_secs must be at most {}",
                MAX_INTERVAL_SECS
            )));
        }

        if purpose == Purpose::Status {
            return Ok(());
        }

        if non_empty(&self.twitch.client_id).is_none() {
            return Err(ConfigError::Missing("twitch.client_id (CLIENT_ID)"));
        }
        if non_empty(&self.twitch.auth_key).is_none() {
            return Err(ConfigError::Missing("twitch.auth_key (AUTH_KEY)"));
        }
        check_http_url("twitch.api_base", &self.twitch.api_base)?;

        if purpose == Purpose::Run {
            match non_empty(&self.webhook.url) {
                Some(url) => check_http_url("webhook URL", url)?,
                None => return Err(ConfigError::Missing("webhook.url (DISCORD_WEBHOOK_URL)")),
            }
        }

        Ok(())
    }

    pub fn poll_config(&self) -> PollConfig {
        let mut c = PollConfig::default()
            .with_poll_interval(Duration::from_secs(self.poll.interval_secs))
            .with_jitter(self.poll.jitter)
            .with_request_timeout(Duration::from_millis(self.poll.request_timeout_ms))
            .with_max_attempts(self.poll.max_attempts)
            .with_retry_backoff(Duration::from_millis(self.poll.retry_backoff_ms))
            .with_max_concurrent_probes(self.poll.max_concurrent_probes)
            .with_snapshot_path(&self.storage.snapshot_path);
        if let Some(seed) = &self.storage.seed_path {
            c = c.with_seed_path(seed);
        }
        c
    }

    pub fn credentials(&self) -> Result<HelixCredentials, ConfigError> {
        let client_id = non_empty(&self.twitch.client_id)
            .ok_or(ConfigError::Missing("twitch.client_id (CLIENT_ID)"))?;
        let auth_key = non_empty(&self.twitch.auth_key)
            .ok_or(ConfigError::Missing("twitch.auth_key (AUTH_KEY)"))?;
        Ok(HelixCredentials {
            client_id: client_id.to_string(),
            auth_key: auth_key.to_string(),
        })
    }

    pub fn webhook_config(&self) -> Result<WebhookConfig, ConfigError> {
        let url = non_empty(&self.webhook.url)
            .ok_or(ConfigError::Missing("webhook.url (DISCORD_WEBHOOK_URL)"))?;
        let mut c = WebhookConfig::new(url);
        if let Some(role) = non_empty(&self.webhook.role_id) {
            c = c.with_role_id(role);
        }
        if let Some(base) = non_empty(&self.webhook.channel_url_base) {
            c.channel_url_base = base.to_string();
        }
        if let Some(ms) = self.webhook.timeout_ms {
            c.timeout_ms = ms;
        }
        c.secret = non_empty(&self.webhook.secret).map(str::to_string);
        Ok(c)
    }
}
