//! Configuration loading for the Query Console.
//! Reads qconsole.toml from the current directory or the path in the QCONSOLE_CONFIG env var.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConsoleError, Result};

pub const CONFIG_ENV: &str = "QCONSOLE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "qconsole.toml";

/// Identifier historically sent with every request.
pub const LEGACY_QUERY_ID: &str = "47204a6b-8eb1-4d83-bcf1-2d7ba8cba740";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub console: ConsoleSection,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

// ── Upstream ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    #[serde(default = "default_interact_path")]
    pub interact_path: String,
}

fn default_base_url()      -> String { "http://localhost:8000".to_string() }
fn default_stream_path()   -> String { "/stream".to_string() }
fn default_interact_path() -> String { "/interact".to_string() }

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            stream_path: default_stream_path(),
            interact_path: default_interact_path(),
        }
    }
}

impl UpstreamConfig {
    pub fn stream_url(&self) -> String {
        join_url(&self.base_url, &self.stream_path)
    }

    pub fn interact_url(&self) -> String {
        join_url(&self.base_url, &self.interact_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

// ── HTTP ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Initial stream reconnect delay; the server may change it with `retry:`
    #[serde(default = "default_retry_ms")]
    pub retry_ms: u64,
}

fn default_request_timeout() -> u64 { 30 }
fn default_connect_timeout() -> u64 { 10 }
fn default_retry_ms()        -> u64 { 3000 }

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            retry_ms: default_retry_ms(),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }
    pub fn connect_timeout(&self) -> Duration { Duration::from_secs(self.connect_timeout_secs) }
    pub fn retry_delay(&self)     -> Duration { Duration::from_millis(self.retry_ms) }
}

// ── Console behavior ──────────────────────────────────────────────────────────

/// How the `query_id` of a submitted query is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIdPolicy {
    /// Fresh UUID v4 for every submit
    #[default]
    PerRequest,
    /// Always send `fixed_query_id`
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleSection {
    #[serde(default)]
    pub query_id: QueryIdPolicy,
    #[serde(default = "default_fixed_query_id")]
    pub fixed_query_id: String,
    #[serde(default)]
    pub clear_draft_on_submit: bool,
}

fn default_fixed_query_id() -> String { LEGACY_QUERY_ID.to_string() }

impl Default for ConsoleSection {
    fn default() -> Self {
        Self {
            query_id: QueryIdPolicy::default(),
            fixed_query_id: default_fixed_query_id(),
            clear_draft_on_submit: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Oldest entries are evicted past this many; unbounded when unset.
    #[serde(default)]
    pub max_entries: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String { "127.0.0.1:3000".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ConsoleConfig {
    /// Load `.env`, then the config file (if any), then env overrides.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let mut config = if Path::new(&path).exists() {
            tracing::info!(path = %path, "Loading configuration");
            Self::from_path(&path)?
        } else {
            tracing::info!(path = %path, "No configuration file, using defaults");
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ConsoleError::Config(e.to_string()))
    }

    /// Apply `QCONSOLE_UPSTREAM_URL` and `QCONSOLE_BIND`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("QCONSOLE_UPSTREAM_URL").filter(|s| !s.is_empty()) {
            self.upstream.base_url = url;
        }
        if let Some(bind) = lookup("QCONSOLE_BIND").filter(|s| !s.is_empty()) {
            self.server.bind = bind;
        }
    }

    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.upstream.base_url).map_err(|e| {
            ConsoleError::Config(format!("upstream.base_url {:?}: {e}", self.upstream.base_url))
        })?;
        if self.upstream.stream_path.trim().is_empty() {
            return Err(ConsoleError::Config("upstream.stream_path is empty".to_string()));
        }
        if self.upstream.interact_path.trim().is_empty() {
            return Err(ConsoleError::Config("upstream.interact_path is empty".to_string()));
        }
        if self.log.max_entries == Some(0) {
            return Err(ConsoleError::Config("log.max_entries must be at least 1".to_string()));
        }
        if self.console.query_id == QueryIdPolicy::Fixed && self.console.fixed_query_id.is_empty() {
            return Err(ConsoleError::Config("console.fixed_query_id is empty".to_string()));
        }
        Ok(())
    }
}
