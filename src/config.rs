//! Configuration loading for dashsync.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Longest accepted fade window for recently completed work, one day.
pub const MAX_FADE_WINDOW_SECS: i64 = 86_400;

/// Get the dashsync home directory (~/.dashsync).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".dashsync"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.dashsync/settings.json
pub fn load_settings() -> Result<Settings> {
    let path = get_settings_path()?;
    load_settings_from(&path)
}

/// Load and validate settings from an explicit path.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;

    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Load settings or return default if not found.
pub fn load_settings_or_default() -> Settings {
    load_settings().unwrap_or_else(|e| {
        tracing::warn!("Failed to load settings: {}, using defaults", e);
        Settings::default()
    })
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    settings.server.base_url()?;
    settings.server.socket_url()?;

    let timing = &settings.timing;
    for (name, value) in [
        ("timing.reconnect_delay_ms", timing.reconnect_delay_ms),
        ("timing.agent_poll_ms", timing.agent_poll_ms),
        ("timing.tick_ms", timing.tick_ms),
        ("timing.slow_poll_ms", timing.slow_poll_ms),
        ("timing.connect_timeout_ms", timing.connect_timeout_ms),
        ("timing.request_timeout_ms", timing.request_timeout_ms),
        ("timing.keepalive_ms", timing.keepalive_ms),
    ] {
        if value == 0 {
            return Err(Error::Config(format!("{} must be greater than 0", name)));
        }
    }

    let limits = &settings.limits;
    if limits.status_cap == 0 || limits.feed_cap == 0 {
        return Err(Error::Config(
            "limits.status_cap and limits.feed_cap must be greater than 0".to_string(),
        ));
    }
    if !(1..=MAX_FADE_WINDOW_SECS).contains(&limits.fade_window_secs) {
        return Err(Error::Config(format!(
            "limits.fade_window_secs must be within 1..={}, got {}",
            MAX_FADE_WINDOW_SECS, limits.fade_window_secs
        )));
    }
    if !(0.0..=1.0).contains(&limits.fade_floor) {
        return Err(Error::Config(format!(
            "limits.fade_floor must be within 0.0..=1.0, got {}",
            limits.fade_floor
        )));
    }
    Ok(())
}

/// Server endpoint configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Server {
    #[serde(default = "default_server_url")]
    pub url: String,
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_socket_path() -> String {
    "/ws".to_string()
}

impl Default for Server {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            socket_path: default_socket_path(),
        }
    }
}

impl Server {
    /// Base URL for the REST endpoints.
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.url)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::Config(format!(
                "server.url must be http or https, got '{}'",
                other
            ))),
        }
    }

    /// Push channel URL derived from the base URL (http -> ws, https -> wss).
    pub fn socket_url(&self) -> Result<Url> {
        let mut url = self.base_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| Error::Config(format!("Cannot derive socket URL from {}", self.url)))?;
        url.set_path(&self.socket_path);
        Ok(url)
    }
}

/// Timer and timeout configuration, all in milliseconds.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Timing {
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_agent_poll_ms")]
    pub agent_poll_ms: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_slow_poll_ms")]
    pub slow_poll_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_keepalive_ms")]
    pub keepalive_ms: u64,
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_agent_poll_ms() -> u64 {
    2_000
}

fn default_tick_ms() -> u64 {
    1_000
}

fn default_slow_poll_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_keepalive_ms() -> u64 {
    30_000
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            agent_poll_ms: default_agent_poll_ms(),
            tick_ms: default_tick_ms(),
            slow_poll_ms: default_slow_poll_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            keepalive_ms: default_keepalive_ms(),
        }
    }
}

impl Timing {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn agent_poll(&self) -> Duration {
        Duration::from_millis(self.agent_poll_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn slow_poll(&self) -> Duration {
        Duration::from_millis(self.slow_poll_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }
}

/// Collection caps and presentation windows.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Limits {
    #[serde(default = "default_status_cap")]
    pub status_cap: usize,
    #[serde(default = "default_feed_cap")]
    pub feed_cap: usize,
    #[serde(default = "default_feed_fetch_limit")]
    pub feed_fetch_limit: usize,
    #[serde(default = "default_recent_cap")]
    pub recent_cap: usize,
    #[serde(default = "default_fade_window_secs")]
    pub fade_window_secs: i64,
    #[serde(default = "default_fade_floor")]
    pub fade_floor: f32,
}

fn default_status_cap() -> usize {
    200
}

fn default_feed_cap() -> usize {
    500
}

fn default_feed_fetch_limit() -> usize {
    100
}

fn default_recent_cap() -> usize {
    5
}

fn default_fade_window_secs() -> i64 {
    60
}

fn default_fade_floor() -> f32 {
    0.3
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            status_cap: default_status_cap(),
            feed_cap: default_feed_cap(),
            feed_fetch_limit: default_feed_fetch_limit(),
            recent_cap: default_recent_cap(),
            fade_window_secs: default_fade_window_secs(),
            fade_floor: default_fade_floor(),
        }
    }
}

/// dashsync settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: Server,

    #[serde(default)]
    pub timing: Timing,

    #[serde(default)]
    pub limits: Limits,
}

impl Settings {
    /// Settings pointing at a specific server, everything else default.
    pub fn for_server(url: impl Into<String>) -> Self {
        Self {
            server: Server {
                url: url.into(),
                ..Server::default()
            },
            ..Self::default()
        }
    }
}
