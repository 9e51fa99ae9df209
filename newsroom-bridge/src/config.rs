//! Client configuration
//!
//! Layered with figment: built-in defaults, then the file named by
//! `NEWSROOM_CONFIG_PATH` (default `newsroom.toml`, optional; TOML, YAML or
//! JSON by extension), then `NEWSROOM_`-prefixed environment variables.
//! Nested keys use `__`, e.g. `NEWSROOM_RECONNECT__MAX_ATTEMPTS=3`.

use crate::alerts::DEFAULT_DISPLAY_DURATION;
use crate::error::{BridgeError, BridgeResult};
use crate::playback::OverflowPolicy;
use crate::reconnect::ReconnectPolicy;
use crate::scheduler::SchedulerConfig;
use crate::video_cache::DEFAULT_MAX_AGE;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "NEWSROOM_CONFIG_PATH";

const DEFAULT_CONFIG_FILE: &str = "newsroom.toml";

/// Top-level client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Backend WebSocket endpoint
    pub ws_url: String,
    pub log_level: String,
    pub reconnect: ReconnectPolicy,
    pub playback: PlaybackConfig,
    pub video: VideoConfig,
    pub alerts: AlertConfig,
    pub stream: StreamConfig,
    pub cache: CacheConfig,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8080/ws".to_string(),
            log_level: "info".to_string(),
            reconnect: ReconnectPolicy::default(),
            playback: PlaybackConfig::default(),
            video: VideoConfig::default(),
            alerts: AlertConfig::default(),
            stream: StreamConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Maximum buffered chunks
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

/// Clip generation and scheduling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub purge_interval_secs: u64,
    pub max_job_age_secs: u64,
    pub play_timeout_secs: u64,
    /// Clip generation endpoint
    pub generate_url: String,
    pub request_timeout_secs: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        let scheduler = SchedulerConfig::default();
        Self {
            enabled: scheduler.enabled,
            poll_interval_ms: scheduler.poll_interval_ms,
            purge_interval_secs: scheduler.purge_interval_secs,
            max_job_age_secs: scheduler.max_job_age_secs,
            play_timeout_secs: scheduler.play_timeout_secs,
            generate_url: "http://localhost:8080/api/generate-video".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl VideoConfig {
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            enabled: self.enabled,
            poll_interval_ms: self.poll_interval_ms,
            purge_interval_secs: self.purge_interval_secs,
            max_job_age_secs: self.max_job_age_secs,
            play_timeout_secs: self.play_timeout_secs,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub display_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            display_ms: DEFAULT_DISPLAY_DURATION.as_millis() as u64,
        }
    }
}

impl AlertConfig {
    pub fn display_duration(&self) -> Duration {
        Duration::from_millis(self.display_ms)
    }
}

/// Stream parameters requested on open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub quality: String,
    pub format: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            quality: "720p".to_string(),
            format: "webm".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Cache file; the user cache directory when unset
    pub path: Option<PathBuf>,
    pub max_age_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            max_age_hours: DEFAULT_MAX_AGE.as_secs() / 3600,
        }
    }
}

impl CacheConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_hours * 3600)
    }
}

impl BroadcastConfig {
    /// Load from defaults, the config file, and the environment
    pub fn load() -> BridgeResult<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> BridgeResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if path.exists() {
            debug!("Loading config from {}", path.display());
            figment = match path.extension().and_then(|s| s.to_str()) {
                Some("yaml") | Some("yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => figment.merge(Toml::file(path)),
            };
        } else {
            debug!("No config file at {}, using defaults", path.display());
        }

        let figment = figment.merge(Env::prefixed("NEWSROOM_").ignore(&["config_path"]).split("__"));
        Self::from_figment(figment)
    }

    /// Extract and validate from an already layered figment
    pub fn from_figment(figment: Figment) -> BridgeResult<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.ws_url.trim().is_empty() {
            return Err(BridgeError::Config("ws_url must not be empty".to_string()));
        }
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(BridgeError::Config(format!(
                "ws_url must be a ws:// or wss:// URL, got {}",
                self.ws_url
            )));
        }
        if self.playback.capacity == 0 {
            return Err(BridgeError::Config("playback.capacity must be at least 1".to_string()));
        }
        if self.video.poll_interval_ms == 0 {
            return Err(BridgeError::Config(
                "video.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.reconnect.base_delay_ms > self.reconnect.max_delay_ms {
            return Err(BridgeError::Config(
                "reconnect.base_delay_ms exceeds reconnect.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}
