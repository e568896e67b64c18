//! Gate Configuration - cameras, timing and plate grammar as TOML values
//!
//! Each section implements `Default` with the values the system ships with,
//! so an empty or missing file yields a runnable (camera-less) daemon.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::types::{
    ActuatorEndpoint, CameraSession, FeedEndpoint, GateDirection, OpenPolicy, SessionEndpoints,
    StreamEndpoint,
};

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "PARKGATE_CONFIG";

/// Config file looked up in the working directory when the env var is unset.
pub const LOCAL_CONFIG_FILE: &str = "parkgate.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one parkgate deployment.
///
/// Load with `GateConfig::load()` which searches:
/// 1. `$PARKGATE_CONFIG` env var
/// 2. `./parkgate.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GateConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Debounce, staleness, reconnect and keepalive timing
    #[serde(default)]
    pub timing: TimingConfig,

    /// Plate grammar
    #[serde(default)]
    pub plate: PlateConfig,

    /// Gate decision log
    #[serde(default)]
    pub history: HistoryConfig,

    /// Registered cameras
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
}

impl GateConfig {
    /// Load configuration using the standard search order:
    /// 1. `$PARKGATE_CONFIG` environment variable
    /// 2. `./parkgate.toml` in the current working directory
    /// 3. Built-in defaults
    ///
    /// Returns the config and the path it came from (if any), so the
    /// watcher knows what to poll.
    pub fn load() -> (Self, Option<PathBuf>) {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), cameras = config.cameras.len(), "Loaded gate config from PARKGATE_CONFIG");
                        return (config, Some(p));
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from PARKGATE_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "PARKGATE_CONFIG points to non-existent file, falling back");
            }
        }

        // 2. Check ./parkgate.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(cameras = config.cameras.len(), "Loaded gate config from ./parkgate.toml");
                    return (config, Some(local));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./parkgate.toml, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No parkgate.toml found, using built-in defaults (no cameras)");
        (Self::default(), None)
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys only warn.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        for w in super::validation::suspicious_values(&config) {
            warn!("{}", w);
        }
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate the whole config, collecting every problem.
    ///
    /// Rules:
    /// - Camera ids must be unique and non-empty
    /// - Endpoint URLs must use the expected scheme
    /// - Timers must be non-zero (auto-close excepted)
    /// - Plate patterns must compile
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let t = &self.timing;
        for (name, value) in [
            ("timing.debounce_ms", t.debounce_ms),
            ("timing.staleness_ms", t.staleness_ms),
            ("timing.video_reconnect_ms", t.video_reconnect_ms),
            ("timing.stream_check_ms", t.stream_check_ms),
            ("timing.feed_reconnect_ms", t.feed_reconnect_ms),
            ("timing.keepalive_ms", t.keepalive_ms),
            ("timing.actuator_timeout_secs", t.actuator_timeout_secs),
        ] {
            if value == 0 {
                errors.push(format!("{} must be > 0", name));
            }
        }

        if self.plate.patterns.is_empty() {
            errors.push("plate.patterns must contain at least one pattern".to_string());
        }
        for pattern in &self.plate.patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(format!("plate.patterns: invalid pattern '{}': {}", pattern, e));
            }
        }

        if let Some(url) = self.history.forward_url.as_deref() {
            check_scheme(url, &["http://", "https://"], "history.forward_url", &mut errors);
        }

        let mut seen = HashSet::new();
        for cam in &self.cameras {
            if cam.id.trim().is_empty() {
                errors.push("cameras: id must not be empty".to_string());
                continue;
            }
            if !seen.insert(cam.id.as_str()) {
                errors.push(format!("cameras: duplicate id '{}'", cam.id));
            }
            if let Some(ref s) = cam.stream {
                check_scheme(&s.base_url, &["http://", "https://"], &format!("cameras[{}].stream.base_url", cam.id), &mut errors);
            }
            if let Some(ref f) = cam.feed {
                check_scheme(&f.ws_url, &["ws://", "wss://"], &format!("cameras[{}].feed.ws_url", cam.id), &mut errors);
            }
            if let Some(ref a) = cam.actuator {
                check_scheme(&a.base_url, &["http://", "https://"], &format!("cameras[{}].actuator.base_url", cam.id), &mut errors);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Sessions for every enabled camera.
    pub fn enabled_sessions(&self) -> Vec<CameraSession> {
        self.cameras
            .iter()
            .filter(|c| c.enabled)
            .map(CameraConfig::to_session)
            .collect()
    }
}

fn check_scheme(url: &str, schemes: &[&str], field: &str, errors: &mut Vec<String>) {
    if !schemes.iter().any(|s| url.starts_with(s)) {
        errors.push(format!(
            "{} = '{}' must start with one of {:?}",
            field, url, schemes
        ));
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
    /// Reload requested but the running config did not come from a file
    NoSource,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
            ConfigError::NoSource => write!(f, "No config file to reload (running on defaults)"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Operator API bind address
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

fn default_server_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}

// ============================================================================
// Timing
// ============================================================================

/// Every timer in the pipeline, in milliseconds unless suffixed otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimingConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_staleness_ms")]
    pub staleness_ms: u64,
    #[serde(default = "default_video_reconnect_ms")]
    pub video_reconnect_ms: u64,
    #[serde(default = "default_stream_check_ms")]
    pub stream_check_ms: u64,
    #[serde(default = "default_feed_reconnect_ms")]
    pub feed_reconnect_ms: u64,
    #[serde(default = "default_keepalive_ms")]
    pub keepalive_ms: u64,
    #[serde(default = "default_actuator_timeout_secs")]
    pub actuator_timeout_secs: u64,
    /// 0 disables auto-close
    #[serde(default)]
    pub auto_close_after_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: defaults::DEBOUNCE_MS,
            staleness_ms: defaults::STALENESS_MS,
            video_reconnect_ms: defaults::VIDEO_RECONNECT_MS,
            stream_check_ms: defaults::STREAM_CHECK_MS,
            feed_reconnect_ms: defaults::FEED_RECONNECT_MS,
            keepalive_ms: defaults::KEEPALIVE_MS,
            actuator_timeout_secs: defaults::ACTUATOR_TIMEOUT_SECS,
            auto_close_after_ms: defaults::AUTO_CLOSE_AFTER_MS,
        }
    }
}

impl TimingConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_millis(self.staleness_ms)
    }

    pub fn video_reconnect(&self) -> Duration {
        Duration::from_millis(self.video_reconnect_ms)
    }

    pub fn stream_check(&self) -> Duration {
        Duration::from_millis(self.stream_check_ms)
    }

    pub fn feed_reconnect(&self) -> Duration {
        Duration::from_millis(self.feed_reconnect_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }

    pub fn actuator_timeout(&self) -> Duration {
        Duration::from_secs(self.actuator_timeout_secs)
    }

    pub fn auto_close_after(&self) -> Option<Duration> {
        (self.auto_close_after_ms > 0).then(|| Duration::from_millis(self.auto_close_after_ms))
    }
}

fn default_debounce_ms() -> u64 {
    defaults::DEBOUNCE_MS
}
fn default_staleness_ms() -> u64 {
    defaults::STALENESS_MS
}
fn default_video_reconnect_ms() -> u64 {
    defaults::VIDEO_RECONNECT_MS
}
fn default_stream_check_ms() -> u64 {
    defaults::STREAM_CHECK_MS
}
fn default_feed_reconnect_ms() -> u64 {
    defaults::FEED_RECONNECT_MS
}
fn default_keepalive_ms() -> u64 {
    defaults::KEEPALIVE_MS
}
fn default_actuator_timeout_secs() -> u64 {
    defaults::ACTUATOR_TIMEOUT_SECS
}

// ============================================================================
// Plate Grammar
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlateConfig {
    /// Regexes matched against the separator-free, upper-case text
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
    #[serde(default = "default_min_length")]
    pub min_length: usize,
}

impl Default for PlateConfig {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
            min_length: defaults::MIN_PLATE_LENGTH,
        }
    }
}

fn default_patterns() -> Vec<String> {
    defaults::DEFAULT_PLATE_PATTERNS
        .iter()
        .map(|p| (*p).to_string())
        .collect()
}

fn default_min_length() -> usize {
    defaults::MIN_PLATE_LENGTH
}

// ============================================================================
// History
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// sled directory for the local decision log
    #[serde(default = "default_history_path")]
    pub path: String,
    /// Central server endpoint receiving every decision (optional)
    #[serde(default)]
    pub forward_url: Option<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
            forward_url: None,
        }
    }
}

fn default_history_path() -> String {
    defaults::HISTORY_PATH.to_string()
}

// ============================================================================
// Cameras
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub direction: GateDirection,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Prefer the annotated video stream
    #[serde(default)]
    pub annotated: bool,
    #[serde(default)]
    pub open_policy: OpenPolicy,
    #[serde(default)]
    pub stream: Option<StreamEndpoint>,
    #[serde(default)]
    pub feed: Option<FeedEndpoint>,
    #[serde(default)]
    pub actuator: Option<ActuatorEndpoint>,
}

fn default_enabled() -> bool {
    true
}

impl CameraConfig {
    pub fn to_session(&self) -> CameraSession {
        CameraSession {
            camera_id: self.id.clone(),
            name: self.name.clone().unwrap_or_else(|| self.id.clone()),
            location: self.location.clone(),
            direction: self.direction,
            annotated: self.annotated,
            open_policy: self.open_policy,
            endpoints: SessionEndpoints {
                stream: self.stream.clone(),
                feed: self.feed.clone(),
                actuator: self.actuator.clone(),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[server]
addr = "127.0.0.1:9090"

[timing]
debounce_ms = 400

[[cameras]]
id = "1"
name = "Gate A"
direction = "ENTRY"

[cameras.feed]
ws_url = "ws://edge-1:5000/ws/detections"

[cameras.actuator]
base_url = "http://edge-1:5000"

[[cameras]]
id = "2"
direction = "EXIT"
enabled = false
open_policy = "confirm"
"#;

    #[test]
    fn test_default_config_validates() {
        let config = GateConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config = GateConfig::from_toml_str("").expect("empty TOML should parse");
        assert_eq!(config.timing.debounce_ms, 500);
        assert_eq!(config.timing.staleness_ms, 1000);
        assert_eq!(config.timing.video_reconnect_ms, 4000);
        assert_eq!(config.timing.feed_reconnect_ms, 3000);
        assert_eq!(config.timing.keepalive_ms, 5000);
        assert_eq!(config.plate.min_length, 7);
        assert!(config.cameras.is_empty());
        assert_eq!(config.timing.auto_close_after(), None);
    }

    #[test]
    fn test_cameras_parse_and_map_to_sessions() {
        let config = GateConfig::from_toml_str(SAMPLE).expect("sample should parse");
        assert_eq!(config.server.addr, "127.0.0.1:9090");
        assert_eq!(config.timing.debounce_ms, 400);
        // Non-overridden values retain defaults
        assert_eq!(config.timing.staleness_ms, 1000);

        let sessions = config.enabled_sessions();
        assert_eq!(sessions.len(), 1, "disabled camera must be skipped");
        let s = &sessions[0];
        assert_eq!(s.camera_id, "1");
        assert_eq!(s.name, "Gate A");
        assert_eq!(s.direction, GateDirection::Entry);
        assert_eq!(s.open_policy, OpenPolicy::Auto);
        let actuator = s.endpoints.actuator.as_ref().unwrap();
        assert_eq!(actuator.open_url(), "http://edge-1:5000/api/open-barrier");
        assert!(s.endpoints.stream.is_none());
        assert_eq!(config.cameras[1].open_policy, OpenPolicy::Confirm);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let toml_str = r#"
[timing]
debounce_ms = 0

[plate]
patterns = ["^[0-9"]

[[cameras]]
id = "1"
[cameras.feed]
ws_url = "http://wrong-scheme"

[[cameras]]
id = "1"
"#;
        let err = GateConfig::from_toml_str(toml_str).unwrap_err();
        match err {
            ConfigError::Validation(errors) => {
                assert!(errors.iter().any(|e| e.contains("timing.debounce_ms")));
                assert!(errors.iter().any(|e| e.contains("invalid pattern")));
                assert!(errors.iter().any(|e| e.contains("feed.ws_url")));
                assert!(errors.iter().any(|e| e.contains("duplicate id '1'")));
            }
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = GateConfig::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml().unwrap();
        let again = GateConfig::from_toml_str(&text).unwrap();
        assert_eq!(again.cameras, config.cameras);
        assert_eq!(again.timing, config.timing);
    }
}
