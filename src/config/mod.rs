//! Gate Configuration Module
//!
//! Cameras, timers and the plate grammar, loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `PARKGATE_CONFIG` environment variable (path to TOML file)
//! 2. `parkgate.toml` in the current working directory
//! 3. Built-in defaults (no cameras)
//!
//! ## Usage
//!
//! ```ignore
//! // In main():
//! let (cfg, path) = GateConfig::load();
//! config::init(cfg, path);
//!
//! // Anywhere:
//! let debounce = config::get().timing.debounce();
//! ```
//!
//! Unlike a write-once global, the config can be swapped at runtime by the
//! watcher; `get()` hands out an `Arc` snapshot so readers never observe a
//! half-applied reload.

mod gate_config;
pub mod defaults;
pub mod validation;
pub mod watcher;

pub use gate_config::*;

use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

static GATE_CONFIG: OnceLock<ArcSwap<GateConfig>> = OnceLock::new();
static CONFIG_PATH: OnceLock<Option<PathBuf>> = OnceLock::new();

fn slot() -> &'static ArcSwap<GateConfig> {
    GATE_CONFIG.get_or_init(|| ArcSwap::from_pointee(GateConfig::default()))
}

/// Initialize the global configuration and remember where it came from.
///
/// A second call replaces the config but keeps the first path.
pub fn init(config: GateConfig, path: Option<PathBuf>) {
    if CONFIG_PATH.set(path).is_err() {
        tracing::warn!("config::init() called more than once, replacing config only");
    }
    slot().store(Arc::new(config));
}

/// Current configuration snapshot. Built-in defaults until `init()` runs.
pub fn get() -> Arc<GateConfig> {
    slot().load_full()
}

pub fn is_initialized() -> bool {
    CONFIG_PATH.get().is_some()
}

/// Path the running config was loaded from, if any.
pub fn source_path() -> Option<PathBuf> {
    CONFIG_PATH.get().cloned().flatten()
}

/// Re-read the config file and swap it in.
///
/// On any error the previous config stays active.
pub fn reload() -> Result<(Arc<GateConfig>, Vec<ConfigChange>), ConfigError> {
    let path = source_path().ok_or(ConfigError::NoSource)?;
    let fresh = Arc::new(GateConfig::load_from_file(&path)?);
    let previous = slot().swap(fresh.clone());
    let changes = diff(&previous, &fresh);
    tracing::info!(path = %path.display(), changes = changes.len(), "Config reloaded");
    Ok((fresh, changes))
}

// ============================================================================
// Change Detection
// ============================================================================

/// One difference between two configs, as far as running pipelines care.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChange {
    CameraAdded(String),
    CameraRemoved(String),
    /// Only endpoint descriptors changed; applied in place
    EndpointsChanged(String),
    /// Identity, direction or policy changed; the pipeline restarts
    CameraChanged(String),
    Timing,
    PlateGrammar,
    /// Needs a process restart
    Server,
    /// Needs a process restart
    History,
}

/// Compute what changed between `old` and `new`.
///
/// Disabled cameras count as removed, re-enabled ones as added.
pub fn diff(old: &GateConfig, new: &GateConfig) -> Vec<ConfigChange> {
    let mut changes = Vec::new();

    let enabled = |c: &GateConfig| {
        c.cameras
            .iter()
            .filter(|cam| cam.enabled)
            .map(|cam| (cam.id.clone(), cam.clone()))
            .collect::<std::collections::BTreeMap<_, _>>()
    };
    let before = enabled(old);
    let after = enabled(new);

    for (id, cam) in &after {
        match before.get(id) {
            None => changes.push(ConfigChange::CameraAdded(id.clone())),
            Some(prev) if prev == cam => {}
            Some(prev) => {
                let mut same_identity = prev.clone();
                same_identity.stream = cam.stream.clone();
                same_identity.feed = cam.feed.clone();
                same_identity.actuator = cam.actuator.clone();
                if &same_identity == cam {
                    changes.push(ConfigChange::EndpointsChanged(id.clone()));
                } else {
                    changes.push(ConfigChange::CameraChanged(id.clone()));
                }
            }
        }
    }
    for id in before.keys() {
        if !after.contains_key(id) {
            changes.push(ConfigChange::CameraRemoved(id.clone()));
        }
    }

    if old.timing != new.timing {
        changes.push(ConfigChange::Timing);
    }
    if old.plate != new.plate {
        changes.push(ConfigChange::PlateGrammar);
    }
    if old.server.addr != new.server.addr {
        changes.push(ConfigChange::Server);
    }
    if old.history.path != new.history.path || old.history.forward_url != new.history.forward_url
    {
        changes.push(ConfigChange::History);
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> GateConfig {
        GateConfig::from_toml_str(s).unwrap()
    }

    #[test]
    fn test_diff_classifies_camera_changes() {
        let old = parse(
            r#"
[[cameras]]
id = "1"
[cameras.actuator]
base_url = "http://a:5000"

[[cameras]]
id = "2"

[[cameras]]
id = "3"
direction = "ENTRY"
"#,
        );
        let new = parse(
            r#"
[[cameras]]
id = "1"
[cameras.actuator]
base_url = "http://b:5000"

[[cameras]]
id = "3"
direction = "EXIT"

[[cameras]]
id = "4"
"#,
        );

        let changes = diff(&old, &new);
        assert!(changes.contains(&ConfigChange::EndpointsChanged("1".into())));
        assert!(changes.contains(&ConfigChange::CameraRemoved("2".into())));
        assert!(changes.contains(&ConfigChange::CameraChanged("3".into())));
        assert!(changes.contains(&ConfigChange::CameraAdded("4".into())));
        assert_eq!(changes.len(), 4);
    }

    #[test]
    fn test_disabling_a_camera_removes_it() {
        let old = parse("[[cameras]]\nid = \"1\"\n");
        let new = parse("[[cameras]]\nid = \"1\"\nenabled = false\n");
        assert_eq!(diff(&old, &new), vec![ConfigChange::CameraRemoved("1".into())]);
    }

    #[test]
    fn test_identical_configs_have_no_changes() {
        let cfg = parse("[timing]\ndebounce_ms = 700\n");
        assert!(diff(&cfg, &cfg.clone()).is_empty());
    }

    #[test]
    fn test_get_before_init_returns_defaults() {
        // May observe a config installed by another test; defaults always validate.
        assert!(get().validate().is_ok());
    }
}
