//! Config validation: unknown-key detection with Levenshtein suggestions
//! and range sanity checks.
//!
//! The raw TOML is first walked as a `toml::Value` tree and compared against
//! the known key paths; serde deserialization runs afterwards. Warnings never
//! break a config that deserializes.

use std::collections::{BTreeSet, HashSet};

use super::GateConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid dotted key path of `GateConfig`.
///
/// `[[cameras]]` entries are walked with the `cameras` prefix, so a camera's
/// feed URL is `cameras.feed.ws_url` whatever its index.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [server]
        "server",
        "server.addr",
        // [timing]
        "timing",
        "timing.debounce_ms",
        "timing.staleness_ms",
        "timing.video_reconnect_ms",
        "timing.stream_check_ms",
        "timing.feed_reconnect_ms",
        "timing.keepalive_ms",
        "timing.actuator_timeout_secs",
        "timing.auto_close_after_ms",
        // [plate]
        "plate",
        "plate.patterns",
        "plate.min_length",
        // [history]
        "history",
        "history.path",
        "history.forward_url",
        // [[cameras]]
        "cameras",
        "cameras.id",
        "cameras.name",
        "cameras.location",
        "cameras.direction",
        "cameras.enabled",
        "cameras.annotated",
        "cameras.open_policy",
        "cameras.stream",
        "cameras.stream.base_url",
        "cameras.stream.supports_annotated",
        "cameras.feed",
        "cameras.feed.ws_url",
        "cameras.actuator",
        "cameras.actuator.base_url",
        "cameras.actuator.open_path",
        "cameras.actuator.close_path",
        "cameras.actuator.status_path",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively collect all dotted key paths of a `toml::Value` tree.
///
/// Tables inside arrays share the array's path, so duplicates are folded.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = BTreeSet::new();
    collect_keys(value, prefix, &mut keys);
    keys.into_iter().collect()
}

fn collect_keys(value: &toml::Value, prefix: &str, out: &mut BTreeSet<String>) {
    let Some(table) = value.as_table() else {
        return;
    };
    for (k, v) in table {
        let path = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        out.insert(path.clone());
        match v {
            toml::Value::Table(_) => collect_keys(v, &path, out),
            toml::Value::Array(items) => {
                for item in items.iter().filter(|i| i.is_table()) {
                    collect_keys(item, &path, out);
                }
            }
            _ => {}
        }
    }
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Closest known key within edit distance 3, if any.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by(|(ka, da), (kb, db)| da.cmp(db).then_with(|| ka.cmp(kb)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Warn about unknown keys in a raw TOML document. Never fails.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // serde reports parse errors
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Checks
// ============================================================================

/// Values that parse and validate but are probably mistakes.
pub fn suspicious_values(config: &GateConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let t = &config.timing;

    if t.debounce_ms > 10_000 {
        warnings.push(ValidationWarning {
            field: "timing.debounce_ms".to_string(),
            message: format!(
                "timing.debounce_ms = {} delays every auto-open by more than 10s",
                t.debounce_ms
            ),
            suggestion: None,
        });
    }

    if t.keepalive_ms >= 60_000 {
        warnings.push(ValidationWarning {
            field: "timing.keepalive_ms".to_string(),
            message: format!(
                "timing.keepalive_ms = {} is longer than most proxy idle timeouts",
                t.keepalive_ms
            ),
            suggestion: None,
        });
    }

    if config.plate.min_length < 4 {
        warnings.push(ValidationWarning {
            field: "plate.min_length".to_string(),
            message: format!(
                "plate.min_length = {} accepts fragments as plates",
                config.plate.min_length
            ),
            suggestion: None,
        });
    }

    for cam in &config.cameras {
        if cam.enabled && cam.actuator.is_none() {
            warnings.push(ValidationWarning {
                field: format!("cameras[{}].actuator", cam.id),
                message: format!(
                    "camera '{}' has no actuator endpoint; its barrier can never open",
                    cam.id
                ),
                suggestion: None,
            });
        }
    }

    warnings
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("hello", "hello"), 0);
        assert_eq!(levenshtein("debounse", "debounce"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_keys_descends_into_camera_array() {
        let toml: toml::Value = r#"
            [[cameras]]
            id = "1"
            [cameras.feed]
            ws_url = "ws://x"

            [[cameras]]
            id = "2"
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert_eq!(
            keys,
            vec!["cameras", "cameras.feed", "cameras.feed.ws_url", "cameras.id"]
        );
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let warnings = validate_unknown_keys("[timing]\ndebounse_ms = 300\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "timing.debounse_ms");
        assert_eq!(warnings[0].suggestion.as_deref(), Some("timing.debounce_ms"));
    }

    #[test]
    fn test_typo_inside_camera_table() {
        let toml_str = r#"
[[cameras]]
id = "1"
[cameras.actuator]
base_ulr = "http://edge:5000"
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings
            .iter()
            .any(|w| w.suggestion.as_deref() == Some("cameras.actuator.base_url")));
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let toml_str = r#"
[server]
addr = "0.0.0.0:9000"

[plate]
min_length = 7

[[cameras]]
id = "1"
open_policy = "confirm"
[cameras.stream]
base_url = "http://central:8000"
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.is_empty(), "Expected 0 warnings, got: {:?}", warnings);
    }

    #[test]
    fn test_garbage_key_has_no_suggestion() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_camera_without_actuator_is_suspicious() {
        let cfg = GateConfig::from_toml_str("[[cameras]]\nid = \"9\"\n").unwrap();
        let warnings = suspicious_values(&cfg);
        assert!(warnings.iter().any(|w| w.field == "cameras[9].actuator"));
        assert!(suspicious_values(&GateConfig::default()).is_empty());
    }
}
