//! System-wide default constants.
//!
//! Centralises the timing and sizing numbers used across the pipeline.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Gate Controller
// ============================================================================

/// Delay between a plate becoming valid and the open request (ms).
///
/// Absorbs OCR flapping between near-identical reads.
pub const DEBOUNCE_MS: u64 = 500;

/// Time without any detection after which the image/progress indicator
/// is cleared (ms). The resolved text survives until barrier close.
pub const STALENESS_MS: u64 = 1_000;

/// Auto-close delay after the barrier opened (ms). 0 disables auto-close.
pub const AUTO_CLOSE_AFTER_MS: u64 = 0;

/// Capacity of a controller's input queue (feed events + operator commands).
pub const CONTROLLER_INPUT_CAPACITY: usize = 256;

/// Capacity of a controller's notice broadcast channel.
pub const NOTICE_CAPACITY: usize = 64;

// ============================================================================
// Transport
// ============================================================================

/// Fixed delay before a video session renegotiates after a failure (ms).
pub const VIDEO_RECONNECT_MS: u64 = 4_000;

/// Interval between liveness checks of a connected signalling-only video
/// session (ms). Each check renegotiates against the stream proxy.
pub const STREAM_CHECK_MS: u64 = 10_000;

/// Fixed delay before the detection feed reconnects after a drop (ms).
pub const FEED_RECONNECT_MS: u64 = 3_000;

/// Interval between keepalive probes on the detection feed (ms).
pub const KEEPALIVE_MS: u64 = 5_000;

/// HTTP timeout for actuator calls (seconds).
pub const ACTUATOR_TIMEOUT_SECS: u64 = 10;

/// HTTP timeout for video offer/answer signalling (seconds).
pub const SIGNALLING_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Plate Grammar
// ============================================================================

/// Minimum length of a plate after stripping separators.
pub const MIN_PLATE_LENGTH: usize = 7;

/// Accepted plate shapes, matched against the separator-free text.
///
/// 2-3 digit province code, 1-2 series letters, 4-6 digit number, plus the
/// motorbike form with a digit after the series letter.
pub const DEFAULT_PLATE_PATTERNS: &[&str] = &[
    r"^[0-9]{2}[A-Z]{1,2}[0-9]{4,6}$",
    r"^[0-9]{3}[A-Z]{1,2}[0-9]{4,6}$",
    r"^[0-9]{2}[A-Z][0-9][0-9]{4,5}$",
];

// ============================================================================
// Server / Storage
// ============================================================================

/// Operator API bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:8080";

/// sled directory for the local gate decision log.
pub const HISTORY_PATH: &str = "./data/decisions";

/// Default number of decisions returned by the history endpoint.
pub const DEFAULT_DECISION_LIMIT: usize = 50;

/// Upper bound on decisions returned by the history endpoint.
pub const MAX_DECISION_LIMIT: usize = 1_000;

// ============================================================================
// Config Watcher
// ============================================================================

/// Interval between config file mtime checks (ms).
pub const CONFIG_POLL_MS: u64 = 2_000;

/// Settle delay after a detected config change before reloading (ms).
pub const CONFIG_SETTLE_MS: u64 = 500;
