//! Connection health of a camera's video session and detection feed

use serde::{Deserialize, Serialize};

/// Video session state reported by the stream session manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum StreamState {
    /// Negotiation in progress
    #[default]
    Connecting,
    Connected,
    /// Link lost; a reconnect is scheduled
    Disconnected,
    /// Negotiation failed (or stream not configured)
    Failed(String),
    Stopped,
}

impl StreamState {
    pub fn is_connected(&self) -> bool {
        matches!(self, StreamState::Connected)
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamState::Connecting => write!(f, "connecting"),
            StreamState::Connected => write!(f, "connected"),
            StreamState::Disconnected => write!(f, "disconnected"),
            StreamState::Failed(reason) => write!(f, "failed: {}", reason),
            StreamState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Counters for one video session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub attempts: u64,
    pub connections: u64,
    pub last_error: Option<String>,
}

/// Detection feed link state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeedLinkState {
    #[default]
    Connecting,
    Up,
    Down,
    /// Camera has no feed endpoint
    Unconfigured,
}

/// Connection health shown next to a camera ("camera offline" /
/// "stream unavailable" indicators).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ConnectionHealth {
    pub video: StreamState,
    #[serde(default)]
    pub video_stats: SessionStats,
    pub feed: FeedLinkState,
}

impl ConnectionHealth {
    /// Camera is considered online while its detection feed is up.
    pub fn is_online(&self) -> bool {
        self.feed == FeedLinkState::Up
    }
}
