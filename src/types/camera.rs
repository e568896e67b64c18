//! Camera session and endpoint descriptors

use serde::{Deserialize, Serialize};

// ============================================================================
// Gate Direction / Open Policy
// ============================================================================

/// Which way vehicles pass the barrier guarded by a camera.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateDirection {
    #[default]
    Entry,
    Exit,
}

impl std::fmt::Display for GateDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateDirection::Entry => write!(f, "ENTRY"),
            GateDirection::Exit => write!(f, "EXIT"),
        }
    }
}

/// How a valid resolved plate turns into an open command.
///
/// - **Auto**: the controller opens after the debounce delay.
/// - **Confirm**: the controller waits for an explicit operator open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OpenPolicy {
    #[default]
    Auto,
    Confirm,
}

// ============================================================================
// Endpoint Descriptors
// ============================================================================

/// Video stream proxy (signalling) endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamEndpoint {
    /// Base URL of the stream proxy, e.g. `http://central:8000`
    pub base_url: String,
    /// Whether the proxy can serve the annotated (overlay-burned) stream
    #[serde(default = "default_true")]
    pub supports_annotated: bool,
}

impl StreamEndpoint {
    /// Offer URL for one camera: `{base}/api/cameras/{id}/offer[?annotated=true]`.
    pub fn offer_url(&self, camera_id: &str, annotated: bool) -> String {
        let base = self.base_url.trim_end_matches('/');
        if annotated && self.supports_annotated {
            format!("{}/api/cameras/{}/offer?annotated=true", base, camera_id)
        } else {
            format!("{}/api/cameras/{}/offer", base, camera_id)
        }
    }
}

/// Detection feed (push channel) endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedEndpoint {
    /// WebSocket URL, e.g. `ws://edge-1:5000/ws/detections`
    pub ws_url: String,
}

/// Barrier actuator HTTP control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActuatorEndpoint {
    /// Base URL of the edge backend driving the barrier
    pub base_url: String,
    #[serde(default = "default_open_path")]
    pub open_path: String,
    #[serde(default = "default_close_path")]
    pub close_path: String,
    #[serde(default = "default_status_path")]
    pub status_path: String,
}

impl ActuatorEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            open_path: default_open_path(),
            close_path: default_close_path(),
            status_path: default_status_path(),
        }
    }

    pub fn open_url(&self) -> String {
        self.join(&self.open_path)
    }

    pub fn close_url(&self) -> String {
        self.join(&self.close_path)
    }

    pub fn status_url(&self) -> String {
        self.join(&self.status_path)
    }

    fn join(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn default_true() -> bool {
    true
}

fn default_open_path() -> String {
    "/api/open-barrier".to_string()
}

fn default_close_path() -> String {
    "/api/close-barrier".to_string()
}

fn default_status_path() -> String {
    "/api/barrier/status".to_string()
}

/// The three endpoint descriptors of a camera; the only part of a
/// [`CameraSession`] that configuration may change at runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEndpoints {
    pub stream: Option<StreamEndpoint>,
    pub feed: Option<FeedEndpoint>,
    pub actuator: Option<ActuatorEndpoint>,
}

// ============================================================================
// Camera Session
// ============================================================================

/// One registered camera guarding one barrier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraSession {
    pub camera_id: String,
    pub name: String,
    pub location: Option<String>,
    pub direction: GateDirection,
    /// Prefer the annotated video stream when the proxy supports it
    pub annotated: bool,
    pub open_policy: OpenPolicy,
    pub endpoints: SessionEndpoints,
}

impl CameraSession {
    pub fn new(camera_id: impl Into<String>, direction: GateDirection) -> Self {
        let camera_id = camera_id.into();
        Self {
            name: camera_id.clone(),
            camera_id,
            location: None,
            direction,
            annotated: false,
            open_policy: OpenPolicy::Auto,
            endpoints: SessionEndpoints::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: SessionEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_policy(mut self, policy: OpenPolicy) -> Self {
        self.open_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_url_annotated_only_when_supported() {
        let mut ep = StreamEndpoint {
            base_url: "http://central:8000/".to_string(),
            supports_annotated: true,
        };
        assert_eq!(
            ep.offer_url("7", true),
            "http://central:8000/api/cameras/7/offer?annotated=true"
        );
        ep.supports_annotated = false;
        assert_eq!(ep.offer_url("7", true), "http://central:8000/api/cameras/7/offer");
    }

    #[test]
    fn test_actuator_urls_join_cleanly() {
        let ep = ActuatorEndpoint::new("http://edge-1:5000/");
        assert_eq!(ep.open_url(), "http://edge-1:5000/api/open-barrier");
        assert_eq!(ep.close_url(), "http://edge-1:5000/api/close-barrier");
        assert_eq!(ep.status_url(), "http://edge-1:5000/api/barrier/status");
    }

    #[test]
    fn test_direction_serializes_uppercase() {
        let json = serde_json::to_string(&GateDirection::Exit).unwrap();
        assert_eq!(json, "\"EXIT\"");
    }
}
