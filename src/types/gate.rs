//! Gate controller state as published to operators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    BarrierState, ConnectionHealth, DetectionEvent, GateDecision, GateDirection, OpenPolicy,
    ResolvedPlate, VehicleInfo,
};

/// Controller state for one camera.
///
/// `Idle → Candidate → Requesting → Open → Closing → Idle`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateState {
    #[default]
    Idle,
    /// A valid plate is resolved; the open request is pending
    Candidate,
    /// Open request in flight
    Requesting,
    Open,
    /// Close request in flight
    Closing,
}

impl std::fmt::Display for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GateState::Idle => "IDLE",
            GateState::Candidate => "CANDIDATE",
            GateState::Requesting => "REQUESTING",
            GateState::Open => "OPEN",
            GateState::Closing => "CLOSING",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Transient operator notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notice {
    pub camera_id: String,
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notice {
    pub fn new(camera_id: &str, level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// Everything a display layer needs to render one camera.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GateSnapshot {
    pub camera_id: String,
    pub name: String,
    pub direction: GateDirection,
    pub open_policy: OpenPolicy,
    pub state: GateState,

    pub plate: Option<ResolvedPlate>,
    pub overridden: bool,
    pub plate_image: Option<String>,
    /// OCR running on a captured crop
    pub reading: bool,
    /// Detections arrived but none carried a usable plate
    pub cannot_read: bool,
    /// Latest batch, for overlay rendering
    pub detections: Vec<DetectionEvent>,

    pub barrier: BarrierState,
    pub health: ConnectionHealth,

    /// Plate text snapshotted by the request in flight
    pub in_flight_plate: Option<String>,
    pub last_decision: Option<GateDecision>,
    pub vehicle_info: Option<VehicleInfo>,
    pub updated_at: Option<DateTime<Utc>>,
}
