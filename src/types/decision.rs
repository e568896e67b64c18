//! Gate decisions: the audit trail of actuator calls

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{GateDirection, PlateSource};

/// What initiated an actuator call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Debounce expiry or auto-close timer
    Auto,
    /// Explicit operator command
    Manual,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GateAction {
    Open,
    Close,
}

impl std::fmt::Display for GateAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateAction::Open => write!(f, "open"),
            GateAction::Close => write!(f, "close"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    /// Backend answered and refused (`success: false`)
    Rejected,
    /// Network, HTTP or payload failure
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Ok => write!(f, "ok"),
            Outcome::Rejected => write!(f, "rejected"),
            Outcome::Failed => write!(f, "failed"),
        }
    }
}

/// Vehicle metadata the actuator backend may return on open.
///
/// Carried for display; nothing here is computed locally.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VehicleInfo {
    #[serde(default)]
    pub entry_time: Option<String>,
    #[serde(default)]
    pub exit_time: Option<String>,
    #[serde(default)]
    pub fee: Option<f64>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default, alias = "vehicle_type")]
    pub customer_type: Option<String>,
    #[serde(default)]
    pub is_subscriber: bool,
}

impl VehicleInfo {
    pub fn is_empty(&self) -> bool {
        self.entry_time.is_none()
            && self.exit_time.is_none()
            && self.fee.is_none()
            && self.duration.is_none()
            && self.customer_type.is_none()
    }
}

/// Audit record of one actuator call. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateDecision {
    pub id: Uuid,
    pub camera_id: String,
    pub action: GateAction,
    /// Plate snapshotted when the call was issued
    pub plate_text: Option<String>,
    pub plate_source: Option<PlateSource>,
    pub confidence: Option<f64>,
    pub direction: GateDirection,
    pub trigger: Trigger,
    pub issued_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub outcome: Outcome,
    pub reason: String,
    #[serde(default)]
    pub vehicle_info: Option<VehicleInfo>,
}
