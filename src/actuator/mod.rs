//! Actuator Client - the barrier's open/close/status HTTP control plane
//!
//! Pure request/response: no retry, no state, no policy. The controller
//! decides when to call and what a failure means.

mod client;

pub use client::ActuatorClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ActuatorEndpoint, BarrierState, Outcome, PlateSource, VehicleInfo};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActuatorError {
    #[error("actuator unreachable: {0}")]
    Network(String),

    #[error("actuator returned HTTP {code}: {message}")]
    Status { code: u16, message: String },

    /// Backend answered and refused (`success: false`)
    #[error("{message}")]
    Rejected { message: String },

    #[error("malformed actuator response: {0}")]
    Malformed(String),
}

impl ActuatorError {
    /// Decision outcome recorded for this failure.
    pub fn outcome(&self) -> Outcome {
        match self {
            ActuatorError::Rejected { .. } => Outcome::Rejected,
            _ => Outcome::Failed,
        }
    }
}

/// Body of `POST open-barrier`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenRequest {
    pub plate_text: String,
    pub confidence: f64,
    pub source: PlateSource,
}

/// Acknowledged open.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAck {
    /// `false` when the backend recorded the passage but the barrier
    /// hardware is disabled
    pub barrier_opened: bool,
    pub message: String,
    pub vehicle_info: Option<VehicleInfo>,
}

/// Acknowledged close.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseAck {
    pub is_open: bool,
    pub message: String,
}

#[async_trait]
pub trait BarrierActuator: Send + Sync {
    async fn open(
        &self,
        endpoint: &ActuatorEndpoint,
        request: &OpenRequest,
    ) -> Result<OpenAck, ActuatorError>;

    async fn close(&self, endpoint: &ActuatorEndpoint) -> Result<CloseAck, ActuatorError>;

    async fn status(&self, endpoint: &ActuatorEndpoint) -> Result<BarrierState, ActuatorError>;
}
