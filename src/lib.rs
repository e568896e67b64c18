//! parkgate: per-camera parking barrier orchestration
//!
//! Fuses an ALPR detection feed, a low-latency video session and a barrier
//! actuator API into one gate state machine per camera.
//!
//! ## Architecture
//!
//! - **Acquisition**: detection feed subscription and video session, each
//!   reconnecting on its own
//! - **Plate**: validation, resolution (auto vs. manual) and debounce
//! - **Controller**: the gate state machine and its actor
//! - **Actuator**: HTTP client for the barrier backend
//! - **Storage**: decision log and central history forwarding
//! - **Pipeline**: wiring per camera, registry of all cameras
//! - **API**: operator HTTP/WebSocket surface

pub mod acquisition;
pub mod actuator;
pub mod api;
pub mod config;
pub mod controller;
pub mod pipeline;
pub mod plate;
pub mod storage;
pub mod types;

pub use config::GateConfig;

pub use types::{
    BarrierState, CameraSession, DetectionEvent, GateDecision, GateDirection, GateSnapshot,
    GateState, OpenPolicy, ResolvedPlate,
};

pub use actuator::{ActuatorClient, ActuatorError, BarrierActuator};
pub use controller::{ControllerError, GateController, GateHandle};
pub use pipeline::{CameraDirectory, CameraPipeline, CameraRegistry, PipelineDeps};
pub use plate::{PlateError, PlateValidator};
pub use storage::{DecisionLog, HistorySink, StorageError};
