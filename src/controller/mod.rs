//! Gate Controller
//!
//! One controller per camera owns the resolved plate and the barrier view.
//! [`GateMachine`] is the synchronous state machine; [`GateController`] is
//! the actor that feeds it, runs actuator calls and publishes snapshots.

mod actor;
pub mod machine;

pub use actor::{ControllerInput, GateController, GateHandle};
pub use machine::{Action, GateMachine, MachineTiming};

use thiserror::Error;

use crate::plate::PlateError;

/// Why an operator command was refused. None of these change state.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ControllerError {
    #[error(transparent)]
    InvalidPlate(#[from] PlateError),

    #[error("a barrier request is already in flight")]
    RequestInFlight,

    #[error("a close request is already in flight")]
    CloseInFlight,

    #[error("barrier is already open")]
    BarrierOpen,

    #[error("no valid plate to open for")]
    NoPlate,

    #[error("camera has no actuator endpoint configured")]
    NoActuator,

    #[error("gate controller is not running")]
    Stopped,
}
