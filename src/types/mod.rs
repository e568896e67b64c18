//! Shared data structures for the gate pipeline
//!
//! This module defines the types that flow between pipeline stages:
//! - CameraSession: one registered camera and its endpoint descriptors
//! - DetectionEvent: one ALPR inference result from the detection feed
//! - ResolvedPlate: the Plate Resolver's single current plate
//! - BarrierState: externally observed actuator state
//! - GateDecision: audit record of one actuation attempt
//! - ConnectionHealth: video/feed link state for display
//! - GateSnapshot / Notice: what the controller publishes to operators

mod barrier;
mod camera;
mod decision;
mod detection;
mod gate;
mod health;
mod plate;

pub use barrier::*;
pub use camera::*;
pub use decision::*;
pub use detection::*;
pub use gate::*;
pub use health::*;
pub use plate::*;
