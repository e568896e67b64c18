//! Camera pipelines
//!
//! ```text
//! feed task ──────┐
//!                 ├──► GateController ──► actuator calls / history sink
//! video session ──┘          │
//!                            └──► snapshots (watch) + notices (broadcast)
//! ```
//!
//! One [`CameraPipeline`] per enabled camera; the [`CameraRegistry`] owns
//! them all and applies config reloads.

mod camera;
mod registry;

pub use camera::{CameraPipeline, PipelineDeps, PipelineError};
pub use registry::{CameraDirectory, CameraRegistry};
