//! Gate decision history
//!
//! Every actuator call ends in a [`GateDecision`]. Controllers hand them to a
//! [`HistorySink`]; the sinks here persist them locally (sled), forward them
//! to a central history service, or both.

pub mod decision_log;
pub mod forward;

pub use decision_log::DecisionLog;
pub use forward::HttpForwardSink;

use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::types::GateDecision;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("forwarding failed: {0}")]
    Forward(String),
}

/// Receives decisions as they complete.
///
/// Called from the controller loop, so implementations must not block for
/// long. Errors are logged by the sink, never surfaced to the controller.
pub trait HistorySink: Send + Sync {
    fn notify(&self, decision: &GateDecision);
}

/// Sends each decision to every inner sink.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn HistorySink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl HistorySink for FanoutSink {
    fn notify(&self, decision: &GateDecision) {
        for sink in &self.sinks {
            sink.notify(decision);
        }
    }
}

/// Keeps decisions in memory, newest last.
#[derive(Default)]
pub struct MemoryHistory {
    decisions: Mutex<Vec<GateDecision>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decisions(&self) -> Vec<GateDecision> {
        self.decisions
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

impl HistorySink for MemoryHistory {
    fn notify(&self, decision: &GateDecision) {
        if let Ok(mut d) = self.decisions.lock() {
            d.push(decision.clone());
        }
    }
}
