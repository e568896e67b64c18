//! Externally observed barrier state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Barrier state as last observed (push notification) or caused
/// (acknowledged actuator command).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BarrierState {
    pub is_open: bool,
    pub enabled: bool,
    /// `None` until the first observation
    pub observed_at: Option<DateTime<Utc>>,
}

impl BarrierState {
    pub fn observed(is_open: bool, enabled: bool) -> Self {
        Self {
            is_open,
            enabled,
            observed_at: Some(Utc::now()),
        }
    }
}
