//! Resolved plate: the single current plate a controller acts on

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the resolved plate text came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlateSource {
    Auto,
    Manual,
}

impl std::fmt::Display for PlateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlateSource::Auto => write!(f, "auto"),
            PlateSource::Manual => write!(f, "manual"),
        }
    }
}

/// The Plate Resolver's output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedPlate {
    /// Normalised (trimmed, upper-case) plate text
    pub text: String,
    pub confidence: f64,
    pub source: PlateSource,
    pub image_ref: Option<String>,
    /// Format-validated (always true for manual overrides once accepted)
    pub valid: bool,
    pub resolved_at: DateTime<Utc>,
}

impl ResolvedPlate {
    pub fn auto(text: String, confidence: f64, image_ref: Option<String>) -> Self {
        Self {
            text,
            confidence,
            source: PlateSource::Auto,
            image_ref,
            valid: true,
            resolved_at: Utc::now(),
        }
    }

    pub fn manual(text: String) -> Self {
        Self {
            text,
            confidence: 1.0,
            source: PlateSource::Manual,
            image_ref: None,
            valid: true,
            resolved_at: Utc::now(),
        }
    }
}
