//! ALPR detection events as delivered by the detection feed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bounding box in frame pixels. Travels on the wire as `[x, y, w, h]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl From<[f64; 4]> for BoundingBox {
    fn from([x, y, w, h]: [f64; 4]) -> Self {
        Self { x, y, w, h }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x, b.y, b.w, b.h]
    }
}

/// OCR progress reported by the detector for a plate crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrStatus {
    /// Crop captured, text not read yet
    Processing,
    /// Text read (older detectors report `success`)
    #[serde(alias = "success")]
    Done,
    #[serde(other)]
    Other,
}

/// One inference result for one video frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    #[serde(default)]
    pub bbox: BoundingBox,

    #[serde(rename = "class", default)]
    pub class: String,

    #[serde(default)]
    pub confidence: f64,

    /// Plate text read by OCR, if any
    #[serde(
        rename = "text",
        alias = "plate_text",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub plate_text: Option<String>,

    /// Cropped plate image reference (data URI or URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate_image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_status: Option<OcrStatus>,

    /// Stamped locally when the event is decoded
    #[serde(skip_deserializing, default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl DetectionEvent {
    /// Trimmed plate text, `None` when absent or blank.
    pub fn text(&self) -> Option<&str> {
        self.plate_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// OCR still running on a captured crop.
    pub fn is_reading(&self) -> bool {
        self.ocr_status == Some(OcrStatus::Processing) && self.plate_image.is_some()
    }
}
