//! Plate Resolver - collapses a noisy detection stream into one plate
//!
//! Pure state: the caller supplies the clock, so the controller drives it
//! from its event loop and tests drive it with fixed instants.

use std::time::Duration;
use tokio::time::Instant;

use super::validation::{PlateError, PlateValidator};
use crate::types::{DetectionEvent, PlateSource, ResolvedPlate};

/// What a detection batch did to the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverUpdate {
    /// Nothing observable changed
    Unchanged,
    /// Image, progress, overlay or cannot-read indicators changed
    Indicators,
    /// A valid automatic read became the resolved plate
    Plate { text: String, changed: bool },
    /// A valid read arrived while a manual override holds the plate
    Suppressed { text: String },
}

pub struct PlateResolver {
    validator: PlateValidator,
    staleness: Duration,

    plate: Option<ResolvedPlate>,
    override_active: bool,

    image: Option<String>,
    reading: bool,
    cannot_read: bool,
    detections: Vec<DetectionEvent>,
    last_event_at: Option<Instant>,
}

impl PlateResolver {
    pub fn new(validator: PlateValidator, staleness: Duration) -> Self {
        Self {
            validator,
            staleness,
            plate: None,
            override_active: false,
            image: None,
            reading: false,
            cannot_read: false,
            detections: Vec::new(),
            last_event_at: None,
        }
    }

    pub fn validator(&self) -> &PlateValidator {
        &self.validator
    }

    /// Consume one detection batch from the feed.
    ///
    /// Only the first event carrying non-empty text is considered. An empty
    /// batch clears the overlay but does not count as activity.
    pub fn on_batch(&mut self, batch: Vec<DetectionEvent>, now: Instant) -> ResolverUpdate {
        if batch.is_empty() {
            if self.detections.is_empty() {
                return ResolverUpdate::Unchanged;
            }
            self.detections.clear();
            return ResolverUpdate::Indicators;
        }

        self.last_event_at = Some(now);

        let first_text = batch
            .iter()
            .find_map(|ev| ev.text().map(|t| (t.to_string(), ev.confidence, ev.plate_image.clone())));
        let reading_image = batch
            .iter()
            .find(|ev| ev.is_reading())
            .and_then(|ev| ev.plate_image.clone());
        self.detections = batch;

        if let Some((raw, confidence, image)) = first_text {
            match self.validator.validate(&raw) {
                Ok(text) => return self.accept(text, confidence, image),
                Err(e) => {
                    tracing::trace!(raw = %raw, error = %e, "[PlateResolver] discarding unreadable plate");
                }
            }
        }

        if let Some(image) = reading_image {
            self.image = Some(image);
            self.reading = true;
            self.cannot_read = false;
        } else {
            self.reading = false;
            self.cannot_read = self.plate.is_none();
        }
        ResolverUpdate::Indicators
    }

    fn accept(&mut self, text: String, confidence: f64, image: Option<String>) -> ResolverUpdate {
        self.reading = false;
        self.cannot_read = false;

        if self.override_active {
            return ResolverUpdate::Suppressed { text };
        }

        if image.is_some() {
            self.image = image;
        }
        let changed = self.plate.as_ref().map(|p| p.text != text).unwrap_or(true);
        self.plate = Some(ResolvedPlate::auto(
            text.clone(),
            confidence,
            self.image.clone(),
        ));
        ResolverUpdate::Plate { text, changed }
    }

    /// Operator override. Invalid text is rejected and nothing changes.
    pub fn set_override(&mut self, raw: &str) -> Result<String, PlateError> {
        let text = self.validator.validate(raw)?;
        self.plate = Some(ResolvedPlate::manual(text.clone()));
        self.override_active = true;
        self.cannot_read = false;
        self.reading = false;
        Ok(text)
    }

    /// Re-enable automatic overwrites. The current text stays until a newer
    /// valid read replaces it. Returns whether an override was active.
    pub fn clear_override(&mut self) -> bool {
        std::mem::replace(&mut self.override_active, false)
    }

    /// Feed reconnect gap: drop everything tied to the old connection.
    pub fn on_gap(&mut self) -> bool {
        self.last_event_at = None;
        self.clear_indicators()
    }

    /// When the staleness window of the last event runs out.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.last_event_at.map(|t| t + self.staleness)
    }

    /// Clear image/progress/overlay if no event arrived within the staleness
    /// window. Resolved text is kept. Returns whether anything was cleared.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.next_expiry() {
            Some(deadline) if now >= deadline => {
                self.last_event_at = None;
                self.clear_indicators()
            }
            _ => false,
        }
    }

    fn clear_indicators(&mut self) -> bool {
        let had_any = self.image.is_some()
            || self.reading
            || self.cannot_read
            || !self.detections.is_empty();
        self.image = None;
        self.reading = false;
        self.cannot_read = false;
        self.detections.clear();
        had_any
    }

    /// End of a vehicle cycle: forget the plate, the override and indicators.
    pub fn reset(&mut self) {
        self.plate = None;
        self.override_active = false;
        self.last_event_at = None;
        self.clear_indicators();
    }

    pub fn plate(&self) -> Option<&ResolvedPlate> {
        self.plate.as_ref()
    }

    pub fn plate_text(&self) -> Option<&str> {
        self.plate.as_ref().map(|p| p.text.as_str())
    }

    pub fn is_overridden(&self) -> bool {
        self.override_active
    }

    pub fn source(&self) -> Option<PlateSource> {
        self.plate.as_ref().map(|p| p.source)
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn is_reading(&self) -> bool {
        self.reading
    }

    pub fn cannot_read(&self) -> bool {
        self.cannot_read
    }

    pub fn detections(&self) -> &[DetectionEvent] {
        &self.detections
    }
}
