//! Local decision log on sled
//!
//! Key: completion time in nanoseconds, big-endian, followed by the decision
//! id bytes. Keys sort chronologically and never collide.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use super::{HistorySink, StorageError};
use crate::types::GateDecision;

#[derive(Clone)]
pub struct DecisionLog {
    db: Arc<sled::Db>,
}

impl DecisionLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        info!(path = %path.display(), entries = db.len(), "[DecisionLog] opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Throwaway log for tests and dry runs.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn append(&self, decision: &GateDecision) -> Result<(), StorageError> {
        let nanos = decision
            .completed_at
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .max(0) as u64;
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(&nanos.to_be_bytes());
        key.extend_from_slice(decision.id.as_bytes());

        let value = serde_json::to_vec(decision)?;
        self.db.insert(key, value)?;
        Ok(())
    }

    /// Most recent decisions, newest first, optionally for one camera.
    ///
    /// Entries that no longer decode are skipped.
    pub fn recent(&self, limit: usize, camera_id: Option<&str>) -> Vec<GateDecision> {
        self.db
            .iter()
            .rev()
            .filter_map(|item| item.ok())
            .filter_map(|(_, value)| serde_json::from_slice::<GateDecision>(&value).ok())
            .filter(|d| camera_id.map_or(true, |id| d.camera_id == id))
            .take(limit)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.db.len()
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

impl HistorySink for DecisionLog {
    fn notify(&self, decision: &GateDecision) {
        if let Err(e) = self.append(decision) {
            warn!(
                camera_id = %decision.camera_id,
                decision_id = %decision.id,
                error = %e,
                "[DecisionLog] failed to persist decision"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GateAction, GateDirection, Outcome, PlateSource, Trigger};
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn decision(camera: &str, secs: i64, outcome: Outcome) -> GateDecision {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap() + Duration::seconds(secs);
        GateDecision {
            id: Uuid::new_v4(),
            camera_id: camera.to_string(),
            action: GateAction::Open,
            plate_text: Some("ABC1234".into()),
            plate_source: Some(PlateSource::Auto),
            confidence: Some(0.91),
            direction: GateDirection::Entry,
            trigger: Trigger::Auto,
            issued_at: at,
            completed_at: at,
            outcome,
            reason: "ok".into(),
            vehicle_info: None,
        }
    }

    #[test]
    fn test_recent_is_newest_first_and_filters_by_camera() {
        let log = DecisionLog::temporary().unwrap();
        log.notify(&decision("1", 0, Outcome::Ok));
        log.notify(&decision("2", 1, Outcome::Rejected));
        log.notify(&decision("1", 2, Outcome::Failed));

        let all = log.recent(10, None);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].outcome, Outcome::Failed);
        assert_eq!(all[2].outcome, Outcome::Ok);

        let cam1 = log.recent(10, Some("1"));
        assert_eq!(cam1.len(), 2);
        assert!(cam1.iter().all(|d| d.camera_id == "1"));

        assert_eq!(log.recent(1, None).len(), 1);
    }

    #[test]
    fn test_same_instant_decisions_are_both_kept() {
        let log = DecisionLog::temporary().unwrap();
        log.notify(&decision("1", 5, Outcome::Ok));
        log.notify(&decision("1", 5, Outcome::Ok));
        assert_eq!(log.count(), 2);
    }

    #[test]
    fn test_open_creates_log_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let log = DecisionLog::open(dir.path().join("decisions")).unwrap();
        log.append(&decision("3", 0, Outcome::Ok)).unwrap();
        log.flush().unwrap();
        assert_eq!(log.recent(5, Some("3")).len(), 1);
        assert!(dir.path().join("decisions").exists());
    }
}
