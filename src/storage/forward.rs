//! Central history forwarding
//!
//! POSTs each decision as JSON to a central history service. Delivery is
//! best effort: failures are logged and the decision is dropped.

use std::time::Duration;

use tracing::{debug, warn};

use super::{HistorySink, StorageError};
use crate::types::GateDecision;

#[derive(Clone, Debug)]
pub struct HttpForwardSink {
    http: reqwest::Client,
    url: String,
}

impl HttpForwardSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, StorageError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Forward(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn send(&self, decision: &GateDecision) -> Result<(), StorageError> {
        let resp = self
            .http
            .post(&self.url)
            .json(decision)
            .send()
            .await
            .map_err(|e| StorageError::Forward(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(StorageError::Forward(format!("HTTP {}", resp.status().as_u16())));
        }
        Ok(())
    }
}

impl HistorySink for HttpForwardSink {
    fn notify(&self, decision: &GateDecision) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(decision_id = %decision.id, "[HistoryForward] no runtime, decision not forwarded");
            return;
        };
        let sink = self.clone();
        let decision = decision.clone();
        runtime.spawn(async move {
            match sink.send(&decision).await {
                Ok(()) => debug!(decision_id = %decision.id, "[HistoryForward] forwarded"),
                Err(e) => warn!(
                    camera_id = %decision.camera_id,
                    decision_id = %decision.id,
                    error = %e,
                    "[HistoryForward] failed to forward decision"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GateAction, GateDirection, Outcome, Trigger};
    use axum::{extract::State, routing::post, Json, Router};
    use chrono::Utc;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_decision_is_posted_as_json() {
        let (tx, mut rx) = mpsc::unbounded_channel::<serde_json::Value>();
        let app = Router::new()
            .route(
                "/history",
                post(|State(tx): State<Arc<mpsc::UnboundedSender<serde_json::Value>>>, Json(body): Json<serde_json::Value>| async move {
                    let _ = tx.send(body);
                }),
            )
            .with_state(Arc::new(tx));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let sink = HttpForwardSink::new(format!("http://{}/history", addr), Duration::from_secs(2)).unwrap();
        let decision = GateDecision {
            id: Uuid::new_v4(),
            camera_id: "4".into(),
            action: GateAction::Close,
            plate_text: None,
            plate_source: None,
            confidence: None,
            direction: GateDirection::Exit,
            trigger: Trigger::Auto,
            issued_at: Utc::now(),
            completed_at: Utc::now(),
            outcome: Outcome::Ok,
            reason: "auto close".into(),
            vehicle_info: None,
        };
        sink.notify(&decision);

        let body = rx.recv().await.unwrap();
        assert_eq!(body["camera_id"], "4");
        assert_eq!(body["action"], "close");
        assert_eq!(body["direction"], "EXIT");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        let sink = HttpForwardSink::new("http://127.0.0.1:9/history", Duration::from_millis(500)).unwrap();
        let decision = GateDecision {
            id: Uuid::new_v4(),
            camera_id: "4".into(),
            action: GateAction::Open,
            plate_text: Some("XYZ9876".into()),
            plate_source: None,
            confidence: None,
            direction: GateDirection::Entry,
            trigger: Trigger::Manual,
            issued_at: Utc::now(),
            completed_at: Utc::now(),
            outcome: Outcome::Failed,
            reason: "network".into(),
            vehicle_info: None,
        };
        assert!(matches!(sink.send(&decision).await, Err(StorageError::Forward(_))));
    }
}
