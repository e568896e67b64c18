//! Stream Session Manager - one low-latency video session per camera
//!
//! Negotiation is offer/answer over HTTP against the stream proxy. The media
//! side sits behind [`VideoPeer`] so a real media stack can be plugged in;
//! [`ProbePeer`] only performs signalling, which is enough to monitor stream
//! availability: once connected it renegotiates on an interval and reports
//! a disconnect when the proxy stops answering. Failures are reported as
//! state, never as errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::reconnect::ReconnectSlot;
use crate::config::defaults;
use crate::types::{CameraSession, SessionStats, StreamEndpoint, StreamState};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("stream proxy not configured")]
    NotConfigured,

    #[error("signalling request failed: {0}")]
    Signaling(String),

    #[error("stream proxy returned HTTP {code}: {message}")]
    Status { code: u16, message: String },

    #[error("invalid answer: {0}")]
    InvalidAnswer(String),

    #[error("media peer error: {0}")]
    Peer(String),
}

/// SDP offer or answer as exchanged with the stream proxy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Remote media track announced by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: String,
    pub kind: String,
}

/// Events a connected peer reports.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    Connected,
    Track(TrackInfo),
    Disconnected(String),
    Failed(String),
}

// ============================================================================
// Seams
// ============================================================================

#[async_trait]
pub trait VideoPeer: Send {
    /// Receive-only offer for one video track.
    async fn create_offer(&mut self) -> Result<SessionDescription, TransportError>;

    async fn apply_answer(&mut self, answer: SessionDescription) -> Result<(), TransportError>;

    /// Next connection event; pending while nothing happens.
    async fn next_event(&mut self) -> PeerEvent;

    /// Release all transport resources.
    async fn close(&mut self);
}

pub trait PeerFactory: Send + Sync {
    fn create(&self, session: &CameraSession) -> Box<dyn VideoPeer>;
}

#[async_trait]
pub trait Signaling: Send + Sync {
    async fn negotiate(
        &self,
        endpoint: &StreamEndpoint,
        camera_id: &str,
        annotated: bool,
        offer: SessionDescription,
    ) -> Result<SessionDescription, TransportError>;
}

// ============================================================================
// HTTP signalling
// ============================================================================

/// POSTs the offer as `{sdp, type}` to `{base}/api/cameras/{id}/offer`.
#[derive(Clone, Debug)]
pub struct HttpSignaling {
    http: reqwest::Client,
}

impl HttpSignaling {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Signaling(e.to_string()))?;
        Ok(Self { http })
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl Signaling for HttpSignaling {
    async fn negotiate(
        &self,
        endpoint: &StreamEndpoint,
        camera_id: &str,
        annotated: bool,
        offer: SessionDescription,
    ) -> Result<SessionDescription, TransportError> {
        let url = endpoint.offer_url(camera_id, annotated);
        let resp = self
            .http
            .post(&url)
            .json(&offer)
            .send()
            .await
            .map_err(|e| TransportError::Signaling(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::Signaling(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            return Err(TransportError::Status {
                code: status.as_u16(),
                message,
            });
        }

        let answer: SessionDescription = serde_json::from_str(&body)
            .map_err(|e| TransportError::InvalidAnswer(e.to_string()))?;
        if answer.sdp.trim().is_empty() || answer.kind.trim().is_empty() {
            return Err(TransportError::InvalidAnswer(
                "answer missing sdp or type".to_string(),
            ));
        }
        Ok(answer)
    }
}

// ============================================================================
// Probe peer
// ============================================================================

/// Signalling-only peer: a valid answer counts as a connected stream.
///
/// While connected it repeats the offer/answer exchange every
/// `check_interval`; the first failed exchange ends the session with
/// [`PeerEvent::Disconnected`].
pub struct ProbePeer {
    signaling: Arc<dyn Signaling>,
    endpoint: Option<StreamEndpoint>,
    camera_id: String,
    annotated: bool,
    check_interval: Duration,
    answered: bool,
    announced: u8,
    next_check: Option<Instant>,
}

impl ProbePeer {
    pub fn new(session: &CameraSession, signaling: Arc<dyn Signaling>, check_interval: Duration) -> Self {
        Self {
            signaling,
            endpoint: session.endpoints.stream.clone(),
            camera_id: session.camera_id.clone(),
            annotated: session.annotated,
            check_interval,
            answered: false,
            announced: 0,
            next_check: None,
        }
    }

    /// One liveness exchange against the proxy.
    async fn check(&mut self, endpoint: &StreamEndpoint) -> Result<(), TransportError> {
        let offer = self.create_offer().await?;
        let answer = self
            .signaling
            .negotiate(endpoint, &self.camera_id, self.annotated, offer)
            .await?;
        require_video(&answer)
    }
}

#[derive(Clone)]
pub struct ProbePeerFactory {
    signaling: Arc<dyn Signaling>,
    check_interval: Duration,
}

impl ProbePeerFactory {
    pub fn new(signaling: Arc<dyn Signaling>, check_interval: Duration) -> Self {
        Self {
            signaling,
            check_interval,
        }
    }
}

impl PeerFactory for ProbePeerFactory {
    fn create(&self, session: &CameraSession) -> Box<dyn VideoPeer> {
        Box::new(ProbePeer::new(session, self.signaling.clone(), self.check_interval))
    }
}

fn require_video(answer: &SessionDescription) -> Result<(), TransportError> {
    if answer.sdp.contains("m=video") {
        Ok(())
    } else {
        Err(TransportError::InvalidAnswer(
            "answer carries no video section".to_string(),
        ))
    }
}

#[async_trait]
impl VideoPeer for ProbePeer {
    async fn create_offer(&mut self) -> Result<SessionDescription, TransportError> {
        let session_id = uuid::Uuid::new_v4().as_u128() as u64 >> 1;
        let sdp = format!(
            "v=0\r\n\
             o=- {session_id} 2 IN IP4 127.0.0.1\r\n\
             s=-\r\n\
             t=0 0\r\n\
             m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
             c=IN IP4 0.0.0.0\r\n\
             a=recvonly\r\n\
             a=rtpmap:96 H264/90000\r\n"
        );
        Ok(SessionDescription {
            sdp,
            kind: "offer".to_string(),
        })
    }

    async fn apply_answer(&mut self, answer: SessionDescription) -> Result<(), TransportError> {
        require_video(&answer)?;
        self.answered = true;
        Ok(())
    }

    async fn next_event(&mut self) -> PeerEvent {
        if !self.answered {
            return std::future::pending().await;
        }
        if self.announced < 2 {
            self.announced += 1;
            return if self.announced == 1 {
                PeerEvent::Connected
            } else {
                PeerEvent::Track(TrackInfo {
                    id: "video0".to_string(),
                    kind: "video".to_string(),
                })
            };
        }
        let Some(endpoint) = self.endpoint.clone() else {
            return std::future::pending().await;
        };

        loop {
            // Kept across calls so a dropped wait does not postpone the check
            let interval = self.check_interval;
            let at = *self.next_check.get_or_insert_with(|| Instant::now() + interval);
            tokio::time::sleep_until(at).await;
            self.next_check = None;

            match self.check(&endpoint).await {
                Ok(()) => debug!(camera_id = %self.camera_id, "[StreamSession] stream check ok"),
                Err(e) => {
                    self.answered = false;
                    return PeerEvent::Disconnected(format!("stream check failed: {e}"));
                }
            }
        }
    }

    async fn close(&mut self) {
        self.answered = false;
        self.next_check = None;
    }
}

// ============================================================================
// Session manager
// ============================================================================

#[derive(Debug)]
enum StreamControl {
    Reconfigure {
        endpoint: Option<StreamEndpoint>,
        annotated: bool,
    },
}

/// Handle returned by [`start`].
pub struct StreamHandle {
    state: watch::Receiver<StreamState>,
    tracks: watch::Receiver<Option<TrackInfo>>,
    stats: watch::Receiver<SessionStats>,
    control: mpsc::Sender<StreamControl>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub fn on_state_change(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }

    pub fn on_track(&self) -> watch::Receiver<Option<TrackInfo>> {
        self.tracks.clone()
    }

    pub fn on_stats(&self) -> watch::Receiver<SessionStats> {
        self.stats.clone()
    }

    pub fn state(&self) -> StreamState {
        self.state.borrow().clone()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }

    /// Point the session at a new proxy; renegotiates immediately.
    pub async fn reconfigure(&self, endpoint: Option<StreamEndpoint>, annotated: bool) {
        let _ = self
            .control
            .send(StreamControl::Reconfigure { endpoint, annotated })
            .await;
    }

    /// Release all transport resources and wait for the session task.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "[StreamSession] task ended abnormally");
        }
    }
}

/// Begin negotiating the camera's video session.
pub fn start(
    session: &CameraSession,
    factory: Arc<dyn PeerFactory>,
    signaling: Arc<dyn Signaling>,
    reconnect_delay: Duration,
    cancel: CancellationToken,
) -> StreamHandle {
    let (state_tx, state) = watch::channel(StreamState::Connecting);
    let (track_tx, tracks) = watch::channel(None);
    let (stats_tx, stats) = watch::channel(SessionStats::default());
    let (control, control_rx) = mpsc::channel(8);

    let runner = SessionRunner {
        session: session.clone(),
        factory,
        signaling,
        reconnect_delay,
        state_tx,
        track_tx,
        stats_tx,
        control_rx,
        slot: ReconnectSlot::Idle,
    };
    let task = tokio::spawn(runner.run(cancel.clone()));

    StreamHandle {
        state,
        tracks,
        stats,
        control,
        cancel,
        task,
    }
}

struct SessionRunner {
    session: CameraSession,
    factory: Arc<dyn PeerFactory>,
    signaling: Arc<dyn Signaling>,
    reconnect_delay: Duration,
    state_tx: watch::Sender<StreamState>,
    track_tx: watch::Sender<Option<TrackInfo>>,
    stats_tx: watch::Sender<SessionStats>,
    control_rx: mpsc::Receiver<StreamControl>,
    slot: ReconnectSlot,
}

/// Why a connected (or connecting) attempt ended.
enum AttemptEnd {
    Cancelled,
    Reconfigured,
    Lost(String),
}

impl SessionRunner {
    /// One loop per session, so at most one negotiation is ever running.
    async fn run(mut self, cancel: CancellationToken) {
        let camera_id = self.session.camera_id.clone();
        debug!(camera_id = %camera_id, "[StreamSession] started");

        loop {
            let endpoint = match self.session.endpoints.stream.clone() {
                Some(endpoint) => endpoint,
                None => {
                    // Nothing to retry against until a reconfigure arrives
                    self.set_state(StreamState::Failed(TransportError::NotConfigured.to_string()));
                    let ctl = tokio::select! {
                        _ = cancel.cancelled() => None,
                        ctl = self.control_rx.recv() => ctl,
                    };
                    match ctl {
                        Some(ctl) => {
                            self.apply(ctl);
                            continue;
                        }
                        None => {
                            cancel.cancelled().await;
                            break;
                        }
                    }
                }
            };

            self.slot.mark_running();
            match self.attempt(&endpoint, &cancel).await {
                AttemptEnd::Cancelled => break,
                AttemptEnd::Reconfigured => {
                    self.slot.cancel();
                    continue;
                }
                AttemptEnd::Lost(reason) => {
                    self.stats_tx.send_modify(|s| s.last_error = Some(reason));
                    self.slot.schedule(self.reconnect_delay);
                }
            }

            // Wait out the reconnect delay; a reconfigure replaces it.
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.slot.ready() => {}
                Some(ctl) = self.control_rx.recv() => {
                    self.apply(ctl);
                    self.slot.cancel();
                }
            }
        }

        self.slot.cancel();
        self.track_tx.send_replace(None);
        self.set_state(StreamState::Stopped);
        debug!(camera_id = %camera_id, "[StreamSession] stopped");
    }

    fn apply(&mut self, ctl: StreamControl) {
        match ctl {
            StreamControl::Reconfigure { endpoint, annotated } => {
                info!(camera_id = %self.session.camera_id, "[StreamSession] endpoint updated, renegotiating");
                self.session.endpoints.stream = endpoint;
                self.session.annotated = annotated;
            }
        }
    }

    async fn attempt(&mut self, endpoint: &StreamEndpoint, cancel: &CancellationToken) -> AttemptEnd {
        let camera_id = self.session.camera_id.clone();
        self.set_state(StreamState::Connecting);
        self.stats_tx.send_modify(|s| s.attempts += 1);

        let mut peer = self.factory.create(&self.session);

        let negotiated = tokio::select! {
            _ = cancel.cancelled() => {
                peer.close().await;
                return AttemptEnd::Cancelled;
            }
            Some(ctl) = self.control_rx.recv() => {
                peer.close().await;
                self.apply(ctl);
                return AttemptEnd::Reconfigured;
            }
            res = negotiate(peer.as_mut(), self.signaling.as_ref(), endpoint, &self.session) => res,
        };

        if let Err(e) = negotiated {
            warn!(
                camera_id = %camera_id,
                error = %e,
                retry_in_ms = self.reconnect_delay.as_millis() as u64,
                "[StreamSession] negotiation failed"
            );
            peer.close().await;
            self.set_state(StreamState::Failed(e.to_string()));
            return AttemptEnd::Lost(e.to_string());
        }

        let end = loop {
            tokio::select! {
                _ = cancel.cancelled() => break AttemptEnd::Cancelled,
                Some(ctl) = self.control_rx.recv() => {
                    self.apply(ctl);
                    break AttemptEnd::Reconfigured;
                }
                event = peer.next_event() => match event {
                    PeerEvent::Connected => {
                        info!(camera_id = %camera_id, "[StreamSession] connected");
                        self.stats_tx.send_modify(|s| s.connections += 1);
                        self.set_state(StreamState::Connected);
                    }
                    PeerEvent::Track(track) => {
                        debug!(camera_id = %camera_id, track = %track.id, "[StreamSession] track received");
                        self.track_tx.send_replace(Some(track));
                    }
                    PeerEvent::Disconnected(reason) => {
                        warn!(camera_id = %camera_id, reason = %reason, "[StreamSession] disconnected");
                        self.set_state(StreamState::Disconnected);
                        break AttemptEnd::Lost(reason);
                    }
                    PeerEvent::Failed(reason) => {
                        warn!(camera_id = %camera_id, reason = %reason, "[StreamSession] transport failed");
                        self.set_state(StreamState::Failed(reason.clone()));
                        break AttemptEnd::Lost(reason);
                    }
                },
            }
        };

        peer.close().await;
        self.track_tx.send_replace(None);
        end
    }

    fn set_state(&self, state: StreamState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

async fn negotiate(
    peer: &mut dyn VideoPeer,
    signaling: &dyn Signaling,
    endpoint: &StreamEndpoint,
    session: &CameraSession,
) -> Result<(), TransportError> {
    let offer = peer.create_offer().await?;
    let answer = signaling
        .negotiate(endpoint, &session.camera_id, session.annotated, offer)
        .await?;
    peer.apply_answer(answer).await
}

/// Default signalling timeout for [`HttpSignaling`].
pub fn signaling_timeout() -> Duration {
    Duration::from_secs(defaults::SIGNALLING_TIMEOUT_SECS)
}
