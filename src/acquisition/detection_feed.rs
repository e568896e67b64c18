//! Detection Feed Client - push subscription of ALPR events per camera
//!
//! One duplex text connection carries JSON `{type, data}` messages plus
//! literal `"ping"`/`"pong"` keepalives. The subscription is lazy (connects
//! on first poll), never ends, and reconnects after a fixed delay.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::reconnect::ReconnectSlot;
use crate::types::{BarrierState, DetectionEvent, FeedEndpoint, FeedLinkState};

const PING: &str = "ping";
const PONG: &str = "pong";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeedError {
    #[error("feed connect failed: {0}")]
    Connect(String),

    #[error("feed transport error: {0}")]
    Transport(String),

    #[error("undecodable feed message: {0}")]
    Decode(String),
}

// ============================================================================
// Events and wire messages
// ============================================================================

/// What the subscription yields to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Detections(Vec<DetectionEvent>),
    Barrier(BarrierState),
    Link(FeedLinkState),
    /// Connection lost; state derived from the old connection is stale
    Gap,
}

/// Decoded `{type, data}` message.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Detections(Vec<DetectionEvent>),
    BarrierStatus { is_open: bool, enabled: bool },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct BarrierPush {
    #[serde(default)]
    is_open: bool,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl FeedMessage {
    /// Decode one text frame. `Ok(None)` for message types this client
    /// does not consume.
    pub fn decode(text: &str) -> Result<Option<Self>, FeedError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| FeedError::Decode(e.to_string()))?;

        match envelope.kind.as_str() {
            "detections" => {
                let batch = if envelope.data.is_null() {
                    Vec::new()
                } else {
                    serde_json::from_value(envelope.data)
                        .map_err(|e| FeedError::Decode(e.to_string()))?
                };
                Ok(Some(FeedMessage::Detections(batch)))
            }
            "barrier_status" => {
                let push: BarrierPush = if envelope.data.is_null() {
                    BarrierPush { is_open: false, enabled: true }
                } else {
                    serde_json::from_value(envelope.data)
                        .map_err(|e| FeedError::Decode(e.to_string()))?
                };
                Ok(Some(FeedMessage::BarrierStatus {
                    is_open: push.is_open,
                    enabled: push.enabled,
                }))
            }
            _ => Ok(None),
        }
    }

    fn into_event(self) -> FeedEvent {
        match self {
            FeedMessage::Detections(batch) => FeedEvent::Detections(batch),
            FeedMessage::BarrierStatus { is_open, enabled } => {
                FeedEvent::Barrier(BarrierState::observed(is_open, enabled))
            }
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn FeedConnection>, FeedError>;
}

#[async_trait]
pub trait FeedConnection: Send {
    /// Next text frame; `None` once the peer closed.
    async fn recv(&mut self) -> Option<Result<String, FeedError>>;

    async fn send(&mut self, text: &str) -> Result<(), FeedError>;
}

/// WebSocket transport (tokio-tungstenite).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct WsConnection {
    inner: WsStream,
}

#[async_trait]
impl FeedTransport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn FeedConnection>, FeedError> {
        let (inner, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;
        Ok(Box::new(WsConnection { inner }))
    }
}

#[async_trait]
impl FeedConnection for WsConnection {
    async fn recv(&mut self) -> Option<Result<String, FeedError>> {
        loop {
            let frame = match self.inner.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(FeedError::Transport(e.to_string()))),
            };
            match frame {
                Message::Text(text) => return Some(Ok(text)),
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => continue,
                },
                Message::Close(_) => return None,
                // Protocol-level ping/pong is answered by tungstenite
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn send(&mut self, text: &str) -> Result<(), FeedError> {
        self.inner
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))
    }
}

// ============================================================================
// Subscription
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct FeedTiming {
    pub reconnect_delay: Duration,
    pub keepalive: Duration,
}

impl Default for FeedTiming {
    fn default() -> Self {
        let t = crate::config::TimingConfig::default();
        Self {
            reconnect_delay: t.feed_reconnect(),
            keepalive: t.keepalive(),
        }
    }
}

/// Infinite sequence of [`FeedEvent`]s for one camera.
pub struct FeedSubscription {
    camera_id: String,
    endpoint: Option<FeedEndpoint>,
    transport: Arc<dyn FeedTransport>,
    timing: FeedTiming,

    conn: Option<Box<dyn FeedConnection>>,
    slot: ReconnectSlot,
    keepalive: Interval,
    pending: VecDeque<FeedEvent>,
    link: FeedLinkState,
    connects: u64,
}

/// Start a lazy subscription. Nothing connects until the first poll.
pub fn subscribe(
    camera_id: impl Into<String>,
    endpoint: Option<FeedEndpoint>,
    transport: Arc<dyn FeedTransport>,
    timing: FeedTiming,
) -> FeedSubscription {
    let mut sub = FeedSubscription {
        camera_id: camera_id.into(),
        endpoint: None,
        transport,
        timing,
        conn: None,
        slot: ReconnectSlot::Idle,
        keepalive: keepalive_interval(timing.keepalive),
        pending: VecDeque::new(),
        link: FeedLinkState::Connecting,
        connects: 0,
    };
    sub.set_endpoint(endpoint);
    sub
}

fn keepalive_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl FeedSubscription {
    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn link(&self) -> FeedLinkState {
        self.link
    }

    /// Successful connections so far.
    pub fn connects(&self) -> u64 {
        self.connects
    }

    /// Replace the endpoint: the current connection is dropped and the next
    /// poll connects to the new URL immediately.
    pub fn set_endpoint(&mut self, endpoint: Option<FeedEndpoint>) {
        let had_conn = self.conn.take().is_some();
        self.slot.cancel();
        self.endpoint = endpoint;
        if had_conn {
            self.pending.push_back(FeedEvent::Gap);
        }
        match self.endpoint {
            Some(_) => self.set_link(FeedLinkState::Connecting),
            None => self.set_link(FeedLinkState::Unconfigured),
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = FeedEvent> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            let event = sub.next_event().await;
            Some((event, sub))
        })
    }

    /// Next event. Never returns for a camera without a feed endpoint.
    pub async fn next_event(&mut self) -> FeedEvent {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return event;
            }

            let Some(url) = self.endpoint.as_ref().map(|e| e.ws_url.clone()) else {
                return std::future::pending().await;
            };

            if self.conn.is_none() {
                self.slot.ready_or_now().await;
                self.connect(&url).await;
                continue;
            }

            self.poll_connection().await;
        }
    }

    async fn connect(&mut self, url: &str) {
        match self.transport.connect(url).await {
            Ok(conn) => {
                info!(camera_id = %self.camera_id, url = %url, "[DetectionFeed] connected");
                self.conn = Some(conn);
                self.slot.cancel();
                self.connects += 1;
                self.keepalive = keepalive_interval(self.timing.keepalive);
                self.set_link(FeedLinkState::Up);
            }
            Err(e) => {
                warn!(
                    camera_id = %self.camera_id,
                    error = %e,
                    retry_in_ms = self.timing.reconnect_delay.as_millis() as u64,
                    "[DetectionFeed] connect failed"
                );
                self.slot.schedule(self.timing.reconnect_delay);
                self.set_link(FeedLinkState::Down);
            }
        }
    }

    /// Wait for one frame or keepalive tick on the live connection.
    async fn poll_connection(&mut self) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };

        let outcome = tokio::select! {
            frame = conn.recv() => match frame {
                Some(Ok(text)) => Self::route(&self.camera_id, conn, &text, &mut self.pending).await,
                Some(Err(e)) => Err(e),
                None => Err(FeedError::Transport("connection closed by peer".to_string())),
            },
            _ = self.keepalive.tick() => conn.send(PING).await,
        };

        if let Err(e) = outcome {
            self.drop_connection(e);
        }
    }

    /// Decode-and-route one text frame.
    async fn route(
        camera_id: &str,
        conn: &mut Box<dyn FeedConnection>,
        text: &str,
        pending: &mut VecDeque<FeedEvent>,
    ) -> Result<(), FeedError> {
        match text {
            PING => return conn.send(PONG).await,
            PONG => return Ok(()),
            _ => {}
        }
        match FeedMessage::decode(text) {
            Ok(Some(msg)) => pending.push_back(msg.into_event()),
            Ok(None) => debug!(camera_id = %camera_id, "[DetectionFeed] ignoring unknown message type"),
            Err(e) => warn!(camera_id = %camera_id, error = %e, "[DetectionFeed] dropping malformed message"),
        }
        Ok(())
    }

    fn drop_connection(&mut self, reason: FeedError) {
        warn!(
            camera_id = %self.camera_id,
            error = %reason,
            retry_in_ms = self.timing.reconnect_delay.as_millis() as u64,
            "[DetectionFeed] connection lost"
        );
        self.conn = None;
        self.slot.schedule(self.timing.reconnect_delay);
        self.set_link(FeedLinkState::Down);
        self.pending.push_back(FeedEvent::Gap);
    }

    fn set_link(&mut self, link: FeedLinkState) {
        if self.link != link {
            self.link = link;
            self.pending.push_back(FeedEvent::Link(link));
        }
    }
}
