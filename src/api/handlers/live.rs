//! Live camera stream over WebSocket
//!
//! Pushes `{"type":"snapshot","data":...}` on every published snapshot
//! (starting with the current one) and `{"type":"notice","data":...}` for
//! every operator notice.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use super::ApiState;
use crate::controller::GateHandle;
use crate::types::{GateSnapshot, Notice};

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LiveMessage<'a> {
    Snapshot(&'a GateSnapshot),
    Notice(&'a Notice),
}

/// GET /api/v1/cameras/:id/ws
pub async fn camera_ws(
    State(state): State<ApiState>,
    Path(camera_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    match state.camera(&camera_id) {
        Ok(handle) => ws.on_upgrade(move |socket| stream_camera(socket, handle)),
        Err(resp) => resp,
    }
}

async fn stream_camera(mut socket: WebSocket, handle: GateHandle) {
    let camera_id = handle.camera_id().to_string();
    let mut snapshots = handle.subscribe();
    let mut notices = handle.notices();
    debug!(camera_id = %camera_id, "[API] live client connected");

    let initial = snapshots.borrow_and_update().clone();
    if send(&mut socket, &LiveMessage::Snapshot(&initial)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if send(&mut socket, &LiveMessage::Snapshot(&snapshot)).await.is_err() {
                    break;
                }
            }
            notice = notices.recv() => match notice {
                Ok(notice) => {
                    if send(&mut socket, &LiveMessage::Notice(&notice)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(camera_id = %camera_id, skipped, "[API] live client lagging, notices dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!(camera_id = %camera_id, "[API] live client disconnected");
}

async fn send(socket: &mut WebSocket, msg: &LiveMessage<'_>) -> Result<(), axum::Error> {
    let text = serde_json::to_string(msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(text)).await
}
