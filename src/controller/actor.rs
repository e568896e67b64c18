//! Gate Controller actor - event loop around the gate state machine

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::machine::{Action, GateMachine};
use super::ControllerError;
use crate::acquisition::FeedEvent;
use crate::actuator::{ActuatorError, BarrierActuator, CloseAck, OpenAck};
use crate::config::defaults;
use crate::storage::HistorySink;
use crate::types::{
    BarrierState, GateSnapshot, Notice, NoticeLevel, ResolvedPlate, SessionEndpoints, SessionStats,
    StreamState,
};

// ============================================================================
// Messages
// ============================================================================

/// Signals from the camera pipeline, processed in arrival order.
#[derive(Debug)]
pub enum ControllerInput {
    Feed(FeedEvent),
    Video(StreamState),
    VideoStats(SessionStats),
    /// Endpoint descriptors replaced by a config reload
    Endpoints(SessionEndpoints),
}

/// Operator commands.
#[derive(Debug)]
enum GateCommand {
    SetOverride {
        plate: String,
        reply: oneshot::Sender<Result<ResolvedPlate, ControllerError>>,
    },
    ClearOverride {
        reply: oneshot::Sender<bool>,
    },
    Open {
        plate: Option<String>,
        reply: oneshot::Sender<Result<(), ControllerError>>,
    },
    Close {
        reply: oneshot::Sender<Result<(), ControllerError>>,
    },
}

/// Result of a spawned actuator call, tagged with its request id.
#[derive(Debug)]
enum Completion {
    Open(u64, Result<OpenAck, ActuatorError>),
    Close(u64, Result<CloseAck, ActuatorError>),
    Status(Result<BarrierState, ActuatorError>),
}

// ============================================================================
// Handle
// ============================================================================

/// Operator-facing handle to one camera's controller.
#[derive(Clone)]
pub struct GateHandle {
    camera_id: String,
    commands: mpsc::Sender<GateCommand>,
    snapshots: watch::Receiver<GateSnapshot>,
    notices: broadcast::Sender<Notice>,
}

impl GateHandle {
    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> GateSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GateSnapshot> {
        self.snapshots.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub async fn set_override(&self, plate: impl Into<String>) -> Result<ResolvedPlate, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.send(GateCommand::SetOverride { plate: plate.into(), reply }).await?;
        rx.await.map_err(|_| ControllerError::Stopped)?
    }

    pub async fn clear_override(&self) -> Result<bool, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.send(GateCommand::ClearOverride { reply }).await?;
        rx.await.map_err(|_| ControllerError::Stopped)
    }

    pub async fn open(&self, plate: Option<String>) -> Result<(), ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.send(GateCommand::Open { plate, reply }).await?;
        rx.await.map_err(|_| ControllerError::Stopped)?
    }

    pub async fn close(&self) -> Result<(), ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.send(GateCommand::Close { reply }).await?;
        rx.await.map_err(|_| ControllerError::Stopped)?
    }

    async fn send(&self, cmd: GateCommand) -> Result<(), ControllerError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| ControllerError::Stopped)
    }
}

// ============================================================================
// Controller
// ============================================================================

pub struct GateController {
    machine: GateMachine,
    actuator: Arc<dyn BarrierActuator>,
    history: Arc<dyn HistorySink>,

    inputs: mpsc::Receiver<ControllerInput>,
    commands: mpsc::Receiver<GateCommand>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,

    snapshot_tx: watch::Sender<GateSnapshot>,
    notice_tx: broadcast::Sender<Notice>,
}

impl GateController {
    /// Create the controller, its operator handle and its input sender.
    pub fn new(
        machine: GateMachine,
        actuator: Arc<dyn BarrierActuator>,
        history: Arc<dyn HistorySink>,
    ) -> (Self, GateHandle, mpsc::Sender<ControllerInput>) {
        let (input_tx, inputs) = mpsc::channel(defaults::CONTROLLER_INPUT_CAPACITY);
        let (command_tx, commands) = mpsc::channel(32);
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());
        let (notice_tx, _) = broadcast::channel(defaults::NOTICE_CAPACITY);

        let handle = GateHandle {
            camera_id: machine.camera_id().to_string(),
            commands: command_tx,
            snapshots: snapshot_rx,
            notices: notice_tx.clone(),
        };

        let controller = Self {
            machine,
            actuator,
            history,
            inputs,
            commands,
            completions_tx,
            completions,
            snapshot_tx,
            notice_tx,
        };

        (controller, handle, input_tx)
    }

    /// Run until cancelled. Teardown resets the machine; actuator calls
    /// still running are left to finish on their own.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(camera_id = %self.machine.camera_id(), "[GateController] starting");

        self.fetch_status();

        loop {
            let deadline = self.machine.next_deadline();

            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(done) = self.completions.recv() => self.on_completion(done),
                Some(input) = self.inputs.recv() => self.on_input(input),
                Some(cmd) = self.commands.recv() => self.on_command(cmd),
                _ = sleep_until(deadline) => {
                    let actions = self.machine.tick(Instant::now());
                    self.execute(actions);
                }
            }

            self.publish();
        }

        self.machine.reset();
        self.publish();
        info!(camera_id = %self.machine.camera_id(), "[GateController] stopped");
    }

    fn on_input(&mut self, input: ControllerInput) {
        let now = Instant::now();
        let actions = match input {
            ControllerInput::Feed(FeedEvent::Detections(batch)) => {
                self.machine.on_detections(batch, now)
            }
            ControllerInput::Feed(FeedEvent::Barrier(state)) => self.machine.on_barrier(state, now),
            ControllerInput::Feed(FeedEvent::Gap) => {
                self.machine.on_gap();
                Vec::new()
            }
            ControllerInput::Feed(FeedEvent::Link(link)) => {
                self.machine.on_feed_link(link);
                Vec::new()
            }
            ControllerInput::Video(state) => {
                self.machine.on_video_state(state);
                Vec::new()
            }
            ControllerInput::VideoStats(stats) => {
                self.machine.on_video_stats(stats);
                Vec::new()
            }
            ControllerInput::Endpoints(endpoints) => {
                let actuator_changed = endpoints.actuator != self.machine.session().endpoints.actuator;
                self.machine.update_endpoints(endpoints);
                if actuator_changed {
                    self.fetch_status();
                }
                Vec::new()
            }
        };
        self.execute(actions);
    }

    fn on_command(&mut self, cmd: GateCommand) {
        let now = Instant::now();
        match cmd {
            GateCommand::SetOverride { plate, reply } => {
                let result = self.machine.set_override(&plate, now).map(|actions| {
                    self.execute(actions);
                    self.machine.resolver().plate().cloned()
                });
                let result = match result {
                    Ok(Some(plate)) => Ok(plate),
                    Ok(None) => Err(ControllerError::NoPlate),
                    Err(e) => {
                        self.notify(Notice::new(
                            self.machine.camera_id(),
                            NoticeLevel::Warning,
                            format!("Override rejected: {}", e),
                        ));
                        Err(e)
                    }
                };
                let _ = reply.send(result);
            }
            GateCommand::ClearOverride { reply } => {
                let _ = reply.send(self.machine.clear_override());
            }
            GateCommand::Open { plate, reply } => {
                let result = self
                    .machine
                    .request_open(plate.as_deref(), now)
                    .map(|actions| self.execute(actions));
                let _ = reply.send(result);
            }
            GateCommand::Close { reply } => {
                let result = self.machine.request_close().map(|actions| self.execute(actions));
                let _ = reply.send(result);
            }
        }
    }

    fn on_completion(&mut self, done: Completion) {
        let now = Instant::now();
        let actions = match done {
            Completion::Open(id, result) => self.machine.on_open_result(id, result, now),
            Completion::Close(id, result) => self.machine.on_close_result(id, result, now),
            Completion::Status(Ok(state)) => {
                debug!(camera_id = %self.machine.camera_id(), is_open = state.is_open, "[GateController] barrier status fetched");
                self.machine.on_barrier(state, now)
            }
            Completion::Status(Err(e)) => {
                warn!(camera_id = %self.machine.camera_id(), error = %e, "[GateController] barrier status fetch failed");
                Vec::new()
            }
        };
        self.execute(actions);
    }

    /// Carry out machine actions. Actuator calls run in their own tasks and
    /// report back through the completion channel.
    fn execute(&mut self, actions: Vec<Action>) {
        let mut queue: VecDeque<Action> = actions.into();

        while let Some(action) = queue.pop_front() {
            match action {
                Action::Open { request_id, request } => {
                    let Some(endpoint) = self.machine.session().endpoints.actuator.clone() else {
                        let err = ActuatorError::Network("no actuator endpoint configured".into());
                        queue.extend(self.machine.on_open_result(request_id, Err(err), Instant::now()));
                        continue;
                    };
                    let actuator = self.actuator.clone();
                    let tx = self.completions_tx.clone();
                    tokio::spawn(async move {
                        let result = actuator.open(&endpoint, &request).await;
                        let _ = tx.send(Completion::Open(request_id, result));
                    });
                }
                Action::Close { request_id } => {
                    let Some(endpoint) = self.machine.session().endpoints.actuator.clone() else {
                        let err = ActuatorError::Network("no actuator endpoint configured".into());
                        queue.extend(self.machine.on_close_result(request_id, Err(err), Instant::now()));
                        continue;
                    };
                    let actuator = self.actuator.clone();
                    let tx = self.completions_tx.clone();
                    tokio::spawn(async move {
                        let result = actuator.close(&endpoint).await;
                        let _ = tx.send(Completion::Close(request_id, result));
                    });
                }
                Action::Record(decision) => self.history.notify(&decision),
                Action::Notify(notice) => self.notify(notice),
            }
        }
    }

    fn fetch_status(&self) {
        let Some(endpoint) = self.machine.session().endpoints.actuator.clone() else {
            return;
        };
        let actuator = self.actuator.clone();
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = actuator.status(&endpoint).await;
            let _ = tx.send(Completion::Status(result));
        });
    }

    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => warn!(camera_id = %notice.camera_id, "[GateController] {}", notice.message),
            _ => debug!(camera_id = %notice.camera_id, "[GateController] {}", notice.message),
        }
        // No subscribers is fine
        let _ = self.notice_tx.send(notice);
    }

    /// Publish a new snapshot if anything other than the timestamp changed.
    fn publish(&self) {
        let mut next = self.machine.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            next.updated_at = current.updated_at;
            if *current == next {
                return false;
            }
            next.updated_at = Some(Utc::now());
            *current = next;
            true
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
