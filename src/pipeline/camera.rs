//! Camera Pipeline - wires one camera's feed, video session and controller

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::acquisition::{
    self, stream_session, FeedSubscription, FeedTiming, FeedTransport, PeerFactory, Signaling,
    StreamHandle,
};
use crate::actuator::BarrierActuator;
use crate::config::GateConfig;
use crate::controller::{ControllerInput, GateController, GateHandle, GateMachine, MachineTiming};
use crate::plate::{PlateError, PlateValidator};
use crate::storage::HistorySink;
use crate::types::{CameraSession, FeedEndpoint, SessionEndpoints, SessionStats, StreamState};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid plate grammar: {0}")]
    PlateGrammar(#[from] PlateError),
}

/// Shared collaborators every pipeline is built from.
#[derive(Clone)]
pub struct PipelineDeps {
    pub actuator: Arc<dyn BarrierActuator>,
    pub history: Arc<dyn HistorySink>,
    pub feed_transport: Arc<dyn FeedTransport>,
    pub peers: Arc<dyn PeerFactory>,
    pub signaling: Arc<dyn Signaling>,
}

/// A running camera: feed task, video session, controller.
pub struct CameraPipeline {
    session: CameraSession,
    handle: GateHandle,
    inputs: mpsc::Sender<ControllerInput>,
    feed_ctl: mpsc::Sender<Option<FeedEndpoint>>,
    stream: StreamHandle,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl CameraPipeline {
    /// Start all tasks for `session`. Timers and plate grammar are taken
    /// from `config` once; later changes need a restart.
    pub fn start(
        session: CameraSession,
        config: &GateConfig,
        deps: &PipelineDeps,
        parent: &CancellationToken,
    ) -> Result<Self, PipelineError> {
        let validator = PlateValidator::from_config(&config.plate)?;
        let timing = MachineTiming {
            debounce: config.timing.debounce(),
            staleness: config.timing.staleness(),
            auto_close_after: config.timing.auto_close_after(),
        };
        let cancel = parent.child_token();

        let machine = GateMachine::new(session.clone(), validator, timing);
        let (controller, handle, inputs) =
            GateController::new(machine, deps.actuator.clone(), deps.history.clone());

        let mut tasks = Vec::with_capacity(3);
        tasks.push(tokio::spawn(controller.run(cancel.clone())));

        let (feed_ctl, feed_ctl_rx) = mpsc::channel(4);
        let subscription = acquisition::subscribe(
            session.camera_id.clone(),
            session.endpoints.feed.clone(),
            deps.feed_transport.clone(),
            FeedTiming {
                reconnect_delay: config.timing.feed_reconnect(),
                keepalive: config.timing.keepalive(),
            },
        );
        tasks.push(tokio::spawn(run_feed(
            subscription,
            feed_ctl_rx,
            inputs.clone(),
            cancel.clone(),
        )));

        let stream = stream_session::start(
            &session,
            deps.peers.clone(),
            deps.signaling.clone(),
            config.timing.video_reconnect(),
            cancel.child_token(),
        );
        tasks.push(tokio::spawn(forward_video(
            session.camera_id.clone(),
            stream.on_state_change(),
            stream.on_stats(),
            inputs.clone(),
            cancel.clone(),
        )));

        info!(
            camera_id = %session.camera_id,
            direction = %session.direction,
            policy = ?session.open_policy,
            "[Pipeline] camera started"
        );

        Ok(Self {
            session,
            handle,
            inputs,
            feed_ctl,
            stream,
            cancel,
            tasks,
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.session.camera_id
    }

    pub fn session(&self) -> &CameraSession {
        &self.session
    }

    pub fn handle(&self) -> &GateHandle {
        &self.handle
    }

    pub fn stream_state(&self) -> StreamState {
        self.stream.state()
    }

    /// Apply new endpoint descriptors without restarting the pipeline.
    pub async fn update_endpoints(&mut self, endpoints: SessionEndpoints, annotated: bool) {
        if endpoints.feed != self.session.endpoints.feed {
            let _ = self.feed_ctl.send(endpoints.feed.clone()).await;
        }
        if endpoints.stream != self.session.endpoints.stream || annotated != self.session.annotated {
            self.stream.reconfigure(endpoints.stream.clone(), annotated).await;
        }
        if self
            .inputs
            .send(ControllerInput::Endpoints(endpoints.clone()))
            .await
            .is_err()
        {
            warn!(camera_id = %self.session.camera_id, "[Pipeline] controller gone, endpoint update dropped");
        }
        self.session.endpoints = endpoints;
        self.session.annotated = annotated;
    }

    /// Cancel timers and subscriptions and wait for the tasks. An actuator
    /// call already in flight completes on its own.
    pub async fn stop(self) {
        let camera_id = self.session.camera_id.clone();
        self.cancel.cancel();
        self.stream.stop().await;
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(camera_id = %camera_id, error = %e, "[Pipeline] task ended abnormally");
            }
        }
        info!(camera_id = %camera_id, "[Pipeline] camera stopped");
    }
}

async fn run_feed(
    mut subscription: FeedSubscription,
    mut ctl: mpsc::Receiver<Option<FeedEndpoint>>,
    inputs: mpsc::Sender<ControllerInput>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(endpoint) = ctl.recv() => {
                debug!(camera_id = %subscription.camera_id(), "[Pipeline] feed endpoint replaced");
                subscription.set_endpoint(endpoint);
            }
            event = subscription.next_event() => {
                if inputs.send(ControllerInput::Feed(event)).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Relay video state and session counters into the controller.
async fn forward_video(
    camera_id: String,
    mut states: watch::Receiver<StreamState>,
    mut stats: watch::Receiver<SessionStats>,
    inputs: mpsc::Sender<ControllerInput>,
    cancel: CancellationToken,
) {
    let mut input = ControllerInput::Video(states.borrow_and_update().clone());
    loop {
        if inputs.send(input).await.is_err() {
            break;
        }
        input = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    debug!(camera_id = %camera_id, "[Pipeline] video session ended");
                    break;
                }
                ControllerInput::Video(states.borrow_and_update().clone())
            }
            changed = stats.changed() => {
                if changed.is_err() {
                    break;
                }
                ControllerInput::VideoStats(stats.borrow_and_update().clone())
            }
        };
    }
}
