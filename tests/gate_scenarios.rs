//! Gate Scenario Tests
//!
//! Drive a real `GateController` actor with detection batches and a
//! scripted actuator on a paused clock, and check the published snapshots,
//! actuator calls and recorded decisions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use parkgate::acquisition::FeedEvent;
use parkgate::actuator::{CloseAck, OpenAck, OpenRequest};
use parkgate::controller::{ControllerInput, GateMachine, MachineTiming};
use parkgate::storage::MemoryHistory;
use parkgate::types::{
    ActuatorEndpoint, BarrierState, CameraSession, DetectionEvent, GateAction, GateDirection,
    GateSnapshot, GateState, NoticeLevel, OpenPolicy, Outcome, PlateSource, SessionEndpoints,
    Trigger,
};
use parkgate::{ActuatorError, BarrierActuator, ControllerError, GateController, GateHandle, PlateValidator};

// ============================================================================
// Scripted actuator
// ============================================================================

#[derive(Default)]
struct ScriptedActuator {
    open_results: Mutex<VecDeque<Result<OpenAck, ActuatorError>>>,
    close_results: Mutex<VecDeque<Result<CloseAck, ActuatorError>>>,
    open_delay: Mutex<Option<Duration>>,
    opens: Mutex<Vec<(Instant, OpenRequest)>>,
    opens_finished: Mutex<Vec<Instant>>,
    closes: Mutex<Vec<Instant>>,
}

impl ScriptedActuator {
    fn with_opens(results: Vec<Result<OpenAck, ActuatorError>>) -> Arc<Self> {
        let a = Self::default();
        *a.open_results.lock().unwrap() = results.into();
        Arc::new(a)
    }

    fn slow_opens(delay: Duration) -> Arc<Self> {
        let a = Self::default();
        *a.open_delay.lock().unwrap() = Some(delay);
        Arc::new(a)
    }

    fn opens(&self) -> Vec<(Instant, OpenRequest)> {
        self.opens.lock().unwrap().clone()
    }

    fn closes(&self) -> Vec<Instant> {
        self.closes.lock().unwrap().clone()
    }
}

fn opened() -> OpenAck {
    OpenAck {
        barrier_opened: true,
        message: "Barrier opened".into(),
        vehicle_info: None,
    }
}

#[async_trait]
impl BarrierActuator for ScriptedActuator {
    async fn open(&self, _endpoint: &ActuatorEndpoint, request: &OpenRequest) -> Result<OpenAck, ActuatorError> {
        self.opens.lock().unwrap().push((Instant::now(), request.clone()));
        let delay = *self.open_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.opens_finished.lock().unwrap().push(Instant::now());
        self.open_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(opened()))
    }

    async fn close(&self, _endpoint: &ActuatorEndpoint) -> Result<CloseAck, ActuatorError> {
        self.closes.lock().unwrap().push(Instant::now());
        self.close_results.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(CloseAck {
                is_open: false,
                message: "Barrier closed".into(),
            })
        })
    }

    async fn status(&self, _endpoint: &ActuatorEndpoint) -> Result<BarrierState, ActuatorError> {
        Ok(BarrierState::observed(false, true))
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Rig {
    handle: GateHandle,
    inputs: mpsc::Sender<ControllerInput>,
    history: Arc<MemoryHistory>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Rig {
    fn start(policy: OpenPolicy, timing: MachineTiming, actuator: Arc<ScriptedActuator>) -> Self {
        let session = CameraSession::new("1", GateDirection::Entry)
            .with_endpoints(SessionEndpoints {
                actuator: Some(ActuatorEndpoint::new("http://barrier.local:5000")),
                ..Default::default()
            })
            .with_policy(policy);
        let machine = GateMachine::new(session, PlateValidator::default(), timing);
        let history = Arc::new(MemoryHistory::new());
        let (controller, handle, inputs) = GateController::new(machine, actuator, history.clone());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(controller.run(cancel.clone()));
        Self {
            handle,
            inputs,
            history,
            cancel,
            task,
        }
    }

    fn auto(actuator: Arc<ScriptedActuator>) -> Self {
        Self::start(OpenPolicy::Auto, MachineTiming::default(), actuator)
    }

    async fn feed(&self, batch: Vec<DetectionEvent>) {
        self.inputs
            .send(ControllerInput::Feed(FeedEvent::Detections(batch)))
            .await
            .unwrap();
    }

    async fn wait(&self, pred: impl Fn(&GateSnapshot) -> bool) -> GateSnapshot {
        let mut rx = self.handle.subscribe();
        let snap = tokio::time::timeout(Duration::from_secs(60), rx.wait_for(|s| pred(s)))
            .await
            .expect("timed out waiting for snapshot")
            .expect("controller stopped")
            .clone();
        snap
    }

    async fn stop(self) {
        self.cancel.cancel();
        self.task.await.unwrap();
    }
}

fn plate(text: &str, confidence: f64) -> DetectionEvent {
    DetectionEvent {
        bbox: [10.0, 20.0, 120.0, 40.0].into(),
        class: "license_plate".into(),
        confidence,
        plate_text: Some(text.into()),
        plate_image: Some("data:image/jpeg;base64,AAAA".into()),
        ocr_status: None,
        received_at: Utc::now(),
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn happy_path_opens_after_debounce() {
    let actuator = ScriptedActuator::with_opens(vec![]);
    let rig = Rig::auto(actuator.clone());
    let t0 = Instant::now();

    rig.feed(vec![plate("30A12345", 0.9)]).await;
    let snap = rig.wait(|s| s.state == GateState::Candidate).await;
    let resolved = snap.plate.unwrap();
    assert_eq!(resolved.text, "30A12345");
    assert_eq!(resolved.source, PlateSource::Auto);

    let snap = rig.wait(|s| s.state == GateState::Open).await;
    assert!(snap.barrier.is_open);

    let opens = actuator.opens();
    assert_eq!(opens.len(), 1);
    assert_eq!(opens[0].0 - t0, Duration::from_millis(500));
    assert_eq!(opens[0].1.plate_text, "30A12345");
    assert_eq!(opens[0].1.source, PlateSource::Auto);

    let decisions = rig.history.decisions();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].outcome, Outcome::Ok);
    assert_eq!(decisions[0].trigger, Trigger::Auto);
    assert_eq!(decisions[0].direction, GateDirection::Entry);

    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn repeated_read_keeps_single_debounce_timer() {
    let actuator = ScriptedActuator::with_opens(vec![]);
    let rig = Rig::auto(actuator.clone());
    let t0 = Instant::now();

    rig.feed(vec![plate("30A12345", 0.9)]).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    rig.feed(vec![plate("30A12345", 0.92)]).await;

    rig.wait(|s| s.state == GateState::Open).await;
    let opens = actuator.opens();
    assert_eq!(opens.len(), 1);
    assert_eq!(opens[0].0 - t0, Duration::from_millis(500));

    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unreadable_text_leaves_gate_idle() {
    let actuator = ScriptedActuator::with_opens(vec![]);
    let rig = Rig::auto(actuator.clone());

    rig.feed(vec![plate("???", 0.4)]).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    let snap = rig.handle.snapshot();
    assert_eq!(snap.state, GateState::Idle);
    assert!(snap.plate.is_none());
    assert!(actuator.opens().is_empty());

    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn rejected_open_returns_to_candidate_without_retry() {
    let actuator = ScriptedActuator::with_opens(vec![Err(ActuatorError::Rejected {
        message: "Vehicle already inside".into(),
    })]);
    let rig = Rig::auto(actuator.clone());
    let mut notices = rig.handle.notices();

    rig.feed(vec![plate("30A12345", 0.9)]).await;
    let snap = rig
        .wait(|s| s.state == GateState::Candidate && s.last_decision.is_some())
        .await;
    assert_eq!(snap.last_decision.unwrap().outcome, Outcome::Rejected);
    assert!(!snap.barrier.is_open);

    let notice = loop {
        let n = notices.recv().await.unwrap();
        if n.level == NoticeLevel::Error {
            break n;
        }
    };
    assert!(notice.message.contains("Vehicle already inside"));

    // No new qualifying transition, no new request
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(actuator.opens().len(), 1);
    assert_eq!(rig.handle.snapshot().plate.unwrap().text, "30A12345");

    // A fresh read re-arms the debounce
    let t1 = Instant::now();
    rig.feed(vec![plate("30A12345", 0.9)]).await;
    rig.wait(|s| s.state == GateState::Open).await;
    let opens = actuator.opens();
    assert_eq!(opens.len(), 2);
    assert_eq!(opens[1].0 - t1, Duration::from_millis(500));

    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn override_wins_until_barrier_closes() {
    let actuator = ScriptedActuator::with_opens(vec![]);
    let rig = Rig::auto(actuator.clone());
    let t0 = Instant::now();

    rig.feed(vec![plate("30A12345", 0.9)]).await;
    rig.wait(|s| s.state == GateState::Candidate).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let resolved = rig.handle.set_override("51f99999").await.unwrap();
    assert_eq!(resolved.text, "51F99999");
    assert_eq!(resolved.source, PlateSource::Manual);

    tokio::time::sleep(Duration::from_millis(100)).await;
    rig.feed(vec![plate("30A12345", 0.95)]).await;

    let snap = rig.wait(|s| s.state == GateState::Open).await;
    assert!(snap.overridden);
    assert_eq!(snap.plate.as_ref().unwrap().text, "51F99999");

    let opens = actuator.opens();
    assert_eq!(opens.len(), 1);
    assert_eq!(opens[0].1.plate_text, "51F99999");
    assert_eq!(opens[0].1.source, PlateSource::Manual);
    assert_eq!(opens[0].0 - t0, Duration::from_millis(600));

    rig.handle.close().await.unwrap();
    let snap = rig.wait(|s| s.state == GateState::Idle).await;
    assert!(snap.plate.is_none());
    assert!(!snap.overridden);
    assert!(snap.plate_image.is_none());
    assert!(!snap.barrier.is_open);

    rig.feed(vec![plate("30A12345", 0.9)]).await;
    let snap = rig.wait(|s| s.plate.is_some()).await;
    assert_eq!(snap.plate.unwrap().source, PlateSource::Auto);

    rig.stop().await;
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test(start_paused = true)]
async fn same_plate_while_open_issues_no_calls() {
    let actuator = ScriptedActuator::with_opens(vec![]);
    let rig = Rig::auto(actuator.clone());

    rig.feed(vec![plate("30A12345", 0.9)]).await;
    rig.wait(|s| s.state == GateState::Open).await;

    rig.feed(vec![plate("30A12345", 0.9)]).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    rig.feed(vec![plate("30A12345", 0.9)]).await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(actuator.opens().len(), 1);
    assert_eq!(rig.handle.snapshot().state, GateState::Open);

    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn silence_clears_image_but_keeps_text() {
    let actuator = ScriptedActuator::with_opens(vec![]);
    let rig = Rig::start(OpenPolicy::Confirm, MachineTiming::default(), actuator.clone());

    rig.feed(vec![plate("30A12345", 0.9)]).await;
    let snap = rig.wait(|s| s.plate_image.is_some()).await;
    assert_eq!(snap.state, GateState::Candidate);

    let snap = rig.wait(|s| s.plate_image.is_none()).await;
    assert_eq!(snap.plate.unwrap().text, "30A12345");
    assert!(snap.detections.is_empty());

    // Confirm policy never opens on its own
    assert!(actuator.opens().is_empty());

    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn confirm_policy_opens_on_operator_command() {
    let actuator = ScriptedActuator::with_opens(vec![]);
    let rig = Rig::start(OpenPolicy::Confirm, MachineTiming::default(), actuator.clone());

    assert_eq!(rig.handle.open(None).await, Err(ControllerError::NoPlate));

    rig.feed(vec![plate("30A12345", 0.9)]).await;
    rig.wait(|s| s.state == GateState::Candidate).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(actuator.opens().is_empty());

    rig.handle.open(None).await.unwrap();
    rig.wait(|s| s.state == GateState::Open).await;

    let decisions = rig.history.decisions();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].trigger, Trigger::Manual);
    assert_eq!(rig.handle.open(None).await, Err(ControllerError::BarrierOpen));

    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn invalid_override_changes_nothing() {
    let actuator = ScriptedActuator::with_opens(vec![]);
    let rig = Rig::start(OpenPolicy::Confirm, MachineTiming::default(), actuator.clone());

    rig.feed(vec![plate("30A12345", 0.9)]).await;
    let before = rig.wait(|s| s.state == GateState::Candidate).await;

    let err = rig.handle.set_override("hello").await.unwrap_err();
    assert!(matches!(err, ControllerError::InvalidPlate(_)));

    let after = rig.handle.snapshot();
    assert_eq!(after.plate, before.plate);
    assert!(!after.overridden);

    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn auto_close_after_configured_delay() {
    let actuator = ScriptedActuator::with_opens(vec![]);
    let timing = MachineTiming {
        auto_close_after: Some(Duration::from_secs(8)),
        ..MachineTiming::default()
    };
    let rig = Rig::start(OpenPolicy::Auto, timing, actuator.clone());

    rig.feed(vec![plate("30A12345", 0.9)]).await;
    rig.wait(|s| s.state == GateState::Open).await;
    let opened_at = Instant::now();

    rig.wait(|s| s.state == GateState::Idle).await;
    let closes = actuator.closes();
    assert_eq!(closes.len(), 1);
    assert_eq!(closes[0] - opened_at, Duration::from_secs(8));

    let decisions = rig.history.decisions();
    assert_eq!(decisions.len(), 2);
    assert_eq!(decisions[1].action, GateAction::Close);
    assert_eq!(decisions[1].trigger, Trigger::Auto);

    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn external_barrier_push_is_reflected() {
    let actuator = ScriptedActuator::with_opens(vec![]);
    let rig = Rig::start(OpenPolicy::Confirm, MachineTiming::default(), actuator.clone());
    // Initial status fetch lands first
    rig.wait(|s| s.barrier.observed_at.is_some()).await;

    rig.inputs
        .send(ControllerInput::Feed(FeedEvent::Barrier(BarrierState::observed(true, true))))
        .await
        .unwrap();
    rig.wait(|s| s.state == GateState::Open && s.barrier.is_open).await;

    rig.inputs
        .send(ControllerInput::Feed(FeedEvent::Barrier(BarrierState::observed(false, true))))
        .await
        .unwrap();
    rig.wait(|s| s.state == GateState::Idle && !s.barrier.is_open).await;
    assert!(actuator.opens().is_empty());

    rig.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_during_slow_open_settles_idle_and_lets_call_finish() {
    let actuator = ScriptedActuator::slow_opens(Duration::from_secs(3));
    let rig = Rig::auto(actuator.clone());
    let snapshots = rig.handle.subscribe();
    let history = rig.history.clone();

    rig.feed(vec![plate("30A12345", 0.9)]).await;
    let snap = rig.wait(|s| s.state == GateState::Requesting).await;
    assert_eq!(snap.in_flight_plate.as_deref(), Some("30A12345"));

    // Stop while the actuator is still sleeping
    tokio::time::sleep(Duration::from_secs(1)).await;
    let started = actuator.opens()[0].0;
    assert!(actuator.opens_finished.lock().unwrap().is_empty());
    rig.stop().await;

    let last = snapshots.borrow().clone();
    assert_eq!(last.state, GateState::Idle);
    assert!(last.in_flight_plate.is_none());

    tokio::time::sleep(Duration::from_secs(5)).await;
    let finished = actuator.opens_finished.lock().unwrap().clone();
    assert_eq!(finished, vec![started + Duration::from_secs(3)]);
    assert_eq!(actuator.opens().len(), 1);
    assert!(history.decisions().is_empty());
}
