//! Gate state machine
//!
//! Synchronous core of the controller. Every input returns the side effects
//! to perform as [`Action`]s; the actor executes them. Time is passed in so
//! the machine can be driven deterministically.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ControllerError;
use crate::actuator::{ActuatorError, CloseAck, OpenAck, OpenRequest};
use crate::plate::{DebounceKey, Debouncer, PlateResolver, PlateValidator, ResolverUpdate};
use crate::types::{
    BarrierState, CameraSession, ConnectionHealth, DetectionEvent, FeedLinkState, GateAction,
    GateDecision, GateSnapshot, GateState, Notice, NoticeLevel, OpenPolicy, Outcome, PlateSource,
    SessionEndpoints, SessionStats, StreamState, Trigger, VehicleInfo,
};

/// Timers of one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineTiming {
    pub debounce: Duration,
    pub staleness: Duration,
    pub auto_close_after: Option<Duration>,
}

impl Default for MachineTiming {
    fn default() -> Self {
        let t = crate::config::TimingConfig::default();
        Self {
            debounce: t.debounce(),
            staleness: t.staleness(),
            auto_close_after: t.auto_close_after(),
        }
    }
}

/// Side effect requested by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Open { request_id: u64, request: OpenRequest },
    Close { request_id: u64 },
    Record(GateDecision),
    Notify(Notice),
}

/// The single actuator call a camera may have outstanding.
#[derive(Debug, Clone)]
struct InFlight {
    id: u64,
    action: GateAction,
    trigger: Trigger,
    plate_text: Option<String>,
    plate_source: Option<PlateSource>,
    confidence: Option<f64>,
    issued_at: DateTime<Utc>,
    /// State to fall back to if the call fails
    origin: GateState,
}

pub struct GateMachine {
    session: CameraSession,
    state: GateState,
    resolver: PlateResolver,
    debounce: Debouncer,
    barrier: BarrierState,
    health: ConnectionHealth,
    auto_close_after: Option<Duration>,

    in_flight: Option<InFlight>,
    next_request_id: u64,
    /// Barrier push received while a call was in flight
    observed_during_call: Option<BarrierState>,
    /// Plate the backend accepted without moving the barrier
    confirmed_plate: Option<String>,
    auto_close_at: Option<Instant>,

    last_decision: Option<GateDecision>,
    vehicle_info: Option<VehicleInfo>,
}

impl GateMachine {
    pub fn new(session: CameraSession, validator: PlateValidator, timing: MachineTiming) -> Self {
        let health = ConnectionHealth {
            video: StreamState::Connecting,
            video_stats: SessionStats::default(),
            feed: if session.endpoints.feed.is_some() {
                FeedLinkState::Connecting
            } else {
                FeedLinkState::Unconfigured
            },
        };
        Self {
            resolver: PlateResolver::new(validator, timing.staleness),
            debounce: Debouncer::new(timing.debounce),
            auto_close_after: timing.auto_close_after,
            session,
            state: GateState::Idle,
            barrier: BarrierState {
                is_open: false,
                enabled: true,
                observed_at: None,
            },
            health,
            in_flight: None,
            next_request_id: 0,
            observed_during_call: None,
            confirmed_plate: None,
            auto_close_at: None,
            last_decision: None,
            vehicle_info: None,
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.session.camera_id
    }

    pub fn session(&self) -> &CameraSession {
        &self.session
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn barrier(&self) -> BarrierState {
        self.barrier
    }

    pub fn resolver(&self) -> &PlateResolver {
        &self.resolver
    }

    pub fn has_request_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    /// Earliest timer the machine wants to be ticked at.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.debounce.deadline(),
            self.resolver.next_expiry(),
            self.auto_close_at,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn update_endpoints(&mut self, endpoints: SessionEndpoints) {
        if endpoints.feed.is_none() {
            self.health.feed = FeedLinkState::Unconfigured;
        } else if self.health.feed == FeedLinkState::Unconfigured {
            self.health.feed = FeedLinkState::Connecting;
        }
        self.session.endpoints = endpoints;
    }

    // ========================================================================
    // Feed and transport inputs
    // ========================================================================

    pub fn on_detections(&mut self, batch: Vec<DetectionEvent>, now: Instant) -> Vec<Action> {
        match self.resolver.on_batch(batch, now) {
            ResolverUpdate::Plate { text, changed } => {
                if changed {
                    debug!(camera_id = %self.camera_id(), plate = %text, "[GateController] plate resolved");
                }
                self.on_plate_published(text, now)
            }
            ResolverUpdate::Suppressed { text } => {
                debug!(camera_id = %self.camera_id(), plate = %text, "[GateController] auto read ignored, override active");
                Vec::new()
            }
            ResolverUpdate::Indicators | ResolverUpdate::Unchanged => Vec::new(),
        }
    }

    pub fn on_gap(&mut self) {
        self.resolver.on_gap();
    }

    pub fn on_feed_link(&mut self, link: FeedLinkState) {
        self.health.feed = link;
    }

    pub fn on_video_state(&mut self, state: StreamState) {
        self.health.video = state;
    }

    pub fn on_video_stats(&mut self, stats: SessionStats) {
        self.health.video_stats = stats;
    }

    /// Barrier status push (or the initial status fetch).
    pub fn on_barrier(&mut self, observed: BarrierState, now: Instant) -> Vec<Action> {
        self.barrier.enabled = observed.enabled;

        match self.state {
            GateState::Requesting | GateState::Closing => {
                // Reconciled when the call completes
                self.observed_during_call = Some(observed);
                Vec::new()
            }
            GateState::Idle | GateState::Candidate => {
                self.barrier = observed;
                if observed.is_open {
                    self.debounce.cancel();
                    self.enter_open(now);
                    info!(camera_id = %self.camera_id(), "[GateController] barrier opened externally");
                    vec![self.notice(NoticeLevel::Info, "Barrier opened")]
                } else {
                    Vec::new()
                }
            }
            GateState::Open => {
                self.barrier = observed;
                if observed.is_open {
                    Vec::new()
                } else {
                    // External close: pass through CLOSING to IDLE
                    self.state = GateState::Closing;
                    self.end_cycle();
                    info!(camera_id = %self.camera_id(), "[GateController] barrier closed externally");
                    vec![self.notice(NoticeLevel::Info, "Barrier closed")]
                }
            }
        }
    }

    /// Fire due timers: debounce, staleness, auto-close.
    pub fn tick(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();

        self.resolver.expire(now);

        if let Some(key) = self.debounce.poll(now) {
            actions.extend(self.on_debounce_expired(key));
        }

        if self.auto_close_at.is_some_and(|at| now >= at) {
            self.auto_close_at = None;
            if self.state == GateState::Open
                && self.in_flight.is_none()
                && self.session.endpoints.actuator.is_some()
            {
                info!(camera_id = %self.camera_id(), "[GateController] auto-close delay elapsed");
                actions.extend(self.issue_close(Trigger::Auto));
            }
        }

        actions
    }

    // ========================================================================
    // Operator commands
    // ========================================================================

    /// Manual plate entry. Invalid text is rejected and nothing changes.
    pub fn set_override(&mut self, raw: &str, now: Instant) -> Result<Vec<Action>, ControllerError> {
        let text = self.resolver.set_override(raw)?;
        info!(camera_id = %self.camera_id(), plate = %text, "[GateController] manual override set");
        Ok(self.on_plate_published(text, now))
    }

    pub fn clear_override(&mut self) -> bool {
        let cleared = self.resolver.clear_override();
        if cleared {
            info!(camera_id = %self.camera_id(), "[GateController] manual override cleared");
        }
        cleared
    }

    /// Operator open. An operator-supplied plate is applied as an override
    /// first, so it is validated like any manual entry.
    pub fn request_open(
        &mut self,
        plate: Option<&str>,
        now: Instant,
    ) -> Result<Vec<Action>, ControllerError> {
        if self.in_flight.is_some() {
            return Err(ControllerError::RequestInFlight);
        }
        if self.barrier.is_open || self.state == GateState::Open {
            return Err(ControllerError::BarrierOpen);
        }
        if self.session.endpoints.actuator.is_none() {
            return Err(ControllerError::NoActuator);
        }

        let mut actions = Vec::new();
        if let Some(raw) = plate.filter(|p| !p.trim().is_empty()) {
            actions.extend(self.set_override(raw, now)?);
        }
        if self.state != GateState::Candidate || self.resolver.plate().is_none() {
            return Err(ControllerError::NoPlate);
        }

        self.confirmed_plate = None;
        actions.extend(self.issue_open(Trigger::Manual));
        Ok(actions)
    }

    /// Operator close. Also accepted outside OPEN to re-sync a barrier the
    /// controller believes closed.
    pub fn request_close(&mut self) -> Result<Vec<Action>, ControllerError> {
        match self.in_flight.as_ref().map(|f| f.action) {
            Some(GateAction::Close) => return Err(ControllerError::CloseInFlight),
            Some(GateAction::Open) => return Err(ControllerError::RequestInFlight),
            None => {}
        }
        if self.session.endpoints.actuator.is_none() {
            return Err(ControllerError::NoActuator);
        }
        Ok(self.issue_close(Trigger::Manual))
    }

    // ========================================================================
    // Actuator completions
    // ========================================================================

    pub fn on_open_result(
        &mut self,
        request_id: u64,
        result: Result<OpenAck, ActuatorError>,
        now: Instant,
    ) -> Vec<Action> {
        let Some(call) = self.take_in_flight(request_id, GateAction::Open) else {
            return Vec::new();
        };
        let observed = self.observed_during_call.take();
        let mut actions = Vec::new();

        match result {
            Ok(ack) if ack.barrier_opened => {
                self.barrier = BarrierState::observed(true, self.barrier.enabled);
                self.vehicle_info = ack.vehicle_info.clone();
                self.enter_open(now);
                let reason = non_empty(ack.message, "barrier opened");
                info!(camera_id = %self.camera_id(), plate = ?call.plate_text, "[GateController] barrier opened");
                actions.push(self.record(&call, Outcome::Ok, reason.clone(), ack.vehicle_info));
                actions.push(self.notice(NoticeLevel::Info, reason));
            }
            Ok(ack) => {
                // Passage recorded, barrier hardware disabled
                self.state = GateState::Candidate;
                self.barrier.enabled = false;
                self.confirmed_plate = call.plate_text.clone();
                self.vehicle_info = ack.vehicle_info.clone();
                let reason = non_empty(ack.message, "passage recorded, barrier disabled");
                warn!(camera_id = %self.camera_id(), plate = ?call.plate_text, "[GateController] open acknowledged but barrier disabled");
                actions.push(self.record(&call, Outcome::Ok, reason.clone(), ack.vehicle_info));
                actions.push(self.notice(NoticeLevel::Warning, reason));
                if let Some(obs) = observed {
                    actions.extend(self.on_barrier(obs, now));
                }
            }
            Err(e) => {
                self.state = GateState::Candidate;
                warn!(camera_id = %self.camera_id(), plate = ?call.plate_text, error = %e, "[GateController] open failed");
                actions.push(self.record(&call, e.outcome(), e.to_string(), None));
                actions.push(self.notice(NoticeLevel::Error, format!("Open failed: {}", e)));
                if let Some(obs) = observed {
                    actions.extend(self.on_barrier(obs, now));
                }
            }
        }
        actions
    }

    pub fn on_close_result(
        &mut self,
        request_id: u64,
        result: Result<CloseAck, ActuatorError>,
        now: Instant,
    ) -> Vec<Action> {
        let Some(call) = self.take_in_flight(request_id, GateAction::Close) else {
            return Vec::new();
        };
        let observed = self.observed_during_call.take();
        let mut actions = Vec::new();

        match result {
            Ok(ack) if !ack.is_open => {
                self.barrier = BarrierState::observed(false, self.barrier.enabled);
                self.end_cycle();
                let reason = non_empty(ack.message, "barrier closed");
                info!(camera_id = %self.camera_id(), "[GateController] barrier closed");
                actions.push(self.record(&call, Outcome::Ok, reason.clone(), None));
                actions.push(self.notice(NoticeLevel::Info, reason));
            }
            other => {
                let (outcome, reason) = match other {
                    Ok(_) => (Outcome::Failed, "barrier still reports open".to_string()),
                    Err(e) => (e.outcome(), e.to_string()),
                };
                warn!(camera_id = %self.camera_id(), error = %reason, "[GateController] close failed");
                actions.push(self.record(&call, outcome, reason.clone(), None));
                actions.push(self.notice(NoticeLevel::Error, format!("Close failed: {}", reason)));

                match observed {
                    Some(obs) if !obs.is_open => {
                        // Closed anyway
                        self.barrier = obs;
                        self.end_cycle();
                    }
                    Some(obs) => {
                        self.barrier = obs;
                        self.enter_open(now);
                    }
                    None if call.origin == GateState::Open || self.barrier.is_open => {
                        self.state = GateState::Open;
                    }
                    None => self.state = call.origin,
                }
            }
        }
        actions
    }

    /// Session teardown: back to IDLE. A call still in flight is forgotten;
    /// its completion will be ignored.
    pub fn reset(&mut self) {
        if let Some(call) = self.in_flight.take() {
            debug!(camera_id = %self.camera_id(), request_id = call.id, "[GateController] dropping in-flight call on reset");
        }
        self.observed_during_call = None;
        self.end_cycle();
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    pub fn snapshot(&self) -> GateSnapshot {
        let plate = self.resolver.plate().cloned();
        GateSnapshot {
            camera_id: self.session.camera_id.clone(),
            name: self.session.name.clone(),
            direction: self.session.direction,
            open_policy: self.session.open_policy,
            state: self.state,
            plate,
            overridden: self.resolver.is_overridden(),
            plate_image: self.resolver.image().map(str::to_string),
            reading: self.resolver.is_reading(),
            cannot_read: self.resolver.cannot_read(),
            detections: self.resolver.detections().to_vec(),
            barrier: self.barrier,
            health: self.health.clone(),
            in_flight_plate: self.in_flight.as_ref().and_then(|f| f.plate_text.clone()),
            last_decision: self.last_decision.clone(),
            vehicle_info: self.vehicle_info.clone(),
            updated_at: Some(Utc::now()),
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// A valid plate was published (auto read or override).
    fn on_plate_published(&mut self, text: String, now: Instant) -> Vec<Action> {
        match self.state {
            GateState::Idle => self.state = GateState::Candidate,
            GateState::Candidate => {}
            // In flight or already open: display only
            GateState::Requesting | GateState::Open | GateState::Closing => return Vec::new(),
        }

        match self.confirmed_plate.as_deref() {
            Some(confirmed) if confirmed == text => return Vec::new(),
            Some(_) => self.confirmed_plate = None,
            None => {}
        }

        if self.barrier.is_open
            || self.session.open_policy == OpenPolicy::Confirm
            || self.session.endpoints.actuator.is_none()
        {
            return Vec::new();
        }

        let key = DebounceKey::new(self.session.camera_id.clone(), text);
        if self.debounce.arm(key, now) {
            debug!(camera_id = %self.camera_id(), "[GateController] debounce armed");
        }
        Vec::new()
    }

    fn on_debounce_expired(&mut self, key: DebounceKey) -> Vec<Action> {
        let current = self.resolver.plate_text();
        if self.state != GateState::Candidate
            || self.barrier.is_open
            || self.in_flight.is_some()
            || current != Some(key.plate_text.as_str())
        {
            debug!(camera_id = %self.camera_id(), plate = %key.plate_text, "[GateController] stale debounce ignored");
            return Vec::new();
        }
        self.issue_open(Trigger::Auto)
    }

    fn issue_open(&mut self, trigger: Trigger) -> Vec<Action> {
        let Some(plate) = self.resolver.plate().cloned() else {
            return Vec::new();
        };
        self.debounce.cancel();
        let request_id = self.begin_call(GateAction::Open, trigger);
        if let Some(call) = self.in_flight.as_mut() {
            call.plate_text = Some(plate.text.clone());
            call.plate_source = Some(plate.source);
            call.confidence = Some(plate.confidence);
        }
        info!(camera_id = %self.camera_id(), plate = %plate.text, trigger = ?trigger, "[GateController] requesting open");
        vec![Action::Open {
            request_id,
            request: OpenRequest {
                plate_text: plate.text,
                confidence: plate.confidence,
                source: plate.source,
            },
        }]
    }

    fn issue_close(&mut self, trigger: Trigger) -> Vec<Action> {
        self.debounce.cancel();
        self.auto_close_at = None;
        let request_id = self.begin_call(GateAction::Close, trigger);
        if let Some(call) = self.in_flight.as_mut() {
            call.plate_text = self.resolver.plate_text().map(str::to_string);
            call.plate_source = self.resolver.source();
        }
        info!(camera_id = %self.camera_id(), trigger = ?trigger, "[GateController] requesting close");
        vec![Action::Close { request_id }]
    }

    fn begin_call(&mut self, action: GateAction, trigger: Trigger) -> u64 {
        self.next_request_id += 1;
        let origin = self.state;
        self.state = match action {
            GateAction::Open => GateState::Requesting,
            GateAction::Close => GateState::Closing,
        };
        self.in_flight = Some(InFlight {
            id: self.next_request_id,
            action,
            trigger,
            plate_text: None,
            plate_source: None,
            confidence: None,
            issued_at: Utc::now(),
            origin,
        });
        self.next_request_id
    }

    fn take_in_flight(&mut self, request_id: u64, action: GateAction) -> Option<InFlight> {
        let tracked = self
            .in_flight
            .as_ref()
            .is_some_and(|call| call.id == request_id && call.action == action);
        if tracked {
            self.in_flight.take()
        } else {
            debug!(camera_id = %self.camera_id(), request_id, "[GateController] ignoring completion of untracked call");
            None
        }
    }

    fn enter_open(&mut self, now: Instant) {
        self.state = GateState::Open;
        self.auto_close_at = self.auto_close_after.map(|d| now + d);
    }

    /// Vehicle cycle over: forget plate, override, indicators and timers.
    fn end_cycle(&mut self) {
        self.resolver.reset();
        self.debounce.cancel();
        self.confirmed_plate = None;
        self.auto_close_at = None;
        self.vehicle_info = None;
        self.state = GateState::Idle;
    }

    fn record(
        &mut self,
        call: &InFlight,
        outcome: Outcome,
        reason: String,
        vehicle_info: Option<VehicleInfo>,
    ) -> Action {
        let decision = GateDecision {
            id: Uuid::new_v4(),
            camera_id: self.session.camera_id.clone(),
            action: call.action,
            plate_text: call.plate_text.clone(),
            plate_source: call.plate_source,
            confidence: call.confidence,
            direction: self.session.direction,
            trigger: call.trigger,
            issued_at: call.issued_at,
            completed_at: Utc::now(),
            outcome,
            reason,
            vehicle_info,
        };
        self.last_decision = Some(decision.clone());
        Action::Record(decision)
    }

    fn notice(&self, level: NoticeLevel, message: impl Into<String>) -> Action {
        Action::Notify(Notice::new(&self.session.camera_id, level, message))
    }
}

fn non_empty(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

// ============================================================================
// Tests
// ============================================================================
