//! Presence state machine

use presence_config::{PresenceConfig, RetentionConfig, ScheduleConfig};
use presence_gateway_api::{Clock, Gateway};
use presence_util::ResourceId;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    Acquirer, Acquisition, ClockGate, KeepAlive, OccupancyGuard, PresenceError, PresenceEvent,
    PresenceResult, PresenceSignal, PresenceSnapshot, PresenceState, ReleaseReason,
    RetentionPolicy, Session, SessionSnapshot,
};

/// Stand-in for delays too large to add to an [`Instant`]
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The presence engine
///
/// Owns the state and the held session. Every input arrives through
/// [`PresenceEngine::tick`] or [`PresenceEngine::handle_signal`], which are
/// called from a single task, so no transition ever interleaves with another.
pub struct PresenceEngine {
    target: ResourceId,
    state: PresenceState,
    session: Option<Session>,

    gateway: Arc<dyn Gateway>,
    keepalive: Arc<dyn KeepAlive>,
    gate: ClockGate,
    occupancy: OccupancyGuard,
    acquirer: Acquirer,
    rng: StdRng,

    retention: RetentionConfig,
    schedule: ScheduleConfig,

    /// Ticks before this instant leave the state alone
    not_before: Option<Instant>,
    last_fault: Option<String>,
}

impl PresenceEngine {
    pub fn new(
        config: &PresenceConfig,
        gateway: Arc<dyn Gateway>,
        clock: Arc<dyn Clock>,
        keepalive: Arc<dyn KeepAlive>,
        rng: StdRng,
    ) -> PresenceResult<Self> {
        if config.acquisition.max_attempts == 0 {
            return Err(PresenceError::Configuration(
                "max_attempts must be at least 1".into(),
            ));
        }
        if config.schedule.tick.is_zero() {
            return Err(PresenceError::Configuration(
                "tick interval must be positive".into(),
            ));
        }

        info!(
            resource = %config.target,
            window = %format!("{}-{}", config.retention.window.start, config.retention.window.end),
            max_attempts = config.acquisition.max_attempts,
            "Presence engine initialized"
        );

        Ok(Self {
            target: config.target.clone(),
            state: PresenceState::Idle,
            session: None,
            gate: ClockGate::new(config.retention.window, clock),
            occupancy: OccupancyGuard::new(gateway.clone()),
            acquirer: Acquirer::new(gateway.clone(), &config.acquisition),
            gateway,
            keepalive,
            rng,
            retention: config.retention.clone(),
            schedule: config.schedule.clone(),
            not_before: None,
            last_fault: None,
        })
    }

    pub fn state(&self) -> PresenceState {
        self.state
    }

    pub fn target(&self) -> &ResourceId {
        &self.target
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn tick_interval(&self) -> Duration {
        self.schedule.tick
    }

    /// Periodic evaluation. Faults are absorbed into a backoff gate.
    pub async fn tick(&mut self) -> Vec<PresenceEvent> {
        let mut events = Vec::new();

        let result = match self.state {
            PresenceState::ManualOverride => Ok(()),
            PresenceState::Idle => self.tick_idle(&mut events).await,
            PresenceState::BusyWait => self.tick_busy(&mut events).await,
            PresenceState::Connected => self.tick_connected(&mut events).await,
        };

        if let Err(err) = result {
            self.record_fault(err, &mut events).await;
        }

        events
    }

    /// Apply a relay signal. Signals that do not apply to the current state are ignored.
    pub async fn handle_signal(&mut self, signal: PresenceSignal) -> Vec<PresenceEvent> {
        let mut events = Vec::new();

        match signal {
            PresenceSignal::SelfMovedAway {
                destination: Some(destination),
            } if destination != self.target => {
                if self.state == PresenceState::ManualOverride {
                    debug!(destination = %destination, "Already in manual override");
                    return events;
                }

                info!(
                    destination = %destination,
                    state = %self.state,
                    "Account moved elsewhere, suspending automation"
                );
                self.release(ReleaseReason::ManualOverride, &mut events).await;
                self.not_before = None;
                self.transition(PresenceState::ManualOverride, &mut events);
            }

            PresenceSignal::SelfMovedAway { destination: None }
                if self.state == PresenceState::ManualOverride =>
            {
                info!("Account disconnected, resuming automation");
                self.not_before = None;
                self.transition(PresenceState::Idle, &mut events);
            }

            PresenceSignal::OtherJoinedTarget { identity }
                if self.state == PresenceState::Connected =>
            {
                info!(identity = %identity, resource = %self.target, "Someone joined, yielding");
                self.release(ReleaseReason::OccupantJoined, &mut events).await;
                self.transition(PresenceState::BusyWait, &mut events);
                self.arm(self.schedule.busy_retry);
            }

            other => {
                debug!(signal = ?other, state = %self.state, "Signal ignored");
            }
        }

        events
    }

    /// Release any held session before the process exits
    pub async fn shutdown(&mut self) -> Vec<PresenceEvent> {
        let mut events = Vec::new();
        self.release(ReleaseReason::Shutdown, &mut events).await;
        if self.state == PresenceState::Connected {
            self.transition(PresenceState::Idle, &mut events);
        }
        info!(state = %self.state, "Presence engine stopped");
        events
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        let now = Instant::now();

        PresenceSnapshot {
            state: self.state,
            target: self.target.clone(),
            session: self.session.as_ref().map(|s| SessionSnapshot {
                session_id: s.handle.session_id.clone(),
                acquired_at: s.acquired_at.fixed_offset(),
                retention: s.retention,
                deadline: s.deadline.map(|d| d.fixed_offset()),
                remaining_secs: match s.retention {
                    RetentionPolicy::UntilWindowCloses => {
                        self.gate.window().remaining(&self.gate.clock().now())
                    }
                    RetentionPolicy::Fixed { .. } => s.time_remaining(now),
                }
                .map(|d| d.as_secs()),
                keepalive_active: s.keepalive_active,
            }),
            resumes_in_secs: self
                .not_before
                .filter(|t| *t > now)
                .map(|t| t.saturating_duration_since(now).as_secs()),
            last_fault: self.last_fault.clone(),
        }
    }

    async fn tick_idle(&mut self, events: &mut Vec<PresenceEvent>) -> PresenceResult<()> {
        if self.gated() {
            return Ok(());
        }
        self.not_before = None;

        let others = self.occupancy.occupant_count_excluding_self(&self.target).await?;
        if others > 0 {
            info!(resource = %self.target, others, "Target occupied, waiting");
            self.transition(PresenceState::BusyWait, events);
            self.arm(self.schedule.busy_retry);
            return Ok(());
        }

        match self.acquirer.acquire(&self.target).await {
            Ok(acquisition) => {
                self.enter_connected(acquisition, events);
                Ok(())
            }
            Err(PresenceError::AcquisitionExhausted {
                attempts,
                conflicts,
            }) => {
                warn!(
                    resource = %self.target,
                    attempts,
                    conflicts,
                    "Could not acquire target"
                );
                events.push(PresenceEvent::AcquisitionFailed {
                    attempts,
                    conflicts,
                });
                self.transition(PresenceState::BusyWait, events);
                self.arm(self.schedule.busy_retry);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn tick_busy(&mut self, events: &mut Vec<PresenceEvent>) -> PresenceResult<()> {
        if self.gated() {
            return Ok(());
        }

        let others = self.occupancy.occupant_count_excluding_self(&self.target).await?;
        if others == 0 {
            info!(resource = %self.target, "Target is free again");
            self.not_before = None;
            self.transition(PresenceState::Idle, events);
        } else {
            debug!(resource = %self.target, others, "Target still occupied");
            self.arm(self.schedule.busy_retry);
        }
        Ok(())
    }

    async fn tick_connected(&mut self, events: &mut Vec<PresenceEvent>) -> PresenceResult<()> {
        let expired = match &self.session {
            Some(session) => session.is_expired(Instant::now(), self.gate.is_active()),
            None => true,
        };

        if expired {
            self.release(ReleaseReason::RetentionExpired, events).await;
            self.transition(PresenceState::Idle, events);
            self.arm(self.retention.cooldown);
            return Ok(());
        }

        if self.gated() {
            return Ok(());
        }

        let others = self.occupancy.occupant_count_excluding_self(&self.target).await?;
        if others > 0 {
            info!(resource = %self.target, others, "Occupant detected on tick, yielding");
            self.release(ReleaseReason::OccupantJoined, events).await;
            self.transition(PresenceState::BusyWait, events);
            self.arm(self.schedule.busy_retry);
        }
        Ok(())
    }

    fn enter_connected(&mut self, acquisition: Acquisition, events: &mut Vec<PresenceEvent>) {
        let now = self.gate.clock().now();
        let window_active = self.gate.window().is_active(&now);
        let retention = RetentionPolicy::compute(
            window_active,
            self.retention.base,
            self.retention.jitter,
            &mut self.rng,
        );

        let mut session = Session::new(acquisition.handle, retention, now, Instant::now());
        self.keepalive.start(&session.handle);
        session.keepalive_active = true;

        match session.deadline {
            Some(deadline) => info!(
                session_id = %session.handle.session_id,
                resource = %self.target,
                until = %deadline.format("%H:%M:%S"),
                "Holding target"
            ),
            None => info!(
                session_id = %session.handle.session_id,
                resource = %self.target,
                window_end = %self.gate.window().end,
                "Holding target until the retention window closes"
            ),
        }

        events.push(PresenceEvent::Acquired {
            session_id: session.handle.session_id.clone(),
            resource: self.target.clone(),
            retention,
            attempts: acquisition.attempt,
            conflicts: acquisition.conflicts,
        });
        self.session = Some(session);
        self.last_fault = None;
        self.transition(PresenceState::Connected, events);
    }

    /// Stop the keep-alive, then leave. Leave failures are swallowed.
    async fn release(&mut self, reason: ReleaseReason, events: &mut Vec<PresenceEvent>) {
        self.keepalive.stop();

        let Some(session) = self.session.take() else {
            return;
        };

        if let Err(e) = self.gateway.leave(&session.handle.resource).await {
            warn!(
                session_id = %session.handle.session_id,
                error = %e,
                "Leave failed during release (ignored)"
            );
        }

        let held_for = session.held_for(Instant::now());
        info!(
            session_id = %session.handle.session_id,
            reason = ?reason,
            held_for = %presence_util::format_duration(held_for),
            "Released target"
        );
        events.push(PresenceEvent::Released {
            session_id: session.handle.session_id,
            reason,
            held_for,
        });
    }

    async fn record_fault(&mut self, err: PresenceError, events: &mut Vec<PresenceEvent>) {
        let retry_in = match err {
            PresenceError::ResourceNotFound(_) => self.schedule.not_found_backoff,
            _ => self.schedule.error_backoff,
        };

        warn!(
            state = %self.state,
            resource = %self.target,
            error = %err,
            retry_in_secs = retry_in.as_secs(),
            "Tick failed, backing off"
        );

        if matches!(err, PresenceError::ResourceNotFound(_))
            && self.state == PresenceState::Connected
        {
            self.release(ReleaseReason::ResourceLost, events).await;
            self.transition(PresenceState::Idle, events);
        }

        self.last_fault = Some(err.to_string());
        events.push(PresenceEvent::Fault {
            state: self.state,
            message: err.to_string(),
            retry_in,
        });
        self.arm(retry_in);
    }

    fn transition(&mut self, to: PresenceState, events: &mut Vec<PresenceEvent>) {
        let from = self.state;
        if from == to {
            return;
        }

        info!(from = %from, to = %to, "State transition");
        self.state = to;
        events.push(PresenceEvent::StateChanged { from, to });
    }

    fn arm(&mut self, delay: Duration) {
        let now = Instant::now();
        let until = now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE);
        self.not_before = Some(until);
    }

    fn gated(&self) -> bool {
        self.not_before.is_some_and(|t| Instant::now() < t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_gateway_api::{GatewayCall, GatewayError, MockClock, MockGateway};
    use presence_util::Identity;
    use rand::SeedableRng;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingKeepAlive {
        starts: AtomicUsize,
        stops: AtomicUsize,
        active: Mutex<bool>,
    }

    impl KeepAlive for RecordingKeepAlive {
        fn start(&self, _session: &presence_gateway_api::SessionHandle) {
            self.starts.fetch_add(1, Ordering::SeqCst);
            *self.active.lock().unwrap() = true;
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            *self.active.lock().unwrap() = false;
        }

        fn is_active(&self) -> bool {
            *self.active.lock().unwrap()
        }
    }

    struct Harness {
        engine: PresenceEngine,
        gateway: Arc<MockGateway>,
        keepalive: Arc<RecordingKeepAlive>,
    }

    fn lounge() -> ResourceId {
        ResourceId::new("lounge")
    }

    fn office() -> ResourceId {
        ResourceId::new("office")
    }

    fn me() -> Identity {
        Identity::new("me")
    }

    fn harness_with(config: PresenceConfig, hour: u32) -> Harness {
        let gateway = Arc::new(
            MockGateway::new(me())
                .with_resource(lounge())
                .with_resource(office()),
        );
        let clock = Arc::new(MockClock::at(config.timezone, 2025, 12, 25, hour, 0));
        let keepalive = Arc::new(RecordingKeepAlive::default());
        let engine = PresenceEngine::new(
            &config,
            gateway.clone(),
            clock,
            keepalive.clone(),
            StdRng::seed_from_u64(9),
        )
        .unwrap();

        Harness {
            engine,
            gateway,
            keepalive,
        }
    }

    /// Noon: outside the night window
    fn harness() -> Harness {
        harness_with(PresenceConfig::new(lounge()), 12)
    }

    async fn advance_and_tick(h: &mut Harness, secs: u64) -> Vec<PresenceEvent> {
        tokio::time::advance(Duration::from_secs(secs)).await;
        h.engine.tick().await
    }

    async fn connected() -> Harness {
        let mut h = harness();
        h.engine.tick().await;
        assert_eq!(h.engine.state(), PresenceState::Connected);
        h
    }

    fn moved_to(resource: ResourceId) -> PresenceSignal {
        PresenceSignal::SelfMovedAway {
            destination: Some(resource),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_tick_acquires_free_target() {
        let mut h = harness();
        let events = h.engine.tick().await;

        assert_eq!(h.engine.state(), PresenceState::Connected);
        assert!(h.engine.session().is_some());
        assert!(h.keepalive.is_active());
        assert!(h.gateway.is_joined());
        assert!(events.iter().any(|e| matches!(
            e,
            PresenceEvent::Acquired { attempts: 1, .. }
        )));
        assert_eq!(
            events.last(),
            Some(&PresenceEvent::StateChanged {
                from: PresenceState::Idle,
                to: PresenceState::Connected
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_occupied_target_defers_without_join() {
        let mut h = harness();
        h.gateway.move_identity(Identity::new("guest"), Some(lounge()));

        h.engine.tick().await;

        assert_eq!(h.engine.state(), PresenceState::BusyWait);
        assert_eq!(h.gateway.join_count(), 0);
        assert!(h.engine.session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_wait_rechecks_after_interval() {
        let mut h = harness();
        h.gateway.move_identity(Identity::new("guest"), Some(lounge()));
        h.engine.tick().await;
        h.gateway.move_identity(Identity::new("guest"), None);

        // busy_retry is 60s, ticks every 30s
        advance_and_tick(&mut h, 30).await;
        assert_eq!(h.engine.state(), PresenceState::BusyWait);

        advance_and_tick(&mut h, 30).await;
        assert_eq!(h.engine.state(), PresenceState::Idle);
        assert_eq!(h.gateway.join_count(), 0);

        advance_and_tick(&mut h, 30).await;
        assert_eq!(h.engine.state(), PresenceState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_override_from_every_state() {
        // Idle
        let mut h = harness();
        h.engine.handle_signal(moved_to(office())).await;
        assert_eq!(h.engine.state(), PresenceState::ManualOverride);
        assert!(h.engine.session().is_none());

        // BusyWait
        let mut h = harness();
        h.gateway.move_identity(Identity::new("guest"), Some(lounge()));
        h.engine.tick().await;
        assert_eq!(h.engine.state(), PresenceState::BusyWait);
        h.engine.handle_signal(moved_to(office())).await;
        assert_eq!(h.engine.state(), PresenceState::ManualOverride);

        // Connected
        let mut h = connected().await;
        h.gateway.move_identity(me(), Some(office()));
        let events = h.engine.handle_signal(moved_to(office())).await;
        assert_eq!(h.engine.state(), PresenceState::ManualOverride);
        assert!(h.engine.session().is_none());
        assert!(!h.keepalive.is_active());
        assert!(!h.gateway.members_of(&lounge()).contains(&me()));
        assert!(events.iter().any(|e| matches!(
            e,
            PresenceEvent::Released {
                reason: ReleaseReason::ManualOverride,
                ..
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_disconnect_exits_override() {
        let mut h = connected().await;
        h.engine.handle_signal(moved_to(office())).await;
        let joins = h.gateway.join_count();
        let leaves = h.gateway.leave_count();

        // Ticks, arrivals and repeated moves are all ignored
        advance_and_tick(&mut h, 3600).await;
        h.engine
            .handle_signal(PresenceSignal::OtherJoinedTarget {
                identity: Identity::new("guest"),
            })
            .await;
        h.engine.handle_signal(moved_to(office())).await;
        h.engine.handle_signal(moved_to(ResourceId::new("attic"))).await;

        assert_eq!(h.engine.state(), PresenceState::ManualOverride);
        assert_eq!(h.gateway.join_count(), joins);
        assert_eq!(h.gateway.leave_count(), leaves);

        h.engine
            .handle_signal(PresenceSignal::SelfMovedAway { destination: None })
            .await;
        assert_eq!(h.engine.state(), PresenceState::Idle);

        // Eligible again on the very next tick
        h.engine.tick().await;
        assert_eq!(h.engine.state(), PresenceState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_outside_override_is_ignored() {
        let mut h = connected().await;
        h.engine
            .handle_signal(PresenceSignal::SelfMovedAway { destination: None })
            .await;
        assert_eq!(h.engine.state(), PresenceState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_joined_releases_once() {
        let mut h = connected().await;
        h.gateway.move_identity(Identity::new("guest"), Some(lounge()));

        let signal = PresenceSignal::OtherJoinedTarget {
            identity: Identity::new("guest"),
        };
        let events = h.engine.handle_signal(signal.clone()).await;

        assert_eq!(h.engine.state(), PresenceState::BusyWait);
        assert_eq!(h.keepalive.stops.load(Ordering::SeqCst), 1);
        assert_eq!(h.gateway.calls().last(), Some(&GatewayCall::Leave(lounge())));
        assert!(!h.gateway.is_joined());

        // Leave happens before the state change is reported
        let released = events
            .iter()
            .position(|e| matches!(e, PresenceEvent::Released { .. }))
            .unwrap();
        let changed = events
            .iter()
            .position(|e| {
                matches!(
                    e,
                    PresenceEvent::StateChanged {
                        to: PresenceState::BusyWait,
                        ..
                    }
                )
            })
            .unwrap();
        assert!(released < changed);

        // Duplicate delivery is harmless
        h.engine.handle_signal(signal).await;
        assert_eq!(h.keepalive.stops.load(Ordering::SeqCst), 1);
        assert_eq!(h.engine.state(), PresenceState::BusyWait);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_tick_evicts_on_occupant() {
        let mut h = connected().await;
        h.gateway.move_identity(Identity::new("guest"), Some(lounge()));

        let events = advance_and_tick(&mut h, 30).await;
        assert_eq!(h.engine.state(), PresenceState::BusyWait);
        assert!(events.iter().any(|e| matches!(
            e,
            PresenceEvent::Released {
                reason: ReleaseReason::OccupantJoined,
                ..
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_retention_and_cooldown() {
        let mut config = PresenceConfig::new(lounge());
        config.retention.base = Duration::from_secs(3600);
        config.retention.jitter = Duration::ZERO;
        config.retention.cooldown = Duration::from_secs(900);
        let mut h = harness_with(config, 12);

        let events = h.engine.tick().await;
        assert!(events.iter().any(|e| matches!(
            e,
            PresenceEvent::Acquired {
                retention: RetentionPolicy::Fixed { duration },
                ..
            } if *duration == Duration::from_secs(3600)
        )));

        // t = 30 .. 3570
        for _ in 0..119 {
            advance_and_tick(&mut h, 30).await;
            assert_eq!(h.engine.state(), PresenceState::Connected);
        }

        // t = 3600
        advance_and_tick(&mut h, 30).await;
        assert_eq!(h.engine.state(), PresenceState::Idle);
        assert!(!h.gateway.is_joined());

        // t = 3630 .. 4470: cooling down
        for _ in 0..29 {
            advance_and_tick(&mut h, 30).await;
            assert_eq!(h.engine.state(), PresenceState::Idle);
        }
        assert_eq!(h.gateway.join_count(), 1);

        // t = 4500
        advance_and_tick(&mut h, 30).await;
        assert_eq!(h.engine.state(), PresenceState::Connected);
        assert_eq!(h.gateway.join_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_cooldown_does_not_overflow() {
        let mut config = PresenceConfig::new(lounge());
        config.retention.base = Duration::from_secs(60);
        config.retention.jitter = Duration::ZERO;
        config.retention.cooldown = Duration::from_secs(i64::MAX as u64);
        let mut h = harness_with(config, 12);

        h.engine.tick().await;
        assert_eq!(h.engine.state(), PresenceState::Connected);

        advance_and_tick(&mut h, 60).await;
        assert_eq!(h.engine.state(), PresenceState::Idle);
        assert!(h.engine.snapshot().resumes_in_secs.is_some());

        advance_and_tick(&mut h, 86_400).await;
        assert_eq!(h.engine.state(), PresenceState::Idle);
        assert_eq!(h.gateway.join_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_night_window_holds_until_close() {
        let mut h = harness_with(PresenceConfig::new(lounge()), 6);

        let events = h.engine.tick().await;
        assert!(events.iter().any(|e| matches!(
            e,
            PresenceEvent::Acquired {
                retention: RetentionPolicy::UntilWindowCloses,
                ..
            }
        )));

        // 06:00:30 .. 06:59:30
        for _ in 0..119 {
            advance_and_tick(&mut h, 30).await;
            assert_eq!(h.engine.state(), PresenceState::Connected);
        }

        // 07:00
        let events = advance_and_tick(&mut h, 30).await;
        assert_eq!(h.engine.state(), PresenceState::Idle);
        assert!(events.iter().any(|e| matches!(
            e,
            PresenceEvent::Released {
                reason: ReleaseReason::RetentionExpired,
                ..
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_keeps_attempt_slot() {
        let mut h = harness();
        h.gateway.script_joins([Some(GatewayError::AlreadyConnected)]);

        let events = h.engine.tick().await;

        assert_eq!(h.engine.state(), PresenceState::Connected);
        assert_eq!(h.gateway.join_count(), 2);
        assert!(events.iter().any(|e| matches!(
            e,
            PresenceEvent::Acquired {
                attempts: 1,
                conflicts: 1,
                ..
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_acquisition_waits_busy() {
        let mut h = harness();
        h.gateway.script_joins([
            Some(GatewayError::Timeout),
            Some(GatewayError::Timeout),
            Some(GatewayError::Timeout),
        ]);

        let events = h.engine.tick().await;

        assert_eq!(h.engine.state(), PresenceState::BusyWait);
        assert_eq!(h.gateway.join_count(), 3);
        assert!(h.engine.session().is_none());
        assert_eq!(h.keepalive.starts.load(Ordering::SeqCst), 0);
        assert!(events.contains(&PresenceEvent::AcquisitionFailed {
            attempts: 3,
            conflicts: 0
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_target_backs_off() {
        let mut h = harness();
        h.gateway.remove_resource(&lounge());

        let events = h.engine.tick().await;
        assert_eq!(h.engine.state(), PresenceState::Idle);
        assert!(events.iter().any(|e| matches!(
            e,
            PresenceEvent::Fault { retry_in, .. } if *retry_in == Duration::from_secs(60)
        )));
        assert!(h.engine.snapshot().last_fault.is_some());
        let calls = h.gateway.calls().len();

        advance_and_tick(&mut h, 30).await;
        assert_eq!(h.gateway.calls().len(), calls);

        h.gateway.add_resource(lounge());
        advance_and_tick(&mut h, 30).await;
        assert_eq!(h.engine.state(), PresenceState::Connected);
        assert!(h.engine.snapshot().last_fault.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_target_while_connected() {
        let mut h = connected().await;
        h.gateway.remove_resource(&lounge());

        let events = advance_and_tick(&mut h, 30).await;
        assert_eq!(h.engine.state(), PresenceState::Idle);
        assert!(h.engine.session().is_none());
        assert!(!h.keepalive.is_active());
        assert!(events.iter().any(|e| matches!(
            e,
            PresenceEvent::Released {
                reason: ReleaseReason::ResourceLost,
                ..
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_occupancy_fault_keeps_session() {
        let mut h = connected().await;
        h.gateway.fail_occupants(Some(GatewayError::Timeout));

        let events = advance_and_tick(&mut h, 30).await;
        assert_eq!(h.engine.state(), PresenceState::Connected);
        assert!(events.iter().any(|e| matches!(e, PresenceEvent::Fault { .. })));
        assert!(h.engine.snapshot().resumes_in_secs.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_session() {
        let mut h = connected().await;
        let events = h.engine.shutdown().await;

        assert_eq!(h.engine.state(), PresenceState::Idle);
        assert!(!h.gateway.is_joined());
        assert!(!h.keepalive.is_active());
        assert!(events.iter().any(|e| matches!(
            e,
            PresenceEvent::Released {
                reason: ReleaseReason::Shutdown,
                ..
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reports_session() {
        let h = connected().await;
        let snapshot = h.engine.snapshot();

        assert_eq!(snapshot.state, PresenceState::Connected);
        let session = snapshot.session.as_ref().unwrap();
        assert!(session.keepalive_active);
        assert!(session.deadline.is_some());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["state"], "connected");
        assert_eq!(json["target"], "lounge");
        assert_eq!(json["session"]["retention"]["kind"], "fixed");
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let mut config = PresenceConfig::new(lounge());
        config.acquisition.max_attempts = 0;
        let gateway = Arc::new(MockGateway::new(me()));
        let clock = Arc::new(presence_gateway_api::SystemClock::new(config.timezone));

        let result = PresenceEngine::new(
            &config,
            gateway,
            clock,
            Arc::new(crate::NoopKeepAlive),
            StdRng::seed_from_u64(1),
        );
        assert!(matches!(result, Err(PresenceError::Configuration(_))));
    }
}
