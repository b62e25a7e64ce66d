//! Control loop: merges ticks and relay signals into one consumer

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::{PresenceEngine, PresenceEvent, PresenceSignal, PresenceSnapshot};

/// Drives a [`PresenceEngine`] until the shutdown flag flips.
///
/// Shutdown wins over signals and signals win over ticks, so an override
/// that arrived while an acquisition was running is applied before the
/// next tick can act on stale state.
pub struct PresenceLoop {
    engine: PresenceEngine,
    signals: mpsc::UnboundedReceiver<PresenceSignal>,
    shutdown: watch::Receiver<bool>,
}

impl PresenceLoop {
    pub fn new(
        engine: PresenceEngine,
        signals: mpsc::UnboundedReceiver<PresenceSignal>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            engine,
            signals,
            shutdown,
        }
    }

    /// Run to completion. `observer` sees the snapshot after every step that
    /// produced events, including the final release.
    pub async fn run<F>(mut self, mut observer: F) -> PresenceEngine
    where
        F: FnMut(&PresenceSnapshot, &[PresenceEvent]),
    {
        let mut ticker = tokio::time::interval(self.engine.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut signals_open = true;

        info!(
            resource = %self.engine.target(),
            tick_secs = self.engine.tick_interval().as_secs(),
            "Presence loop running"
        );

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let events = tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown sender dropped, stopping");
                        break;
                    }
                    continue;
                }

                signal = self.signals.recv(), if signals_open => match signal {
                    Some(signal) => self.engine.handle_signal(signal).await,
                    None => {
                        warn!("Signal channel closed, continuing on ticks only");
                        signals_open = false;
                        continue;
                    }
                },

                _ = ticker.tick() => self.engine.tick().await,
            };

            if !events.is_empty() {
                observer(&self.engine.snapshot(), &events);
            }
        }

        let events = self.engine.shutdown().await;
        observer(&self.engine.snapshot(), &events);
        self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventRelay, NoopKeepAlive, PresenceState};
    use presence_config::PresenceConfig;
    use presence_gateway_api::{Gateway, MockClock, MockGateway, PresenceChange};
    use presence_util::{Identity, ResourceId};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn lounge() -> ResourceId {
        ResourceId::new("lounge")
    }

    fn setup() -> (Arc<MockGateway>, PresenceEngine) {
        let config = PresenceConfig::new(lounge());
        let gateway = Arc::new(
            MockGateway::new(Identity::new("me"))
                .with_resource(lounge())
                .with_resource(ResourceId::new("office")),
        );
        let clock = Arc::new(MockClock::at(config.timezone, 2025, 12, 25, 12, 0));
        let engine = PresenceEngine::new(
            &config,
            gateway.clone(),
            clock,
            Arc::new(NoopKeepAlive),
            StdRng::seed_from_u64(3),
        )
        .unwrap();
        (gateway, engine)
    }

    #[tokio::test(start_paused = true)]
    async fn loop_acquires_then_releases_on_shutdown() {
        let (gateway, engine) = setup();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_observer = seen.clone();
        let task = tokio::spawn(PresenceLoop::new(engine, signal_rx, shutdown_rx).run(
            move |snapshot, _events| seen_by_observer.lock().unwrap().push(snapshot.state),
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(gateway.is_joined());

        shutdown_tx.send(true).unwrap();
        let engine = task.await.unwrap();

        assert_eq!(engine.state(), PresenceState::Idle);
        assert!(!gateway.is_joined());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![PresenceState::Connected, PresenceState::Idle]
        );
        drop(signal_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_yields_to_relayed_arrival() {
        let (gateway, engine) = setup();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let relay = EventRelay::new(gateway.self_identity(), lounge());
        let relay_task = relay.spawn(gateway.subscribe(), signal_tx);

        let task = tokio::spawn(PresenceLoop::new(engine, signal_rx, shutdown_rx).run(|_, _| {}));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(gateway.is_joined());

        gateway.move_identity(Identity::new("guest"), Some(lounge()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!gateway.is_joined());

        // Guest stays: busy re-checks never join
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(gateway.join_count(), 1);

        shutdown_tx.send(true).unwrap();
        let engine = task.await.unwrap();
        assert_eq!(engine.state(), PresenceState::BusyWait);
        relay_task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_arrival_is_harmless() {
        let (gateway, engine) = setup();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let relay = EventRelay::new(gateway.self_identity(), lounge());
        let relay_task = relay.spawn(gateway.subscribe(), signal_tx);

        let task = tokio::spawn(PresenceLoop::new(engine, signal_rx, shutdown_rx).run(|_, _| {}));

        tokio::time::sleep(Duration::from_secs(1)).await;
        gateway.move_identity(Identity::new("guest"), Some(lounge()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(gateway.leave_count(), 1);

        let arrival = PresenceChange {
            identity: Identity::new("guest"),
            from: None,
            to: Some(lounge()),
        };
        gateway.redeliver(arrival.clone());
        gateway.redeliver(arrival);
        tokio::time::sleep(Duration::from_secs(1)).await;

        shutdown_tx.send(true).unwrap();
        let engine = task.await.unwrap();
        assert_eq!(engine.state(), PresenceState::BusyWait);
        assert_eq!(gateway.join_count(), 1);
        assert_eq!(gateway.leave_count(), 1);
        relay_task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn override_ends_when_operator_disconnects_from_target() {
        let (gateway, engine) = setup();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let me = gateway.self_identity();

        let relay = EventRelay::new(me.clone(), lounge());
        let relay_task = relay.spawn(gateway.subscribe(), signal_tx);

        let states = Arc::new(Mutex::new(Vec::new()));
        let seen_by_observer = states.clone();
        let task = tokio::spawn(PresenceLoop::new(engine, signal_rx, shutdown_rx).run(
            move |snapshot, _events| seen_by_observer.lock().unwrap().push(snapshot.state),
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(gateway.is_joined());

        // Operator takes over: office, then the target itself, then hangs up
        gateway.move_identity(me.clone(), Some(ResourceId::new("office")));
        tokio::time::sleep(Duration::from_secs(1)).await;
        gateway.move_identity(me.clone(), Some(lounge()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(gateway.join_count(), 1);
        gateway.move_identity(me, None);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(gateway.is_joined());
        assert_eq!(gateway.join_count(), 2);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(
            *states.lock().unwrap(),
            vec![
                PresenceState::Connected,
                PresenceState::ManualOverride,
                PresenceState::Idle,
                PresenceState::Connected,
                PresenceState::Idle,
            ]
        );
        relay_task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn override_queued_before_tick_wins() {
        let (gateway, engine) = setup();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Already waiting when the loop starts, alongside the first tick
        signal_tx
            .send(PresenceSignal::SelfMovedAway {
                destination: Some(ResourceId::new("office")),
            })
            .unwrap();

        let task = tokio::spawn(PresenceLoop::new(engine, signal_rx, shutdown_rx).run(|_, _| {}));
        tokio::time::sleep(Duration::from_secs(120)).await;

        shutdown_tx.send(true).unwrap();
        let engine = task.await.unwrap();
        assert_eq!(engine.state(), PresenceState::ManualOverride);
        assert_eq!(gateway.join_count(), 0);
    }
}
