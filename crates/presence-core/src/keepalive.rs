//! Keep-alive emitter
//!
//! The voice transport tears down connections that stay silent for too long.
//! While a session is held we stream Opus silence frames at a fixed cadence.
//! The frames carry no content.

use presence_gateway_api::{Gateway, SessionHandle};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Opus encoding of 20 ms of silence
pub const SILENCE_FRAME: [u8; 3] = [0xF8, 0xFF, 0xFE];

/// Starts and stops filler emission on a held session. Both calls are idempotent.
pub trait KeepAlive: Send + Sync {
    fn start(&self, session: &SessionHandle);
    fn stop(&self);
    fn is_active(&self) -> bool;
}

/// Streams [`SILENCE_FRAME`] through the gateway from a background task
pub struct SilenceEmitter {
    gateway: Arc<dyn Gateway>,
    period: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SilenceEmitter {
    pub fn new(gateway: Arc<dyn Gateway>, period: Duration) -> Self {
        Self {
            gateway,
            period,
            task: Mutex::new(None),
        }
    }
}

impl KeepAlive for SilenceEmitter {
    fn start(&self, session: &SessionHandle) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        info!(
            session_id = %session.session_id,
            period_ms = self.period.as_millis() as u64,
            "Starting silent audio keep-alive"
        );

        let gateway = self.gateway.clone();
        let session = session.clone();
        let period = self.period;
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = gateway.send_frame(&session, &SILENCE_FRAME).await {
                    debug!(session_id = %session.session_id, error = %e, "Keep-alive frame dropped");
                }
            }
        }));
    }

    fn stop(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            info!("Stopping silent audio keep-alive");
        }
    }

    fn is_active(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SilenceEmitter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Used when keep-alive is disabled in configuration
#[derive(Debug, Default)]
pub struct NoopKeepAlive;

impl KeepAlive for NoopKeepAlive {
    fn start(&self, _session: &SessionHandle) {}
    fn stop(&self) {}
    fn is_active(&self) -> bool {
        false
    }
}
