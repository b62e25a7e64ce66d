//! Clock gate: is the indefinite-retention window open right now?

use chrono::{DateTime, TimeZone};
use presence_gateway_api::Clock;
use presence_util::RetentionWindow;
use std::sync::Arc;

/// Pure window predicate for an explicit instant
pub fn is_retention_window_active<Z: TimeZone>(window: &RetentionWindow, now: &DateTime<Z>) -> bool {
    window.is_active(now)
}

/// Window predicate bound to an injected clock
#[derive(Clone)]
pub struct ClockGate {
    window: RetentionWindow,
    clock: Arc<dyn Clock>,
}

impl ClockGate {
    pub fn new(window: RetentionWindow, clock: Arc<dyn Clock>) -> Self {
        Self { window, clock }
    }

    pub fn is_active(&self) -> bool {
        is_retention_window_active(&self.window, &self.clock.now())
    }

    pub fn window(&self) -> &RetentionWindow {
        &self.window
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
