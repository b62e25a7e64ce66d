//! Acquisition retry loop
//!
//! Occupancy checks and joins are not atomic with respect to other actors,
//! so joins are optimistic: an "already connected" conflict forces a full
//! release and retries the same attempt slot.

use presence_config::AcquisitionConfig;
use presence_gateway_api::{Gateway, GatewayError, SessionHandle};
use presence_util::ResourceId;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{PresenceError, PresenceResult};

/// Outcome of a successful acquisition
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub handle: SessionHandle,
    /// Attempt slot that succeeded (1-based)
    pub attempt: u32,
    /// Conflicts absorbed along the way
    pub conflicts: u32,
}

pub struct Acquirer {
    gateway: Arc<dyn Gateway>,
    max_attempts: u32,
    retry_delay: Duration,
    conflict_settle: Duration,
    max_conflict_retries: u32,
}

impl Acquirer {
    pub fn new(gateway: Arc<dyn Gateway>, config: &AcquisitionConfig) -> Self {
        Self {
            gateway,
            max_attempts: config.max_attempts,
            retry_delay: config.retry_delay,
            conflict_settle: config.conflict_settle,
            max_conflict_retries: config.max_conflict_retries,
        }
    }

    /// Best-effort leave; failures are logged and swallowed
    pub async fn force_release(&self, resource: &ResourceId) {
        if let Err(e) = self.gateway.leave(resource).await {
            debug!(resource = %resource, error = %e, "Force release failed (ignored)");
        }
    }

    pub async fn acquire(&self, resource: &ResourceId) -> PresenceResult<Acquisition> {
        // Stale session from a previous cycle
        self.force_release(resource).await;

        let mut attempt: u32 = 0;
        let mut conflicts: u32 = 0;

        loop {
            debug!(resource = %resource, attempt = attempt + 1, "Attempting to join");

            match self.gateway.join(resource).await {
                Ok(handle) => {
                    info!(
                        resource = %resource,
                        attempt = attempt + 1,
                        conflicts,
                        "Joined target"
                    );
                    return Ok(Acquisition {
                        handle,
                        attempt: attempt + 1,
                        conflicts,
                    });
                }

                Err(GatewayError::AlreadyConnected) => {
                    conflicts += 1;
                    if conflicts > self.max_conflict_retries {
                        warn!(resource = %resource, conflicts, "Conflict retries exhausted");
                        return Err(PresenceError::AcquisitionExhausted {
                            attempts: attempt,
                            conflicts,
                        });
                    }

                    warn!(
                        resource = %resource,
                        attempt = attempt + 1,
                        conflicts,
                        "Already connected, forcing cleanup"
                    );
                    self.force_release(resource).await;
                    tokio::time::sleep(self.conflict_settle).await;
                }

                Err(GatewayError::NotFound(id)) => {
                    return Err(PresenceError::ResourceNotFound(id));
                }

                Err(e) => {
                    attempt += 1;
                    warn!(
                        resource = %resource,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Join attempt failed"
                    );
                    if attempt >= self.max_attempts {
                        return Err(PresenceError::AcquisitionExhausted {
                            attempts: attempt,
                            conflicts,
                        });
                    }
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}
