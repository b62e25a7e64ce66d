//! Occupancy guard

use presence_gateway_api::Gateway;
use presence_util::{Identity, ResourceId};
use std::sync::Arc;
use tracing::debug;

use crate::PresenceResult;

/// Counts who, other than the automation itself, is in the target
#[derive(Clone)]
pub struct OccupancyGuard {
    gateway: Arc<dyn Gateway>,
    self_identity: Identity,
}

impl OccupancyGuard {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        let self_identity = gateway.self_identity();
        Self {
            gateway,
            self_identity,
        }
    }

    /// Fails with `ResourceNotFound` when the resource no longer resolves
    pub async fn occupant_count_excluding_self(&self, resource: &ResourceId) -> PresenceResult<usize> {
        let occupants = self.gateway.occupants(resource).await?;
        let others = occupants
            .iter()
            .filter(|who| **who != self.self_identity)
            .count();

        debug!(resource = %resource, total = occupants.len(), others, "Occupancy checked");
        Ok(others)
    }
}
