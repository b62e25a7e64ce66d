//! Session handle abstraction

use presence_util::{ResourceId, SessionId};
use serde::{Deserialize, Serialize};

/// Opaque handle to a joined voice session
///
/// Created by the gateway on a successful join and passed back to it for
/// frame transmission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub session_id: SessionId,
    pub resource: ResourceId,

    /// Adapter-specific connection number
    connection: u64,
}

impl SessionHandle {
    pub fn new(resource: ResourceId, connection: u64) -> Self {
        Self {
            session_id: SessionId::new(),
            resource,
            connection,
        }
    }

    pub fn connection(&self) -> u64 {
        self.connection
    }
}
