//! Gateway traits

use async_trait::async_trait;
use presence_util::{Identity, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::SessionHandle;

/// Errors from gateway operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Already connected to a voice resource")]
    AlreadyConnected,

    #[error("Resource not found: {0}")]
    NotFound(ResourceId),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Gateway operation timed out")]
    Timeout,
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Raw presence notification: `identity` moved from one resource to another.
///
/// `None` on either side means "not in any resource".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceChange {
    pub identity: Identity,
    pub from: Option<ResourceId>,
    pub to: Option<ResourceId>,
}

/// Voice gateway - implemented by transport adapters
///
/// Notifications are delivered at least once; ordering is preserved per
/// identity only.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Identity of the automated account
    fn self_identity(&self) -> Identity;

    /// Join the resource, returning a handle for the new session
    async fn join(&self, resource: &ResourceId) -> GatewayResult<SessionHandle>;

    /// Leave the resource. Idempotent; callers treat failures as non-fatal.
    async fn leave(&self, resource: &ResourceId) -> GatewayResult<()>;

    /// Everyone currently present in the resource, self included
    async fn occupants(&self, resource: &ResourceId) -> GatewayResult<HashSet<Identity>>;

    /// Send one audio frame over a held session
    async fn send_frame(&self, session: &SessionHandle, frame: &[u8]) -> GatewayResult<()>;

    /// Subscribe to presence notifications
    fn subscribe(&self) -> mpsc::UnboundedReceiver<PresenceChange>;
}
