//! Error taxonomy of the presence engine

use presence_gateway_api::GatewayError;
use presence_util::ResourceId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresenceError {
    /// Network or timeout trouble; retried with backoff
    #[error("Transient gateway fault: {0}")]
    TransientGatewayFault(#[source] GatewayError),

    /// Gateway reports we are already connected
    #[error("Resource conflict: already connected")]
    ResourceConflict,

    #[error("Resource not found: {0}")]
    ResourceNotFound(ResourceId),

    #[error("Acquisition exhausted after {attempts} attempt(s) and {conflicts} conflict(s)")]
    AcquisitionExhausted { attempts: u32, conflicts: u32 },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<GatewayError> for PresenceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::AlreadyConnected => Self::ResourceConflict,
            GatewayError::NotFound(id) => Self::ResourceNotFound(id),
            other => Self::TransientGatewayFault(other),
        }
    }
}

pub type PresenceResult<T> = Result<T, PresenceError>;
