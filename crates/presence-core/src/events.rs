//! Signals consumed and events emitted by the presence engine

use chrono::{DateTime, FixedOffset};
use presence_util::{Identity, ResourceId, SessionId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{PresenceState, RetentionPolicy};

/// Typed occupancy signal produced by the event relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceSignal {
    /// The automated account's own presence moved away from the target.
    /// `Some` starts a manual override, `None` ends it.
    SelfMovedAway { destination: Option<ResourceId> },

    /// Someone else arrived in the target
    OtherJoinedTarget { identity: Identity },
}

/// Why a held session was given up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    RetentionExpired,
    OccupantJoined,
    ManualOverride,
    ResourceLost,
    Shutdown,
}

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    StateChanged {
        from: PresenceState,
        to: PresenceState,
    },

    /// Session acquired
    Acquired {
        session_id: SessionId,
        resource: ResourceId,
        retention: RetentionPolicy,
        attempts: u32,
        /// Conflicts recovered from on the way, not counted in `attempts`
        conflicts: u32,
    },

    /// Session released
    Released {
        session_id: SessionId,
        reason: ReleaseReason,
        held_for: Duration,
    },

    /// Retry budget consumed without a join
    AcquisitionFailed { attempts: u32, conflicts: u32 },

    /// Per-tick fault absorbed by the engine
    Fault {
        state: PresenceState,
        message: String,
        retry_in: Duration,
    },
}

/// Serializable view of the engine for status reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub state: PresenceState,
    pub target: ResourceId,
    pub session: Option<SessionSnapshot>,

    /// Seconds until ticks may acquire or re-check again
    pub resumes_in_secs: Option<u64>,
    pub last_fault: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub acquired_at: DateTime<FixedOffset>,
    pub retention: RetentionPolicy,
    pub deadline: Option<DateTime<FixedOffset>>,
    pub remaining_secs: Option<u64>,
    pub keepalive_active: bool,
}
