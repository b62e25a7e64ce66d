//! Event relay: raw presence notifications to typed signals

use presence_gateway_api::PresenceChange;
use presence_util::{Identity, ResourceId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::PresenceSignal;

/// Maps gateway notifications about the target into [`PresenceSignal`]s
#[derive(Debug, Clone)]
pub struct EventRelay {
    self_identity: Identity,
    target: ResourceId,
}

impl EventRelay {
    pub fn new(self_identity: Identity, target: ResourceId) -> Self {
        Self {
            self_identity,
            target,
        }
    }

    pub fn map(&self, change: &PresenceChange) -> Option<PresenceSignal> {
        let to_target = change.to.as_ref() == Some(&self.target);
        let from_target = change.from.as_ref() == Some(&self.target);

        if change.identity == self.self_identity {
            // Disconnects from anywhere, the target included, end an override.
            // Outside an override the engine ignores them.
            return match &change.to {
                Some(_) if to_target => None,
                Some(elsewhere) => Some(PresenceSignal::SelfMovedAway {
                    destination: Some(elsewhere.clone()),
                }),
                None => Some(PresenceSignal::SelfMovedAway { destination: None }),
            };
        }

        if to_target && !from_target {
            return Some(PresenceSignal::OtherJoinedTarget {
                identity: change.identity.clone(),
            });
        }

        None
    }

    /// Forward mapped signals until either side of the pipe closes
    pub fn spawn(
        self,
        mut changes: mpsc::UnboundedReceiver<PresenceChange>,
        signals: mpsc::UnboundedSender<PresenceSignal>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(change) = changes.recv().await {
                let Some(signal) = self.map(&change) else {
                    debug!(identity = %change.identity, "Presence change ignored");
                    continue;
                };

                debug!(signal = ?signal, "Relaying presence signal");
                if signals.send(signal).is_err() {
                    break;
                }
            }
            info!("Event relay stopped");
        })
    }
}
