//! In-process gateway for tests and loopback runs

use async_trait::async_trait;
use presence_util::{Identity, ResourceId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{Gateway, GatewayError, GatewayResult, PresenceChange, SessionHandle};

/// A gateway call, recorded in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Join(ResourceId),
    Leave(ResourceId),
    Occupants(ResourceId),
}

#[derive(Debug, Default)]
struct MockState {
    /// Known resources and who is in them
    resources: HashMap<ResourceId, HashSet<Identity>>,
    /// Resource the automation is joined to
    joined: Option<ResourceId>,
    /// Connection number of the live join
    connection: Option<u64>,
    /// Outcomes for upcoming joins; `None` means succeed
    join_script: VecDeque<Option<GatewayError>>,
    /// Failure returned by every occupants query while set
    occupants_failure: Option<GatewayError>,
    calls: Vec<GatewayCall>,
    frames_sent: u64,
}

impl MockState {
    fn disconnect(&mut self) {
        self.joined = None;
        self.connection = None;
    }
}

/// Simulated voice gateway
///
/// Keeps an in-memory map of resources and their occupants, emits presence
/// notifications for every membership change, and can be scripted to fail.
pub struct MockGateway {
    self_identity: Identity,
    next_connection: AtomicU64,
    state: Arc<Mutex<MockState>>,
    event_tx: mpsc::UnboundedSender<PresenceChange>,
    event_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<PresenceChange>>>>,
}

impl MockGateway {
    pub fn new(self_identity: Identity) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            self_identity,
            next_connection: AtomicU64::new(1),
            state: Arc::new(Mutex::new(MockState::default())),
            event_tx: tx,
            event_rx: Arc::new(Mutex::new(Some(rx))),
        }
    }

    /// Register an empty resource
    pub fn with_resource(self, resource: ResourceId) -> Self {
        self.add_resource(resource);
        self
    }

    pub fn add_resource(&self, resource: ResourceId) {
        self.state
            .lock()
            .unwrap()
            .resources
            .entry(resource)
            .or_default();
    }

    /// Delete a resource; occupants are dropped silently
    pub fn remove_resource(&self, resource: &ResourceId) {
        let mut state = self.state.lock().unwrap();
        state.resources.remove(resource);
        if state.joined.as_ref() == Some(resource) {
            state.disconnect();
        }
    }

    /// Queue outcomes for the next joins, in order
    pub fn script_joins(&self, outcomes: impl IntoIterator<Item = Option<GatewayError>>) {
        self.state.lock().unwrap().join_script.extend(outcomes);
    }

    /// Make every occupants query fail until cleared with `None`
    pub fn fail_occupants(&self, failure: Option<GatewayError>) {
        self.state.lock().unwrap().occupants_failure = failure;
    }

    /// Move any identity between resources and notify subscribers
    pub fn move_identity(&self, identity: Identity, to: Option<ResourceId>) {
        let from = {
            let mut state = self.state.lock().unwrap();
            let from = state
                .resources
                .iter()
                .find(|(_, members)| members.contains(&identity))
                .map(|(id, _)| id.clone());

            if let Some(from) = &from
                && let Some(members) = state.resources.get_mut(from)
            {
                members.remove(&identity);
            }
            if let Some(to) = &to {
                state.resources.entry(to.clone()).or_default().insert(identity.clone());
            }
            if identity == self.self_identity {
                state.disconnect();
            }
            from
        };

        let _ = self.event_tx.send(PresenceChange { identity, from, to });
    }

    /// Re-send a notification without touching membership (duplicate delivery)
    pub fn redeliver(&self, change: PresenceChange) {
        let _ = self.event_tx.send(change);
    }

    /// Whether the automation currently holds a join
    pub fn is_joined(&self) -> bool {
        self.state.lock().unwrap().joined.is_some()
    }

    pub fn members_of(&self, resource: &ResourceId) -> HashSet<Identity> {
        self.state
            .lock()
            .unwrap()
            .resources
            .get(resource)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn join_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, GatewayCall::Join(_)))
            .count()
    }

    pub fn leave_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, GatewayCall::Leave(_)))
            .count()
    }

    pub fn frames_sent(&self) -> u64 {
        self.state.lock().unwrap().frames_sent
    }
}

#[async_trait]
impl Gateway for MockGateway {
    fn self_identity(&self) -> Identity {
        self.self_identity.clone()
    }

    async fn join(&self, resource: &ResourceId) -> GatewayResult<SessionHandle> {
        let (change, connection) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(GatewayCall::Join(resource.clone()));

            if let Some(Some(failure)) = state.join_script.pop_front() {
                debug!(resource = %resource, error = %failure, "Scripted join failure");
                return Err(failure);
            }
            if state.joined.is_some() {
                return Err(GatewayError::AlreadyConnected);
            }

            let members = state
                .resources
                .get_mut(resource)
                .ok_or_else(|| GatewayError::NotFound(resource.clone()))?;
            members.insert(self.self_identity.clone());
            let connection = self.next_connection.fetch_add(1, Ordering::SeqCst);
            state.joined = Some(resource.clone());
            state.connection = Some(connection);

            let change = PresenceChange {
                identity: self.self_identity.clone(),
                from: None,
                to: Some(resource.clone()),
            };
            (change, connection)
        };

        let _ = self.event_tx.send(change);
        Ok(SessionHandle::new(resource.clone(), connection))
    }

    async fn leave(&self, resource: &ResourceId) -> GatewayResult<()> {
        let change = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(GatewayCall::Leave(resource.clone()));

            if state.joined.as_ref() == Some(resource) {
                state.disconnect();
            }

            let removed = state
                .resources
                .get_mut(resource)
                .map(|members| members.remove(&self.self_identity))
                .unwrap_or(false);

            removed.then(|| PresenceChange {
                identity: self.self_identity.clone(),
                from: Some(resource.clone()),
                to: None,
            })
        };

        if let Some(change) = change {
            let _ = self.event_tx.send(change);
        }
        Ok(())
    }

    async fn occupants(&self, resource: &ResourceId) -> GatewayResult<HashSet<Identity>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::Occupants(resource.clone()));

        if let Some(failure) = &state.occupants_failure {
            return Err(failure.clone());
        }

        state
            .resources
            .get(resource)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(resource.clone()))
    }

    async fn send_frame(&self, session: &SessionHandle, _frame: &[u8]) -> GatewayResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.joined.as_ref() != Some(&session.resource) {
            return Err(GatewayError::Transport("session is not connected".into()));
        }
        if state.connection != Some(session.connection()) {
            return Err(GatewayError::Transport("session handle is stale".into()));
        }
        state.frames_sent += 1;
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<PresenceChange> {
        self.event_rx
            .lock()
            .unwrap()
            .take()
            .expect("subscribe() can only be called once")
    }
}
