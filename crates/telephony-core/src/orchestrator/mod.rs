//! Call origination and termination orchestrator
//!
//! The [`CallOrchestrator`] is the entry point for placing, answering and
//! controlling calls. It owns every live [`Connection`], the conference
//! coordinator, the hold tracker, the emergency role assignments, the single
//! emergency [`RetryCache`] and the domain selection session.
//!
//! # Architecture
//!
//! ```text
//!   place_outgoing_call / on_incoming_call
//!                 │
//!   ┌─────────────▼──────────────┐      ┌──────────────────┐
//!   │      CallOrchestrator      │─────►│  Phone selector  │
//!   │  outgoing / incoming /     │      └──────────────────┘
//!   │  cross_sub / redial        │      ┌──────────────────┐
//!   └─────────────┬──────────────┘─────►│ Domain selector  │
//!                 │ dial / bind         └──────────────────┘
//!   ┌─────────────▼──────────────┐
//!   │         Connection         │◄──── radio path events
//!   └─────────────┬──────────────┘
//!                 │ ConnectionEvent
//!   ┌─────────────▼──────────────┐
//!   │   OrchestratorListener     │──► conferences, hold tracker,
//!   └────────────────────────────┘    redial, reselection
//! ```
//!
//! Operations are split across submodules the same way the call flow is:
//! [`outgoing`] places calls, [`redial`] retries failed emergency calls and
//! reselects domains, [`cross_sub`] arbitrates between subscriptions and
//! [`incoming`] handles terminating calls.

pub mod cross_sub;
pub mod handler;
pub mod incoming;
pub mod outgoing;
pub mod redial;
pub mod request;

pub use request::OutgoingCallRequest;

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::conference::{Conference, ConferenceChange, ConferenceCoordinator};
use crate::config::{CarrierConfigProvider, OrchestratorConfig};
use crate::connection::{Connection, ConnectionListener};
use crate::disconnect::DisconnectCause;
use crate::domain_selection::{DomainSelectionSession, DomainSelector};
use crate::emergency::{EmergencyNumberClassifier, EmergencyRoles};
use crate::error::{Result, TelephonyError};
use crate::hold_tracker::{HoldTracker, Holdable, HoldableId};
use crate::phone::{DeviceState, PhoneRegistry};
use crate::retry::RetryCache;
use crate::satellite::SatelliteController;
use crate::types::{ConferenceId, ConnectionId};

use handler::OrchestratorListener;
use request::DialPlan;

/// External collaborators the orchestrator depends on
#[derive(Clone)]
pub struct Collaborators {
    pub phones: Arc<dyn PhoneRegistry>,
    pub carrier_configs: Arc<dyn CarrierConfigProvider>,
    pub emergency_numbers: Arc<dyn EmergencyNumberClassifier>,
    /// `None` when the device has no domain selection service
    pub domain_selector: Option<Arc<dyn DomainSelector>>,
    pub satellite: Arc<dyn SatelliteController>,
    pub device: Arc<dyn DeviceState>,
}

/// Lifecycle notifications of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorEvent {
    ConnectionAdded(ConnectionId),
    ConnectionRemoved(ConnectionId),
    ConferenceCreated(ConferenceId),
    ConferenceRemoved(ConferenceId),
}

pub(crate) struct OrchestratorInner {
    pub(crate) config: OrchestratorConfig,
    pub(crate) collab: Collaborators,
    pub(crate) connections: DashMap<ConnectionId, Arc<Connection>>,
    pub(crate) plans: DashMap<ConnectionId, DialPlan>,
    pub(crate) conferences: ConferenceCoordinator,
    pub(crate) hold_tracker: HoldTracker,
    pub(crate) roles: Mutex<EmergencyRoles>,
    pub(crate) retry: Mutex<Option<RetryCache>>,
    pub(crate) domain_session: DomainSelectionSession,
    pub(crate) events: broadcast::Sender<OrchestratorEvent>,
    pub(crate) listener: Arc<dyn ConnectionListener>,
}

/// Call placement entry point
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CallOrchestrator {
    pub(crate) inner: Arc<OrchestratorInner>,
}

impl std::fmt::Debug for CallOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallOrchestrator")
            .field("connections", &self.inner.connections.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl CallOrchestrator {
    pub fn new(config: OrchestratorConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(64);
        let inner = Arc::new_cyclic(|weak| OrchestratorInner {
            config,
            collab: collaborators,
            connections: DashMap::new(),
            plans: DashMap::new(),
            conferences: ConferenceCoordinator::new(),
            hold_tracker: HoldTracker::new(),
            roles: Mutex::new(EmergencyRoles::default()),
            retry: Mutex::new(None),
            domain_session: DomainSelectionSession::new(),
            events,
            listener: Arc::new(OrchestratorListener::new(weak.clone())),
        });
        info!("Call orchestrator created");
        Ok(Self { inner })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Subscribe to orchestrator lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.inner.events.subscribe()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.inner.connection(id)
    }

    /// Live connections, oldest first
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.inner.sorted_connections()
    }

    pub fn conferences(&self) -> Vec<Arc<Conference>> {
        self.inner.conferences.conferences()
    }

    pub fn conference(&self, id: ConferenceId) -> Option<Arc<Conference>> {
        self.inner.conferences.conference(id)
    }

    pub fn hold_tracker(&self) -> &HoldTracker {
        &self.inner.hold_tracker
    }

    pub fn emergency_roles(&self) -> EmergencyRoles {
        self.inner.roles.lock().clone()
    }

    /// Hang up a connection, or its whole conference when it is a member
    pub async fn hangup(&self, id: ConnectionId) -> Result<()> {
        let connection = self.inner.require_connection(id)?;
        match self.inner.conferences.conference_of(id) {
            Some(conference) => conference.disconnect().await,
            None => connection.hangup(DisconnectCause::Local).await,
        }
        Ok(())
    }

    pub async fn hold(&self, id: ConnectionId) -> Result<()> {
        let connection = self.inner.require_connection(id)?;
        match self.inner.conferences.conference_of(id) {
            Some(conference) => conference.hold().await,
            None => connection.hold().await,
        }
        Ok(())
    }

    pub async fn unhold(&self, id: ConnectionId) -> Result<()> {
        let connection = self.inner.require_connection(id)?;
        match self.inner.conferences.conference_of(id) {
            Some(conference) => conference.unhold().await,
            None => connection.unhold().await,
        }
        Ok(())
    }

    pub async fn hold_conference(&self, id: ConferenceId) -> Result<()> {
        self.inner.require_conference(id)?.hold().await;
        Ok(())
    }

    pub async fn unhold_conference(&self, id: ConferenceId) -> Result<()> {
        self.inner.require_conference(id)?.unhold().await;
        Ok(())
    }

    pub async fn disconnect_conference(&self, id: ConferenceId) -> Result<()> {
        self.inner.require_conference(id)?.disconnect().await;
        Ok(())
    }
}

impl OrchestratorInner {
    pub(crate) fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|c| c.value().clone())
    }

    pub(crate) fn require_connection(&self, id: ConnectionId) -> Result<Arc<Connection>> {
        self.connection(id)
            .ok_or(TelephonyError::ConnectionNotFound(id))
    }

    pub(crate) fn require_conference(&self, id: ConferenceId) -> Result<Arc<Conference>> {
        self.conferences
            .conference(id)
            .ok_or(TelephonyError::ConferenceNotFound(id))
    }

    /// Connections ordered by creation time
    pub(crate) fn sorted_connections(&self) -> Vec<Arc<Connection>> {
        let mut connections: Vec<Arc<Connection>> =
            self.connections.iter().map(|c| c.value().clone()).collect();
        connections.sort_by_key(|c| (c.created_at(), c.id()));
        connections
    }

    /// Start tracking a new connection
    pub(crate) fn register(&self, connection: &Arc<Connection>) {
        connection.add_listener(self.listener.clone());
        self.connections.insert(connection.id(), connection.clone());
        self.hold_tracker.add(Holdable::Connection(connection.clone()));
        debug!(connection = %connection.id(), total = self.connections.len(), "Connection registered");
        let _ = self.events.send(OrchestratorEvent::ConnectionAdded(connection.id()));
    }

    /// Forget a destroyed connection
    pub(crate) fn unregister(&self, connection: &Arc<Connection>) {
        let id = connection.id();
        if self.connections.remove(&id).is_none() {
            return;
        }
        self.plans.remove(&id);
        let released = self.roles.lock().release(id);
        if !released.is_empty() {
            debug!(connection = %id, roles = ?released, "Emergency roles released");
        }
        {
            let mut retry = self.retry.lock();
            if retry.as_ref().is_some_and(|cache| cache.is_for(connection)) {
                *retry = None;
            }
        }
        if let Some(selector) = &self.collab.domain_selector {
            self.domain_session.end(selector, id);
        }
        self.hold_tracker.remove(HoldableId::Connection(id));
        self.recalculate_conferences();
        info!(connection = %id, remaining = self.connections.len(), "Connection removed");
        let _ = self.events.send(OrchestratorEvent::ConnectionRemoved(id));
    }

    /// Re-run conference aggregation and publish the outcome
    pub(crate) fn recalculate_conferences(&self) {
        let connections = self.sorted_connections();
        for change in self.conferences.recalculate(&connections) {
            match change {
                ConferenceChange::Created(conference) => {
                    self.hold_tracker.add(Holdable::Conference(conference.clone()));
                    let _ = self.events.send(OrchestratorEvent::ConferenceCreated(conference.id()));
                }
                ConferenceChange::Removed(conference) => {
                    self.hold_tracker.remove(HoldableId::Conference(conference.id()));
                    let _ = self.events.send(OrchestratorEvent::ConferenceRemoved(conference.id()));
                }
                ConferenceChange::MembersChanged(_) => {}
            }
        }
        self.hold_tracker.update_hold_capability();
    }

    /// Live connections placed on a phone other than `phone`
    pub(crate) fn live_connections_not_on(
        &self,
        phone: crate::types::PhoneId,
        except: ConnectionId,
    ) -> Vec<Arc<Connection>> {
        self.sorted_connections()
            .into_iter()
            .filter(|c| c.id() != except && c.phone_id() != phone && c.state().is_live())
            .collect()
    }
}
