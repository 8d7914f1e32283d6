//! Conference aggregation
//!
//! A [`Conference`] groups the connections of one multiparty call. Membership
//! is owned by the per-technology [`ConferenceAggregator`]s, which recompute
//! it from the full connection list every time something relevant changes.
//! The [`ConferenceCoordinator`] runs the IMS, CDMA and GSM aggregators
//! together so that a connection is a member of at most one conference.

pub mod aggregator;

pub use aggregator::{ConferenceAggregator, ConferenceChange};

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::capabilities::Capabilities;
use crate::connection::Connection;
use crate::disconnect::DisconnectCause;
use crate::types::{CallState, ConferenceId, ConnectionId, Technology, VideoState};

#[derive(Debug, Default)]
struct ConferenceInner {
    members: Vec<Arc<Connection>>,
    hold_allowed: bool,
    removed: bool,
}

/// Aggregate of one or more connections
#[derive(Debug)]
pub struct Conference {
    id: ConferenceId,
    technology: Technology,
    inner: Mutex<ConferenceInner>,
}

impl Conference {
    pub(crate) fn new(technology: Technology, members: Vec<Arc<Connection>>) -> Arc<Self> {
        Arc::new(Self {
            id: ConferenceId::new(),
            technology,
            inner: Mutex::new(ConferenceInner {
                members,
                ..Default::default()
            }),
        })
    }

    pub fn id(&self) -> ConferenceId {
        self.id
    }

    pub fn technology(&self) -> Technology {
        self.technology
    }

    pub fn members(&self) -> Vec<Arc<Connection>> {
        self.inner.lock().members.clone()
    }

    pub fn member_ids(&self) -> Vec<ConnectionId> {
        self.inner.lock().members.iter().map(|c| c.id()).collect()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.inner.lock().members.iter().any(|c| c.id() == id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().members.is_empty()
    }

    /// The member whose address and media the conference mirrors
    pub fn host(&self) -> Option<Arc<Connection>> {
        self.inner.lock().members.first().cloned()
    }

    pub(crate) fn set_members(&self, members: Vec<Arc<Connection>>) {
        self.inner.lock().members = members;
    }

    pub(crate) fn mark_removed(&self) {
        let mut inner = self.inner.lock();
        inner.removed = true;
        inner.members.clear();
    }

    pub fn is_live(&self) -> bool {
        let inner = self.inner.lock();
        !inner.removed && inner.members.iter().any(|c| c.state().is_live())
    }

    /// Active if any member is active, otherwise holding if any member holds
    pub fn state(&self) -> CallState {
        let states: Vec<CallState> = self.inner.lock().members.iter().map(|c| c.state()).collect();
        if states.contains(&CallState::Active) {
            CallState::Active
        } else if states.contains(&CallState::Holding) {
            CallState::Holding
        } else {
            CallState::Disconnected
        }
    }

    pub fn address(&self) -> Option<String> {
        self.host().and_then(|h| h.address())
    }

    pub fn video_state(&self) -> VideoState {
        self.host().map(|h| h.video_state()).unwrap_or_default()
    }

    /// Host capabilities without the per-leg conference bits
    pub fn capabilities(&self) -> Capabilities {
        let Some(host) = self.host() else {
            return Capabilities::empty();
        };
        let mut caps = host.capabilities()
            - (Capabilities::HOLD
                | Capabilities::SEPARATE_FROM_CONFERENCE
                | Capabilities::DISCONNECT_FROM_CONFERENCE
                | Capabilities::MERGE_CONFERENCE);
        if self.technology == Technology::Ims || self.len() > 1 {
            caps |= Capabilities::MANAGE_CONFERENCE;
        }
        if self.inner.lock().hold_allowed && caps.contains(Capabilities::SUPPORT_HOLD) {
            caps |= Capabilities::HOLD;
        }
        caps
    }

    /// Verdict of the hold tracker
    pub fn set_holdable(&self, allowed: bool) {
        self.inner.lock().hold_allowed = allowed;
    }

    pub fn is_holdable(&self) -> bool {
        self.inner.lock().hold_allowed
    }

    pub async fn hold(&self) {
        debug!(conference = %self.id, "Holding conference");
        for member in self.members() {
            member.hold().await;
        }
    }

    pub async fn unhold(&self) {
        debug!(conference = %self.id, "Resuming conference");
        for member in self.members() {
            member.unhold().await;
        }
    }

    pub async fn disconnect(&self) {
        debug!(conference = %self.id, "Disconnecting conference");
        for member in self.members() {
            member.hangup(DisconnectCause::Local).await;
        }
    }
}

/// Runs the per-technology aggregators together
#[derive(Debug)]
pub struct ConferenceCoordinator {
    aggregators: [ConferenceAggregator; 3],
}

impl Default for ConferenceCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConferenceCoordinator {
    pub fn new() -> Self {
        Self {
            aggregators: [
                ConferenceAggregator::new(Technology::Ims),
                ConferenceAggregator::new(Technology::Cdma),
                ConferenceAggregator::new(Technology::Gsm),
            ],
        }
    }

    /// Recompute every aggregator against the full connection list
    pub fn recalculate(&self, connections: &[Arc<Connection>]) -> Vec<ConferenceChange> {
        self.aggregators
            .iter()
            .filter_map(|aggregator| aggregator.recalculate(connections))
            .collect()
    }

    pub fn conferences(&self) -> Vec<Arc<Conference>> {
        self.aggregators.iter().filter_map(|a| a.conference()).collect()
    }

    pub fn conference(&self, id: ConferenceId) -> Option<Arc<Conference>> {
        self.conferences().into_iter().find(|c| c.id() == id)
    }

    /// Conference `connection` currently belongs to
    pub fn conference_of(&self, connection: ConnectionId) -> Option<Arc<Conference>> {
        self.conferences().into_iter().find(|c| c.contains(connection))
    }
}
