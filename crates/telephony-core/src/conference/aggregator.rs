//! Per-technology conference aggregator

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::connection::{behavior_for, Connection};
use crate::types::{CallState, ConnectionId, Technology};

use super::Conference;

/// Outcome of a recalculation that changed something
#[derive(Debug, Clone)]
pub enum ConferenceChange {
    Created(Arc<Conference>),
    MembersChanged(Arc<Conference>),
    Removed(Arc<Conference>),
}

impl ConferenceChange {
    pub fn conference(&self) -> &Arc<Conference> {
        match self {
            ConferenceChange::Created(c)
            | ConferenceChange::MembersChanged(c)
            | ConferenceChange::Removed(c) => c,
        }
    }
}

/// Keeps at most one conference for one technology
#[derive(Debug)]
pub struct ConferenceAggregator {
    technology: Technology,
    threshold: usize,
    conference: Mutex<Option<Arc<Conference>>>,
}

fn is_mergeable(connection: &Connection, technology: Technology) -> bool {
    connection.technology() == technology
        && connection.is_multiparty()
        && matches!(connection.state(), CallState::Active | CallState::Holding)
}

fn ids(connections: &[Arc<Connection>]) -> Vec<ConnectionId> {
    connections.iter().map(|c| c.id()).collect()
}

impl ConferenceAggregator {
    pub fn new(technology: Technology) -> Self {
        Self {
            technology,
            threshold: behavior_for(technology).conference_threshold(),
            conference: Mutex::new(None),
        }
    }

    pub fn technology(&self) -> Technology {
        self.technology
    }

    pub fn conference(&self) -> Option<Arc<Conference>> {
        self.conference.lock().clone()
    }

    /// Bring the conference in line with `connections`
    ///
    /// Returns `None` when nothing changed, so repeated calls with the same
    /// input are no-ops.
    pub fn recalculate(&self, connections: &[Arc<Connection>]) -> Option<ConferenceChange> {
        let desired: Vec<Arc<Connection>> = connections
            .iter()
            .filter(|c| is_mergeable(c, self.technology))
            .cloned()
            .collect();

        // Plan under the lock, apply membership to connections after it
        let (change, joined, left) = {
            let mut slot = self.conference.lock();
            match slot.clone() {
                None if desired.len() >= self.threshold => {
                    let conference = Conference::new(self.technology, desired.clone());
                    *slot = Some(conference.clone());
                    (ConferenceChange::Created(conference), desired, Vec::new())
                }
                None => return None,
                Some(conference) if desired.len() < self.threshold => {
                    let left = conference.members();
                    conference.mark_removed();
                    *slot = None;
                    (ConferenceChange::Removed(conference), Vec::new(), left)
                }
                Some(conference) => {
                    let current = conference.members();
                    if ids(&current) == ids(&desired) {
                        return None;
                    }
                    let current_ids = ids(&current);
                    let desired_ids = ids(&desired);
                    let joined = desired
                        .iter()
                        .filter(|c| !current_ids.contains(&c.id()))
                        .cloned()
                        .collect();
                    let left = current
                        .into_iter()
                        .filter(|c| !desired_ids.contains(&c.id()))
                        .collect();
                    conference.set_members(desired);
                    (ConferenceChange::MembersChanged(conference), joined, left)
                }
            }
        };

        let conference_id = change.conference().id();
        for connection in &left {
            // another aggregator may have claimed it already
            if connection.conference_id() == Some(conference_id) {
                connection.set_conference(None);
            }
        }
        for connection in &joined {
            connection.set_conference(Some(conference_id));
        }

        match &change {
            ConferenceChange::Created(c) => {
                info!(conference = %c.id(), technology = %self.technology, members = c.len(), "Conference created")
            }
            ConferenceChange::MembersChanged(c) => {
                debug!(conference = %c.id(), members = c.len(), "Conference membership changed")
            }
            ConferenceChange::Removed(c) => info!(conference = %c.id(), "Conference removed"),
        }
        Some(change)
    }
}
