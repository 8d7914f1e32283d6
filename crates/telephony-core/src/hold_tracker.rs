//! Hold arbitration
//!
//! Decides which connections and conferences may expose `HOLD`. Only live,
//! top-level entities count (a connection merged into a conference is
//! represented by the conference). `HOLD` is exposed only while at least two
//! such entities exist, so a lone call never offers it.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::conference::Conference;
use crate::connection::Connection;
use crate::types::{ConferenceId, ConnectionId};

/// Key of a tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HoldableId {
    Connection(ConnectionId),
    Conference(ConferenceId),
}

/// Something that can be held
#[derive(Debug, Clone)]
pub enum Holdable {
    Connection(Arc<Connection>),
    Conference(Arc<Conference>),
}

impl Holdable {
    pub fn id(&self) -> HoldableId {
        match self {
            Holdable::Connection(c) => HoldableId::Connection(c.id()),
            Holdable::Conference(c) => HoldableId::Conference(c.id()),
        }
    }

    fn is_live(&self) -> bool {
        match self {
            Holdable::Connection(c) => c.state().is_live(),
            Holdable::Conference(c) => c.is_live(),
        }
    }

    fn is_top_level(&self) -> bool {
        match self {
            Holdable::Connection(c) => c.conference_id().is_none(),
            Holdable::Conference(_) => true,
        }
    }

    fn set_holdable(&self, allowed: bool) {
        match self {
            Holdable::Connection(c) => c.set_holdable(allowed),
            Holdable::Conference(c) => c.set_holdable(allowed),
        }
    }
}

/// Registry of holdable entities
#[derive(Debug, Default)]
pub struct HoldTracker {
    entities: Mutex<Vec<Holdable>>,
}

impl HoldTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an entity and recompute
    pub fn add(&self, entity: Holdable) {
        {
            let mut entities = self.entities.lock();
            let id = entity.id();
            if entities.iter().any(|e| e.id() == id) {
                return;
            }
            entities.push(entity);
        }
        self.update_hold_capability();
    }

    /// Stop tracking an entity and recompute
    pub fn remove(&self, id: HoldableId) {
        let removed = {
            let mut entities = self.entities.lock();
            let before = entities.len();
            entities.retain(|e| e.id() != id);
            entities.len() != before
        };
        if removed {
            self.update_hold_capability();
        }
    }

    pub fn len(&self) -> usize {
        self.entities.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.lock().is_empty()
    }

    pub fn contains(&self, id: HoldableId) -> bool {
        self.entities.lock().iter().any(|e| e.id() == id)
    }

    /// Number of live top-level entities
    pub fn top_level_count(&self) -> usize {
        let entities = self.entities.lock().clone();
        entities.iter().filter(|e| e.is_live() && e.is_top_level()).count()
    }

    /// Recompute and push the verdict to every tracked entity
    pub fn update_hold_capability(&self) {
        let entities = self.entities.lock().clone();
        let eligible: Vec<bool> = entities
            .iter()
            .map(|e| e.is_live() && e.is_top_level())
            .collect();
        let count = eligible.iter().filter(|e| **e).count();
        debug!(entities = entities.len(), top_level = count, "Recomputing hold capability");
        for (entity, eligible) in entities.iter().zip(eligible) {
            entity.set_holdable(eligible && count >= 2);
        }
    }
}
