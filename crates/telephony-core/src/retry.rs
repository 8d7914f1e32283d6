//! Emergency redial bookkeeping
//!
//! A [`RetryCache`] belongs to the one connection currently being redialed
//! across phones. The queue starts in slot order. A temporary failure moves
//! the failing phone to the back, a permanent one removes it. Within a round
//! each phone is tried at most once; the number of rounds is bounded.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::connection::Connection;
use crate::types::{ConnectionId, PhoneId};

#[derive(Debug)]
pub struct RetryCache {
    connection: Weak<Connection>,
    connection_id: ConnectionId,
    queue: VecDeque<PhoneId>,
    attempted: HashSet<PhoneId>,
    round: u32,
    max_rounds: u32,
}

impl RetryCache {
    /// Start a sequence for `connection` whose first attempt ran on `first_attempt`
    pub fn new(
        connection: &Arc<Connection>,
        phones: impl IntoIterator<Item = PhoneId>,
        first_attempt: PhoneId,
        max_rounds: u32,
    ) -> Self {
        Self {
            connection: Arc::downgrade(connection),
            connection_id: connection.id(),
            queue: phones.into_iter().collect(),
            attempted: HashSet::from([first_attempt]),
            round: 1,
            max_rounds: max_rounds.max(1),
        }
    }

    /// Whether this cache tracks `connection`
    pub fn is_for(&self, connection: &Arc<Connection>) -> bool {
        self.connection_id == connection.id() && self.connection.upgrade().is_some()
    }

    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.upgrade()
    }

    /// Record a failure on `phone`
    pub fn record_failure(&mut self, phone: PhoneId, permanent: bool) {
        self.attempted.insert(phone);
        self.queue.retain(|p| *p != phone);
        if !permanent {
            self.queue.push_back(phone);
        }
        debug!(phone = %phone, permanent, queue = ?self.queue, "Recorded emergency dial failure");
    }

    /// Next phone to try, `None` once every round is spent
    pub fn next_candidate(&mut self) -> Option<PhoneId> {
        if let Some(phone) = self.untried() {
            self.attempted.insert(phone);
            return Some(phone);
        }
        if self.round < self.max_rounds && !self.queue.is_empty() {
            self.round += 1;
            self.attempted.clear();
            debug!(round = self.round, "Starting new emergency redial round");
            let phone = self.untried()?;
            self.attempted.insert(phone);
            return Some(phone);
        }
        None
    }

    fn untried(&self) -> Option<PhoneId> {
        self.queue.iter().copied().find(|p| !self.attempted.contains(p))
    }

    pub fn queue(&self) -> Vec<PhoneId> {
        self.queue.iter().copied().collect()
    }

    pub fn round(&self) -> u32 {
        self.round
    }
}
