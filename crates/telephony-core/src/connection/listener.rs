//! Connection events and listener fan-out

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::capabilities::{Capabilities, Properties};
use crate::disconnect::{DisconnectCause, DisconnectInfo};
use crate::types::{CallState, ConferenceId, PhoneId, Presentation, VideoState};

use super::Connection;

/// Notification published by a [`Connection`]
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged {
        old: CallState,
        new: CallState,
    },
    CapabilitiesChanged(Capabilities),
    PropertiesChanged(Properties),
    AddressChanged {
        number: Option<String>,
        presentation: Presentation,
    },
    CallerNameChanged {
        name: Option<String>,
        presentation: Presentation,
    },
    VideoStateChanged(VideoState),
    ExtrasChanged(BTreeMap<String, String>),
    /// Joined (`Some`) or left (`None`) a conference
    ConferenceChanged(Option<ConferenceId>),
    /// An emergency dial failed on `phone` and should be retried on another phone
    RedialRequested {
        phone: PhoneId,
        permanent: bool,
    },
    /// The network asked for the call to be placed in another domain
    DomainReselectionRequested {
        cause: DisconnectCause,
        code: i32,
    },
    Disconnected(DisconnectInfo),
    /// Final event; the connection publishes nothing after this
    Destroyed,
}

/// Observer of a connection
///
/// Called synchronously on the thread that changed the connection, with no
/// connection lock held. Implementations may call back into the connection.
pub trait ConnectionListener: Send + Sync {
    fn on_connection_event(&self, connection: &Arc<Connection>, event: &ConnectionEvent);
}

/// Ordered, deduplicated set of listeners
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<Arc<dyn ConnectionListener>>>,
}

fn same_listener(a: &Arc<dyn ConnectionListener>, b: &Arc<dyn ConnectionListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener; returns false if it was already registered
    pub fn add(&self, listener: Arc<dyn ConnectionListener>) -> bool {
        let mut listeners = self.listeners.lock();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    pub fn remove(&self, listener: &Arc<dyn ConnectionListener>) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Deliver `event` to a copy of the current listener list
    pub fn notify(&self, connection: &Arc<Connection>, event: &ConnectionEvent) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener.on_connection_event(connection, event);
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
