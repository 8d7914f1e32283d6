//! Orchestrator side of connection events

use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tracing::{debug, error};

use crate::connection::{Connection, ConnectionEvent, ConnectionListener};
use crate::disconnect::{DisconnectCause, DisconnectInfo};
use crate::types::CallState;

use super::OrchestratorInner;

/// Listener the orchestrator attaches to every connection it owns
pub(crate) struct OrchestratorListener {
    inner: Weak<OrchestratorInner>,
}

impl OrchestratorListener {
    pub(crate) fn new(inner: Weak<OrchestratorInner>) -> Self {
        Self { inner }
    }
}

/// Run follow-up work off the notifying thread
fn spawn_follow_up<F>(connection: &Arc<Connection>, work: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(work);
        }
        Err(_) => {
            error!(connection = %connection.id(), "No async runtime for follow-up work, ending call");
            connection.set_disconnected(DisconnectInfo::new(DisconnectCause::ErrorUnspecified));
        }
    }
}

impl ConnectionListener for OrchestratorListener {
    fn on_connection_event(&self, connection: &Arc<Connection>, event: &ConnectionEvent) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        match event {
            ConnectionEvent::StateChanged { new, .. } => {
                if *new == CallState::Active {
                    let mut retry = inner.retry.lock();
                    if retry.as_ref().is_some_and(|cache| cache.is_for(connection)) {
                        debug!(connection = %connection.id(), "Emergency call connected, dropping retry cache");
                        *retry = None;
                    }
                }
                inner.recalculate_conferences();
            }
            ConnectionEvent::PropertiesChanged(_) => inner.recalculate_conferences(),
            ConnectionEvent::ConferenceChanged(_) => inner.hold_tracker.update_hold_capability(),
            ConnectionEvent::RedialRequested { phone, permanent } => {
                let (phone, permanent) = (*phone, *permanent);
                let conn = connection.clone();
                spawn_follow_up(connection, async move {
                    inner.retry_outgoing_original_connection(&conn, phone, permanent).await;
                });
            }
            ConnectionEvent::DomainReselectionRequested { cause, code } => {
                let (cause, code) = (*cause, *code);
                let conn = connection.clone();
                spawn_follow_up(connection, async move {
                    inner.reselect_domain(&conn, cause, code).await;
                });
            }
            ConnectionEvent::Disconnected(info) => {
                debug!(connection = %connection.id(), cause = ?info.cause, "Orchestrator saw disconnect");
            }
            ConnectionEvent::Destroyed => inner.unregister(connection),
            _ => {}
        }
    }
}
