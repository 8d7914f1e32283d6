//! Bounded waits used by the origination pipeline
//!
//! Every wait races its completion against a timer and against the
//! connection being disconnected, so a misbehaving collaborator can delay a
//! call but never block it forever.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::debug;

use crate::connection::Connection;
use crate::phone::Phone;
use crate::types::CallState;

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The awaited condition holds
    Reached,
    TimedOut,
    /// The connection the wait belongs to was disconnected meanwhile
    Cancelled,
}

impl WaitOutcome {
    pub fn is_reached(&self) -> bool {
        matches!(self, WaitOutcome::Reached)
    }
}

/// Wait until `connection` reaches a state matching `predicate`
///
/// A disconnect that does not satisfy the predicate ends the wait as
/// [`WaitOutcome::Cancelled`].
pub async fn wait_for_state<F>(connection: &Connection, predicate: F, limit: Duration) -> WaitOutcome
where
    F: Fn(CallState) -> bool,
{
    let mut rx = connection.subscribe_state();
    let result = timeout(
        limit,
        rx.wait_for(|state| predicate(*state) || *state == CallState::Disconnected),
    )
    .await;
    match result {
        Ok(Ok(state)) if predicate(*state) => WaitOutcome::Reached,
        Ok(_) => WaitOutcome::Cancelled,
        Err(_) => WaitOutcome::TimedOut,
    }
}

/// Wait until `phone` can place the call, or `connection` is disconnected
pub async fn wait_for_service(
    phone: &Arc<dyn Phone>,
    connection: &Connection,
    is_emergency: bool,
    limit: Duration,
) -> WaitOutcome {
    let mut service = phone.subscribe_service_state();
    let mut state = connection.subscribe_state();

    let race = async {
        tokio::select! {
            ready = service.wait_for(|s| s.is_ok_to_call(is_emergency)) => {
                if ready.is_ok() { WaitOutcome::Reached } else { WaitOutcome::TimedOut }
            }
            _ = wait_disconnected(&mut state) => WaitOutcome::Cancelled,
        }
    };

    let outcome = timeout(limit, race).await.unwrap_or(WaitOutcome::TimedOut);
    debug!(phone = %phone.phone_id(), connection = %connection.id(), ?outcome, "Service wait finished");
    outcome
}

async fn wait_disconnected(rx: &mut watch::Receiver<CallState>) {
    let _ = rx.wait_for(|s| *s == CallState::Disconnected).await;
}
