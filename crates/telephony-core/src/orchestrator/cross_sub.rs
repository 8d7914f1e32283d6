//! Arbitration between calls on different subscriptions
//!
//! On devices that carry one subscription at a time, calls on the other
//! subscriptions are hung up before a new call goes out or an incoming call
//! is answered. On devices with concurrent subscriptions the other
//! subscription's active call is held instead, and hung up when the hold is
//! not confirmed in time.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::CarrierConfig;
use crate::connection::Connection;
use crate::disconnect::DisconnectCause;
use crate::types::{CallState, ConnectionId, PhoneId};
use crate::wait::{wait_for_state, WaitOutcome};

use super::OrchestratorInner;

impl OrchestratorInner {
    pub(crate) fn supports_concurrent_subscriptions(&self) -> bool {
        self.collab.phones.max_active_subscriptions() > 1
    }

    /// Make room for an outgoing call on `phone`
    pub(crate) async fn prepare_other_subscriptions(
        &self,
        connection: &Arc<Connection>,
        phone: PhoneId,
        is_emergency: bool,
        carrier: &CarrierConfig,
    ) {
        let others = self.live_connections_not_on(phone, connection.id());
        if others.is_empty() {
            return;
        }

        if !self.supports_concurrent_subscriptions() {
            self.hang_up_all(&others).await;
        } else if is_emergency && !carrier.allow_hold_call_during_emergency {
            self.hold_or_hang_up(&others).await;
        } else {
            debug!(connection = %connection.id(), others = others.len(), "Calls on other subscriptions left untouched");
        }
    }

    /// Make room before answering `connection`
    pub(crate) async fn prepare_for_answer(&self, connection: &Arc<Connection>) {
        let others = self.live_connections_not_on(connection.phone_id(), connection.id());
        if others.is_empty() {
            return;
        }
        if self.supports_concurrent_subscriptions() {
            self.hold_or_hang_up(&others).await;
        } else {
            self.hang_up_all(&others).await;
        }
    }

    async fn hang_up_all(&self, others: &[Arc<Connection>]) {
        for other in others {
            info!(connection = %other.id(), phone = %other.phone_id(), "Hanging up call on other subscription");
            other.hangup(DisconnectCause::Local).await;
        }
    }

    /// Hold the active entity among `others`; hang it up if the hold never lands
    async fn hold_or_hang_up(&self, others: &[Arc<Connection>]) {
        let active: Vec<&Arc<Connection>> = others
            .iter()
            .filter(|c| c.state() == CallState::Active)
            .collect();
        let mut held_conferences: Vec<ConnectionId> = Vec::new();

        for other in &active {
            if held_conferences.contains(&other.id()) {
                continue;
            }
            match self.conferences.conference_of(other.id()) {
                Some(conference) => {
                    info!(conference = %conference.id(), "Holding conference on other subscription");
                    held_conferences.extend(conference.member_ids());
                    conference.hold().await;
                }
                None => {
                    info!(connection = %other.id(), "Holding call on other subscription");
                    other.hold().await;
                }
            }
        }

        for other in active {
            let outcome = wait_for_state(
                other,
                |s| s == CallState::Holding,
                self.config.hold_confirmation_timeout(),
            )
            .await;
            match outcome {
                WaitOutcome::Reached => debug!(connection = %other.id(), "Hold confirmed"),
                WaitOutcome::Cancelled => debug!(connection = %other.id(), "Call ended while holding"),
                WaitOutcome::TimedOut => {
                    warn!(connection = %other.id(), "Hold not confirmed, hanging up");
                    other.hangup(DisconnectCause::Local).await;
                }
            }
        }
    }
}
