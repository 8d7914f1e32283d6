//! Emergency redial across phones and domain reselection
//!
//! Both keep the connection's identity: the failed radio path is dropped and
//! a new one is bound to the same [`Connection`].

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::disconnect::{DisconnectCause, DisconnectInfo, RetryClass};
use crate::domain_selection::DomainSelectionError;
use crate::retry::RetryCache;
use crate::types::{Domain, PhoneId};

use super::outgoing::DialOutcome;
use super::{CallOrchestrator, OrchestratorInner};

/// Reselections accepted for one call before it is failed
const MAX_RESELECTIONS: usize = 3;

impl CallOrchestrator {
    /// Redial an emergency connection whose attempt on `failed_phone` failed
    ///
    /// Returns once the connection is bound to a new radio path or has been
    /// disconnected because every candidate phone failed.
    pub async fn retry_outgoing_original_connection(
        &self,
        connection: &Arc<Connection>,
        failed_phone: PhoneId,
        permanent: bool,
    ) {
        self.inner
            .retry_outgoing_original_connection(connection, failed_phone, permanent)
            .await
    }
}

impl OrchestratorInner {
    /// Record a failure and pick the next phone from the retry cache
    fn next_retry_phone(&self, connection: &Arc<Connection>, failed: PhoneId, permanent: bool) -> Option<PhoneId> {
        let mut guard = self.retry.lock();
        if !guard.as_ref().is_some_and(|cache| cache.is_for(connection)) {
            let phones = self.collab.phones.phones().iter().map(|p| p.phone_id()).collect::<Vec<_>>();
            debug!(connection = %connection.id(), ?phones, "Starting emergency redial sequence");
            *guard = Some(RetryCache::new(
                connection,
                phones,
                failed,
                self.config.emergency_retry_rounds,
            ));
        }
        let cache = guard.as_mut()?;
        cache.record_failure(failed, permanent);
        let next = cache.next_candidate();
        if next.is_none() {
            *guard = None;
        }
        next
    }

    pub(crate) async fn retry_outgoing_original_connection(
        &self,
        connection: &Arc<Connection>,
        failed_phone: PhoneId,
        permanent: bool,
    ) {
        let mut failed = failed_phone;
        let mut permanent = permanent;

        loop {
            if !connection.state().is_live() {
                debug!(connection = %connection.id(), "Connection ended, stopping redial");
                return;
            }

            let Some(next) = self.next_retry_phone(connection, failed, permanent) else {
                warn!(connection = %connection.id(), "Emergency redial exhausted every phone");
                connection.set_disconnected(
                    DisconnectInfo::new(DisconnectCause::ErrorUnspecified)
                        .with_reason("emergency call failed on every phone"),
                );
                return;
            };

            let Some(phone) = self.collab.phones.phone(next) else {
                failed = next;
                permanent = true;
                continue;
            };

            let subscription = phone.subscription_id();
            connection.reassign_phone(
                next,
                subscription,
                phone.technology(),
                self.collab.carrier_configs.config_for(subscription),
            );
            info!(connection = %connection.id(), phone = %next, "Redialing emergency call");

            match self.dial_and_bind(connection, &phone, None).await {
                DialOutcome::Bound | DialOutcome::Cancelled => return,
                DialOutcome::NoCall => {
                    connection.set_disconnected(DisconnectInfo::new(DisconnectCause::DialedMmi));
                    return;
                }
                DialOutcome::Failed(e) => match e.failure().retry_class() {
                    RetryClass::None => {
                        connection.set_disconnected(
                            DisconnectInfo::from_radio(e.failure(), e.code()).with_reason(e.to_string()),
                        );
                        return;
                    }
                    class => {
                        failed = next;
                        permanent = class == RetryClass::Permanent;
                    }
                },
            }
        }
    }

    /// Ask the domain selector for a new domain and redial into it
    pub(crate) async fn reselect_domain(&self, connection: &Arc<Connection>, cause: DisconnectCause, code: i32) {
        let mut cause = cause;
        let mut code = code;

        for attempt in 1..=MAX_RESELECTIONS {
            if !connection.state().is_live() {
                return;
            }
            let Some(selector) = self.collab.domain_selector.clone() else {
                connection.set_disconnected(DisconnectInfo::new(cause).with_code(code));
                return;
            };
            let Some(phone) = self.collab.phones.phone(connection.phone_id()) else {
                connection.set_disconnected(DisconnectInfo::new(DisconnectCause::OutOfService));
                return;
            };

            let attributes = self
                .selection_attributes(connection, &phone)
                .with_failure(cause, code);
            info!(connection = %connection.id(), ?cause, code, attempt, "Reselecting domain");

            let domain = match selector.reselect(attributes).await {
                Ok(domain) => domain,
                Err(DomainSelectionError::Unavailable) => Domain::Cs,
                Err(DomainSelectionError::Terminal(terminal)) => {
                    connection.set_disconnected(DisconnectInfo::new(terminal).with_code(code));
                    return;
                }
            };
            if !connection.state().is_live() {
                return;
            }

            match self.dial_and_bind(connection, &phone, Some(domain)).await {
                DialOutcome::Bound | DialOutcome::Cancelled => return,
                DialOutcome::NoCall => {
                    connection.set_disconnected(DisconnectInfo::new(DisconnectCause::DialedMmi));
                    return;
                }
                DialOutcome::Failed(e) if e.failure().requires_reselection() => {
                    cause = e.failure().into();
                    code = e.code();
                }
                DialOutcome::Failed(e) => {
                    connection.set_disconnected(
                        DisconnectInfo::from_radio(e.failure(), e.code()).with_reason(e.to_string()),
                    );
                    return;
                }
            }
        }

        warn!(connection = %connection.id(), "Giving up after repeated domain reselection");
        connection.set_disconnected(DisconnectInfo::new(cause).with_code(code));
    }
}
