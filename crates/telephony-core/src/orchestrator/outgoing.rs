//! Outgoing call placement
//!
//! [`CallOrchestrator::place_outgoing_call`] runs the origination pipeline as
//! one sequential async flow:
//!
//! 1. normalize and classify the address
//! 2. reject video while TTY is on
//! 3. pick a phone
//! 4. run the per-phone policy checks
//! 5. leave satellite mode when needed
//! 6. create and register the connection
//! 7. power the radio on and wait for service
//! 8. emergency preparation (ringing calls, default data switch)
//! 9. domain selection, or
//! 10. cross-subscription arbitration
//! 11. dial and bind
//!
//! After every wait the connection is re-checked; if it was disconnected in
//! the meantime the pipeline stops without dialing.

use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::address::{is_call_forwarding_code, Address};
use crate::connection::{behavior_for, Connection, ConnectionParams};
use crate::disconnect::{DisconnectCause, DisconnectInfo, RetryClass};
use crate::domain_selection::{DomainSelectionAttributes, DomainSelectionError};
use crate::emergency::{EmergencyRole, EmergencyRouting};
use crate::phone::Phone;
use crate::radio::{RadioError, RttStream};
use crate::selector::{select_for_emergency, select_for_normal_call, SelectionDefaults, SlotStatus};
use crate::types::{CallDirection, CallState, Domain};
use crate::wait::{wait_for_service, wait_for_state, WaitOutcome};

use super::request::{DialPlan, OutgoingCallRequest};
use super::{CallOrchestrator, OrchestratorInner};

/// Result of one dial attempt
#[derive(Debug)]
pub(crate) enum DialOutcome {
    /// The radio path is bound to the connection
    Bound,
    /// The request was consumed without a call (MMI)
    NoCall,
    /// The connection was disconnected while dialing
    Cancelled,
    Failed(RadioError),
}

/// Classified dial string of a request
struct Classified {
    dial_string: String,
    address: Address,
    is_emergency: bool,
    is_test_emergency: bool,
}

impl CallOrchestrator {
    /// Place an outgoing call
    ///
    /// Returns the connection once its radio path is bound. Every failure,
    /// whether a policy rejection before the connection exists or a dial
    /// failure after, comes back as a [`DisconnectInfo`].
    pub async fn place_outgoing_call(
        &self,
        request: OutgoingCallRequest,
    ) -> Result<Arc<Connection>, DisconnectInfo> {
        self.inner.place_outgoing_call(request).await
    }
}

fn reject(cause: DisconnectCause) -> Result<Arc<Connection>, DisconnectInfo> {
    info!(?cause, "Outgoing call rejected");
    Err(DisconnectInfo::new(cause))
}

/// Disconnect info to report for a connection that stopped early
pub(crate) fn cancelled_info(connection: &Connection) -> DisconnectInfo {
    connection
        .disconnect_info()
        .unwrap_or_else(|| DisconnectInfo::new(DisconnectCause::Canceled))
}

/// Disconnect `connection` with `info` and report the final cause
pub(crate) fn fail(connection: &Arc<Connection>, info: DisconnectInfo) -> Result<Arc<Connection>, DisconnectInfo> {
    warn!(connection = %connection.id(), cause = ?info.cause, "Outgoing call failed");
    connection.set_disconnected(info.clone());
    Err(connection.disconnect_info().unwrap_or(info))
}

impl OrchestratorInner {
    pub(crate) async fn place_outgoing_call(
        &self,
        request: OutgoingCallRequest,
    ) -> Result<Arc<Connection>, DisconnectInfo> {
        // 1. address
        let classified = match self.classify(&request) {
            Ok(c) => c,
            Err(cause) => return reject(cause),
        };
        let is_emergency = classified.is_emergency;
        debug!(number = %classified.dial_string, is_emergency, "Placing outgoing call");

        // 2. TTY
        if request.video_state.is_video() && !is_emergency && self.collab.device.is_tty_enabled() {
            return reject(DisconnectCause::VideoCallNotAllowedWhileTtyEnabled);
        }

        // 3. phone
        let Some(phone) = self.select_phone(&request, &classified) else {
            return reject(DisconnectCause::OutOfService);
        };
        let phone_id = phone.phone_id();
        let carrier = self.collab.carrier_configs.config_for(phone.subscription_id());
        let routing = is_emergency.then(|| {
            self.collab
                .emergency_numbers
                .routing_for(&classified.dial_string, phone_id)
        });
        info!(phone = %phone_id, ?routing, "Phone selected");

        // 4. policy
        if let Err(cause) = self.check_policies(&phone, &classified, &carrier) {
            return reject(cause);
        }

        // 5. satellite
        if self.collab.satellite.is_satellite_active() {
            if !is_emergency {
                return reject(DisconnectCause::SatelliteEnabled);
            }
            if !self.collab.satellite.should_exit_for_emergency()
                || !self.collab.satellite.exit_satellite_mode().await
            {
                return reject(DisconnectCause::EmergencyCallBlockedBySatellite);
            }
            info!("Left satellite mode for emergency call");
        }

        // 6. connection
        let params = ConnectionParams::outgoing(phone_id, phone.technology(), classified.address.clone())
            .with_subscription(phone.subscription_id())
            .with_video_state(request.video_state)
            .with_emergency(is_emergency, classified.is_test_emergency)
            .with_adhoc_conference(request.is_adhoc_conference())
            .with_carrier(carrier.clone())
            .with_extras(request.extras.clone());
        let connection = Connection::new(params);
        connection.set_emergency_redial_enabled(is_emergency && self.config.emergency_redial_enabled);
        self.plans.insert(
            connection.id(),
            DialPlan {
                dial_string: classified.dial_string.clone(),
                video_state: request.video_state,
                is_emergency,
                is_test_emergency: classified.is_test_emergency,
                routing,
                participants: request.conference_participants.clone(),
            },
        );
        self.register(&connection);
        if is_emergency {
            self.assign_emergency_role(&connection, routing);
        }
        if request.rtt {
            connection.set_rtt_stream(Some(RttStream {
                stream_id: format!("rtt-{}", connection.id()),
            }));
        }

        // 7. radio power
        let service = phone.service_state();
        let airplane = self.collab.device.is_airplane_mode_on();
        if airplane || service.is_radio_off() {
            info!(connection = %connection.id(), phone = %phone_id, airplane, "Powering radio on");
            if airplane {
                self.collab.device.disable_airplane_mode().await;
            }
            phone.set_radio_power(true, is_emergency).await;
            match wait_for_service(&phone, &connection, is_emergency, self.config.radio_power_on_timeout()).await {
                WaitOutcome::Reached => {}
                WaitOutcome::Cancelled => return Err(cancelled_info(&connection)),
                WaitOutcome::TimedOut => {
                    let cause = if is_emergency {
                        DisconnectCause::OutOfService
                    } else {
                        DisconnectCause::PowerOff
                    };
                    return fail(&connection, DisconnectInfo::new(cause).with_reason("radio did not come up in time"));
                }
            }
        } else if !is_emergency && !service.is_ok_to_call(false) {
            return fail(&connection, DisconnectInfo::new(DisconnectCause::OutOfService));
        }
        if !connection.state().is_live() {
            return Err(cancelled_info(&connection));
        }

        // 8. emergency preparation
        if is_emergency {
            self.prepare_for_emergency(&connection, &phone, &carrier).await;
            if !connection.state().is_live() {
                return Err(cancelled_info(&connection));
            }
        }

        // 9. / 10.
        let domain_selection = is_emergency
            && self.config.domain_selection_enabled
            && self.collab.domain_selector.is_some();
        let domain = if domain_selection {
            match self.select_domain(&connection, &phone).await {
                Ok(domain) => domain,
                Err(cause) => return fail(&connection, DisconnectInfo::new(cause)),
            }
        } else {
            self.prepare_other_subscriptions(&connection, phone_id, is_emergency, &carrier)
                .await;
            None
        };
        if !connection.state().is_live() {
            return Err(cancelled_info(&connection));
        }

        // 11. dial
        let outcome = self.dial_and_bind(&connection, &phone, domain).await;
        self.settle(&connection, phone_id, outcome).await
    }

    fn classify(&self, request: &OutgoingCallRequest) -> Result<Classified, DisconnectCause> {
        let mut address = Address::parse(&request.address);
        if address.is_voicemail() {
            let phone = select_for_normal_call(self.collab.phones.as_ref(), request.phone, request.subscription)
                .ok_or(DisconnectCause::OutOfService)?;
            let number = phone
                .voicemail_number()
                .filter(|n| !n.is_empty())
                .ok_or(DisconnectCause::VoicemailNumberMissing)?;
            debug!(phone = %phone.phone_id(), "Redirecting voicemail address");
            address = Address::tel(number);
        }

        let dial_string = address.dial_string();
        if dial_string.is_empty() {
            return Err(DisconnectCause::InvalidNumber);
        }
        let numbers = &self.collab.emergency_numbers;
        Ok(Classified {
            is_emergency: numbers.is_emergency_number(&dial_string)
                || numbers.is_test_emergency_number(&dial_string),
            is_test_emergency: numbers.is_test_emergency_number(&dial_string),
            dial_string,
            address,
        })
    }

    fn select_phone(&self, request: &OutgoingCallRequest, classified: &Classified) -> Option<Arc<dyn Phone>> {
        let registry = self.collab.phones.as_ref();
        if !classified.is_emergency {
            return select_for_normal_call(registry, request.phone, request.subscription);
        }

        let phones = registry.phones();
        if let Some(phone) = phones.iter().find(|p| p.is_in_emergency_callback_mode()) {
            debug!(phone = %phone.phone_id(), "Emergency callback mode phone preferred");
            return Some(phone.clone());
        }
        let normal_routed = phones.iter().find(|p| {
            p.service_state().is_in_service()
                && self
                    .collab
                    .emergency_numbers
                    .routing_for(&classified.dial_string, p.phone_id())
                    == EmergencyRouting::Normal
        });
        if let Some(phone) = normal_routed {
            debug!(phone = %phone.phone_id(), "Normal routing phone preferred");
            return Some(phone.clone());
        }

        let slots: Vec<SlotStatus> = phones
            .iter()
            .map(|p| SlotStatus::from_phone(p.as_ref(), &classified.dial_string))
            .collect();
        let chosen = select_for_emergency(&slots, SelectionDefaults::from_registry(registry));
        registry.phone(chosen)
    }

    fn check_policies(
        &self,
        phone: &Arc<dyn Phone>,
        classified: &Classified,
        carrier: &crate::config::CarrierConfig,
    ) -> Result<(), DisconnectCause> {
        if classified.is_emergency {
            return Ok(());
        }
        let dial = &classified.dial_string;

        let behavior = behavior_for(phone.technology());
        if behavior.is_mmi_code(dial) && !behavior.allows_mmi_during_call() {
            let in_call = self
                .sorted_connections()
                .iter()
                .any(|c| c.phone_id() == phone.phone_id() && c.state().is_live());
            if in_call {
                return Err(DisconnectCause::DialedMmi);
            }
        }

        if phone.service_state().roaming
            && is_call_forwarding_code(dial, &carrier.call_forwarding_blocked_prefixes_while_roaming)
        {
            return Err(DisconnectCause::CallForwardingBlockedWhileRoaming);
        }

        if !carrier.allow_add_call_during_emergency {
            let emergency_live = self
                .sorted_connections()
                .iter()
                .any(|c| c.is_emergency() && c.state().is_live());
            if emergency_live {
                return Err(DisconnectCause::AddCallRestricted);
            }
        }
        Ok(())
    }

    fn assign_emergency_role(&self, connection: &Arc<Connection>, routing: Option<EmergencyRouting>) {
        let mut roles = self.roles.lock();
        let role = if routing == Some(EmergencyRouting::Normal) {
            EmergencyRole::NormalRouting
        } else {
            let current_live = roles
                .holder(EmergencyRole::Emergency)
                .and_then(|id| self.connections.get(&id).map(|c| c.state().is_live()))
                .unwrap_or(false);
            if current_live {
                EmergencyRole::Alternate
            } else {
                EmergencyRole::Emergency
            }
        };
        roles.assign(role, connection.id());
        debug!(connection = %connection.id(), ?role, "Emergency role assigned");
    }

    /// Reject ringing calls and switch default data to the emergency phone
    async fn prepare_for_emergency(
        &self,
        connection: &Arc<Connection>,
        phone: &Arc<dyn Phone>,
        carrier: &crate::config::CarrierConfig,
    ) {
        let ringing: Vec<Arc<Connection>> = self
            .sorted_connections()
            .into_iter()
            .filter(|c| {
                c.id() != connection.id()
                    && c.direction() == CallDirection::Incoming
                    && c.state() == CallState::Ringing
            })
            .collect();
        for call in &ringing {
            info!(connection = %call.id(), "Rejecting ringing call for emergency call");
            if let Err(e) = call.reject().await {
                warn!(connection = %call.id(), error = %e, "Could not reject ringing call");
            }
        }
        for call in &ringing {
            let outcome = wait_for_state(
                call,
                |s| s == CallState::Disconnected,
                self.config.incoming_reject_timeout(),
            )
            .await;
            if !outcome.is_reached() && outcome != WaitOutcome::Cancelled {
                warn!(connection = %call.id(), "Ringing call did not end in time");
            }
        }

        let registry = &self.collab.phones;
        if carrier.emergency_requires_dds_switch && registry.default_data_phone() != Some(phone.phone_id()) {
            info!(phone = %phone.phone_id(), "Switching default data for emergency call");
            match timeout(self.config.dds_switch_timeout(), registry.switch_default_data(phone.phone_id())).await {
                Ok(true) => debug!("Default data switched"),
                Ok(false) => warn!("Default data switch refused"),
                Err(_) => warn!("Default data switch timed out"),
            }
        }
    }

    /// Run domain selection for a fresh emergency connection
    ///
    /// `Ok(None)` means no selector is available and the call goes out over CS.
    async fn select_domain(
        &self,
        connection: &Arc<Connection>,
        phone: &Arc<dyn Phone>,
    ) -> Result<Option<Domain>, DisconnectCause> {
        let Some(selector) = self.collab.domain_selector.clone() else {
            return Ok(None);
        };
        self.domain_session.begin(&selector, connection.id());
        connection.set_domain_selection_active(true);

        let attributes = self.selection_attributes(connection, phone);
        match selector.select(attributes).await {
            Ok(domain) => {
                info!(connection = %connection.id(), ?domain, "Domain selected");
                Ok(Some(domain))
            }
            Err(DomainSelectionError::Unavailable) => {
                info!(connection = %connection.id(), "Domain selection unavailable, dialing over CS");
                connection.set_domain_selection_active(false);
                self.domain_session.end(&selector, connection.id());
                Ok(None)
            }
            Err(DomainSelectionError::Terminal(cause)) => Err(cause),
        }
    }

    pub(crate) fn selection_attributes(
        &self,
        connection: &Arc<Connection>,
        phone: &Arc<dyn Phone>,
    ) -> DomainSelectionAttributes {
        let plan = self.plans.get(&connection.id()).map(|p| p.value().clone());
        let address = plan
            .as_ref()
            .map(|p| p.dial_string.clone())
            .unwrap_or_else(|| connection.dialed_address().dial_string());
        DomainSelectionAttributes::new(phone.phone_id(), phone.subscription_id(), address)
            .emergency(connection.is_emergency())
            .video(connection.video_state().is_video())
    }

    /// One dial attempt on `phone`
    pub(crate) async fn dial_and_bind(
        &self,
        connection: &Arc<Connection>,
        phone: &Arc<dyn Phone>,
        domain: Option<Domain>,
    ) -> DialOutcome {
        let Some(plan) = self.plans.get(&connection.id()).map(|p| p.value().clone()) else {
            return DialOutcome::Cancelled;
        };
        let args = plan.dial_args(connection, domain);
        info!(connection = %connection.id(), phone = %phone.phone_id(), ?domain, "Dialing");

        match phone.dial(&plan.dial_string, args).await {
            Ok(Some(radio)) => {
                if !connection.state().is_live() {
                    debug!(connection = %connection.id(), "Connection ended while dialing, dropping radio path");
                    if let Err(e) = radio.hangup().await {
                        debug!(error = %e, "Hangup of orphaned radio path failed");
                    }
                    return DialOutcome::Cancelled;
                }
                connection.bind_radio_path(radio);
                DialOutcome::Bound
            }
            Ok(None) => DialOutcome::NoCall,
            Err(e) => {
                warn!(connection = %connection.id(), phone = %phone.phone_id(), error = %e, "Dial failed");
                DialOutcome::Failed(e)
            }
        }
    }

    /// Turn a dial outcome into the result of the request
    ///
    /// Emergency failures go through the redial sequence and reselection
    /// failures through the domain selector before giving up.
    pub(crate) async fn settle(
        &self,
        connection: &Arc<Connection>,
        phone: crate::types::PhoneId,
        outcome: DialOutcome,
    ) -> Result<Arc<Connection>, DisconnectInfo> {
        match outcome {
            DialOutcome::Bound => Ok(connection.clone()),
            DialOutcome::NoCall => fail(connection, DisconnectInfo::new(DisconnectCause::DialedMmi)),
            DialOutcome::Cancelled => Err(cancelled_info(connection)),
            DialOutcome::Failed(e) => {
                let failure = e.failure();
                let retry = failure.retry_class();
                if connection.is_emergency()
                    && self.config.emergency_redial_enabled
                    && retry != RetryClass::None
                {
                    self.retry_outgoing_original_connection(connection, phone, retry == RetryClass::Permanent)
                        .await;
                } else if connection.is_domain_selection_active() && failure.requires_reselection() {
                    self.reselect_domain(connection, failure.into(), e.code()).await;
                } else {
                    return fail(
                        connection,
                        DisconnectInfo::from_radio(failure, e.code()).with_reason(e.to_string()),
                    );
                }
                if connection.state().is_live() {
                    Ok(connection.clone())
                } else {
                    Err(cancelled_info(connection))
                }
            }
        }
    }
}
