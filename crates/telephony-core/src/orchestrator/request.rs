//! Outgoing call requests

use std::collections::BTreeMap;

use crate::emergency::EmergencyRouting;
use crate::radio::DialArgs;
use crate::types::{Domain, PhoneId, SubscriptionId, VideoState};

/// Request to place an outgoing call
#[derive(Debug, Clone, Default)]
pub struct OutgoingCallRequest {
    /// `tel:`, `sip:` or `voicemail:` address, or a bare number
    pub address: String,
    pub phone: Option<PhoneId>,
    pub subscription: Option<SubscriptionId>,
    pub video_state: VideoState,
    pub rtt: bool,
    /// Non-empty for an adhoc conference call
    pub conference_participants: Vec<String>,
    pub extras: BTreeMap<String, String>,
}

impl OutgoingCallRequest {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn with_phone(mut self, phone: PhoneId) -> Self {
        self.phone = Some(phone);
        self
    }

    pub fn with_subscription(mut self, subscription: SubscriptionId) -> Self {
        self.subscription = Some(subscription);
        self
    }

    pub fn with_video_state(mut self, video_state: VideoState) -> Self {
        self.video_state = video_state;
        self
    }

    pub fn with_rtt(mut self, rtt: bool) -> Self {
        self.rtt = rtt;
        self
    }

    pub fn with_conference_participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conference_participants = participants.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn is_adhoc_conference(&self) -> bool {
        !self.conference_participants.is_empty()
    }
}

/// What gets dialed for a connection, kept for redials
#[derive(Debug, Clone)]
pub(crate) struct DialPlan {
    pub dial_string: String,
    pub video_state: VideoState,
    pub is_emergency: bool,
    pub is_test_emergency: bool,
    pub routing: Option<EmergencyRouting>,
    pub participants: Vec<String>,
}

impl DialPlan {
    pub fn dial_args(
        &self,
        connection: &crate::connection::Connection,
        domain: Option<Domain>,
    ) -> DialArgs {
        DialArgs {
            video_state: self.video_state,
            rtt: connection.rtt_stream(),
            extras: connection.extras(),
            is_emergency: self.is_emergency,
            is_test_emergency: self.is_test_emergency,
            emergency_routing: self.routing,
            domain,
            conference_participants: self.participants.clone(),
        }
    }
}
