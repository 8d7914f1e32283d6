//! Structured disconnect causes
//!
//! Every way a call can end, whether the network ended it, the local user hung
//! up, a policy rejected the origination or retries were exhausted, is reported
//! as a [`DisconnectInfo`]. Radio-level failures arrive as [`RadioFailure`] and
//! are mapped one to one onto a [`DisconnectCause`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure reported by the radio/IMS layer for a dial attempt or a live call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RadioFailure {
    /// Remote party hung up
    Normal,
    /// Ended by a local request
    Local,
    Busy,
    OutOfService,
    PowerOff,
    AlreadyDialing,
    TooManyCalls,
    FdnBlocked,
    ProvisioningInProgress,
    InvalidNumber,
    IncomingRejected,
    /// Emergency call failed, another phone may succeed
    EmergencyTemporaryFailure,
    /// Emergency call can never succeed on this phone
    EmergencyPermanentFailure,
    /// The network asks for the call to be retried in another domain
    RetryRequired,
    Unspecified,
}

/// Retry classification of a radio failure for emergency calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    None,
    Temporary,
    Permanent,
}

impl RadioFailure {
    pub fn retry_class(&self) -> RetryClass {
        match self {
            RadioFailure::EmergencyTemporaryFailure => RetryClass::Temporary,
            RadioFailure::EmergencyPermanentFailure => RetryClass::Permanent,
            _ => RetryClass::None,
        }
    }

    /// Whether the failure asks for domain reselection rather than a SIM retry
    pub fn requires_reselection(&self) -> bool {
        matches!(self, RadioFailure::RetryRequired)
    }
}

/// Structured reason a connection ended or an origination was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisconnectCause {
    // Normal ends
    Local,
    Remote,
    Busy,
    Canceled,
    IncomingRejected,

    // Radio / network failures
    OutOfService,
    PowerOff,
    AlreadyDialing,
    TooManyCalls,
    FdnBlocked,
    ProvisioningInProgress,
    InvalidNumber,
    EmergencyTemporaryFailure,
    EmergencyPermanentFailure,
    RetryRequired,

    // Policy rejections
    EmergencyCallBlockedBySatellite,
    SatelliteEnabled,
    DialedMmi,
    VideoCallNotAllowedWhileTtyEnabled,
    CallForwardingBlockedWhileRoaming,
    VoicemailNumberMissing,

    // Resource exhaustion
    AddCallRestricted,
    ErrorUnspecified,
}

impl From<RadioFailure> for DisconnectCause {
    fn from(failure: RadioFailure) -> Self {
        match failure {
            RadioFailure::Normal => DisconnectCause::Remote,
            RadioFailure::Local => DisconnectCause::Local,
            RadioFailure::Busy => DisconnectCause::Busy,
            RadioFailure::OutOfService => DisconnectCause::OutOfService,
            RadioFailure::PowerOff => DisconnectCause::PowerOff,
            RadioFailure::AlreadyDialing => DisconnectCause::AlreadyDialing,
            RadioFailure::TooManyCalls => DisconnectCause::TooManyCalls,
            RadioFailure::FdnBlocked => DisconnectCause::FdnBlocked,
            RadioFailure::ProvisioningInProgress => DisconnectCause::ProvisioningInProgress,
            RadioFailure::InvalidNumber => DisconnectCause::InvalidNumber,
            RadioFailure::IncomingRejected => DisconnectCause::IncomingRejected,
            RadioFailure::EmergencyTemporaryFailure => DisconnectCause::EmergencyTemporaryFailure,
            RadioFailure::EmergencyPermanentFailure => DisconnectCause::EmergencyPermanentFailure,
            RadioFailure::RetryRequired => DisconnectCause::RetryRequired,
            RadioFailure::Unspecified => DisconnectCause::ErrorUnspecified,
        }
    }
}

impl DisconnectCause {
    /// Whether the call ended as part of ordinary call flow
    pub fn is_normal(&self) -> bool {
        matches!(
            self,
            DisconnectCause::Local
                | DisconnectCause::Remote
                | DisconnectCause::Busy
                | DisconnectCause::Canceled
                | DisconnectCause::IncomingRejected
        )
    }

    /// Short human readable description
    pub fn description(&self) -> &'static str {
        match self {
            DisconnectCause::Local => "call ended locally",
            DisconnectCause::Remote => "call ended by remote party",
            DisconnectCause::Busy => "remote party busy",
            DisconnectCause::Canceled => "call canceled",
            DisconnectCause::IncomingRejected => "incoming call rejected",
            DisconnectCause::OutOfService => "no cellular service",
            DisconnectCause::PowerOff => "radio is off",
            DisconnectCause::AlreadyDialing => "another call is already dialing",
            DisconnectCause::TooManyCalls => "too many calls",
            DisconnectCause::FdnBlocked => "number blocked by fixed dialing",
            DisconnectCause::ProvisioningInProgress => "provisioning in progress",
            DisconnectCause::InvalidNumber => "invalid number",
            DisconnectCause::EmergencyTemporaryFailure => "emergency call temporary failure",
            DisconnectCause::EmergencyPermanentFailure => "emergency call permanent failure",
            DisconnectCause::RetryRequired => "call must be retried in another domain",
            DisconnectCause::EmergencyCallBlockedBySatellite => {
                "emergency call not allowed in satellite mode"
            }
            DisconnectCause::SatelliteEnabled => "calls not allowed while satellite mode is on",
            DisconnectCause::DialedMmi => "MMI code dialed",
            DisconnectCause::VideoCallNotAllowedWhileTtyEnabled => {
                "video calls not allowed while TTY is enabled"
            }
            DisconnectCause::CallForwardingBlockedWhileRoaming => {
                "call forwarding not allowed while roaming"
            }
            DisconnectCause::VoicemailNumberMissing => "no voicemail number configured",
            DisconnectCause::AddCallRestricted => "cannot add a call right now",
            DisconnectCause::ErrorUnspecified => "call failed",
        }
    }
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Disconnect cause plus the radio cause code and a free form reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectInfo {
    pub cause: DisconnectCause,
    /// Radio/IMS specific cause code, 0 when not applicable
    pub code: i32,
    pub reason: String,
}

impl DisconnectInfo {
    pub fn new(cause: DisconnectCause) -> Self {
        Self {
            cause,
            code: 0,
            reason: cause.description().to_string(),
        }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Build from a radio failure, keeping its cause code
    pub fn from_radio(failure: RadioFailure, code: i32) -> Self {
        Self::new(failure.into()).with_code(code)
    }

    pub fn local() -> Self {
        Self::new(DisconnectCause::Local)
    }
}

impl fmt::Display for DisconnectInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code != 0 {
            write!(f, "{:?} (code {}): {}", self.cause, self.code, self.reason)
        } else {
            write!(f, "{:?}: {}", self.cause, self.reason)
        }
    }
}
