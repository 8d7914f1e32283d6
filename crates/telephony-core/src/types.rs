//! Core types for telephony-core
//!
//! Identifiers, call states and the small value types shared by the
//! connection state machine, the conference aggregators and the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of a single call leg
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Unique identifier of a conference aggregate
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConferenceId(pub Uuid);

impl ConferenceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conf-{}", self.0)
    }
}

/// Logical SIM slot / radio index
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PhoneId(pub usize);

impl fmt::Display for PhoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phone{}", self.0)
    }
}

/// Active subscription identifier carried by a SIM slot
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SubscriptionId(pub i32);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub{}", self.0)
    }
}

/// Direction of a call leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

/// Lifecycle state of a connection
///
/// ```text
/// Initializing → {Dialing, Ringing} → {Active ⇄ Holding, Pulling} → Disconnecting → Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// Created, no radio path yet (e.g. waiting for the radio to power on)
    Initializing,
    /// Outgoing call placed, remote not answered yet
    Dialing,
    /// Incoming call alerting
    Ringing,
    /// Call connected
    Active,
    /// Call held locally
    Holding,
    /// External call being pulled to this device
    Pulling,
    /// Hangup in progress
    Disconnecting,
    /// Terminal state
    Disconnected,
}

impl CallState {
    /// Whether the call is still alive (not disconnected)
    pub fn is_live(&self) -> bool {
        !matches!(self, CallState::Disconnected)
    }

    /// Active or holding
    pub fn is_connected(&self) -> bool {
        matches!(self, CallState::Active | CallState::Holding)
    }

    /// Whether `next` is a legal transition from `self`
    pub fn can_transition_to(&self, next: CallState) -> bool {
        use CallState::*;
        if *self == next {
            return true;
        }
        match (self, next) {
            (Disconnected, _) => false,
            (_, Disconnected) => true,
            (Initializing, Dialing | Ringing | Active | Pulling | Disconnecting) => true,
            (Dialing, Active | Holding | Disconnecting) => true,
            (Ringing, Active | Holding | Disconnecting) => true,
            (Pulling, Active | Disconnecting) => true,
            (Active, Holding | Disconnecting) => true,
            (Holding, Active | Disconnecting) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallState::Initializing => "INITIALIZING",
            CallState::Dialing => "DIALING",
            CallState::Ringing => "RINGING",
            CallState::Active => "ACTIVE",
            CallState::Holding => "HOLDING",
            CallState::Pulling => "PULLING",
            CallState::Disconnecting => "DISCONNECTING",
            CallState::Disconnected => "DISCONNECTED",
        };
        f.write_str(s)
    }
}

/// Video state of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VideoState {
    #[default]
    AudioOnly,
    TxOnly,
    RxOnly,
    Bidirectional,
    Paused,
}

impl VideoState {
    pub fn is_video(&self) -> bool {
        !matches!(self, VideoState::AudioOnly)
    }
}

/// Radio technology of a call leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Technology {
    Gsm,
    Cdma,
    Ims,
    Satellite,
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Technology::Gsm => "GSM",
            Technology::Cdma => "CDMA",
            Technology::Ims => "IMS",
            Technology::Satellite => "NTN",
        };
        f.write_str(s)
    }
}

/// Network domain a call is placed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    /// Circuit switched
    Cs,
    /// Packet switched (IMS over cellular)
    Ps,
    /// Packet switched over non-3GPP access (Wi-Fi)
    PsWifi,
    /// Non-terrestrial network
    Satellite,
}

impl Domain {
    pub fn is_packet_switched(&self) -> bool {
        matches!(self, Domain::Ps | Domain::PsWifi)
    }
}

/// Audio codec bandwidth reported by the radio path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AudioQuality {
    #[default]
    Standard,
    HighDefinition,
}

/// Number / name presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Presentation {
    #[default]
    Allowed,
    Restricted,
    Unknown,
    Payphone,
}

/// Voice registration state of a phone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationState {
    /// Full service
    InService,
    /// Only emergency calls allowed
    EmergencyOnly,
    OutOfService,
    /// Radio powered off
    PowerOff,
}

/// Service snapshot of a phone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    pub registration: RegistrationState,
    pub roaming: bool,
    /// IMS registered over Wi-Fi while the cellular radio is unusable
    pub wifi_calling_available: bool,
}

impl ServiceState {
    pub fn in_service() -> Self {
        Self {
            registration: RegistrationState::InService,
            roaming: false,
            wifi_calling_available: false,
        }
    }

    pub fn emergency_only() -> Self {
        Self {
            registration: RegistrationState::EmergencyOnly,
            ..Self::in_service()
        }
    }

    pub fn out_of_service() -> Self {
        Self {
            registration: RegistrationState::OutOfService,
            ..Self::in_service()
        }
    }

    pub fn power_off() -> Self {
        Self {
            registration: RegistrationState::PowerOff,
            ..Self::in_service()
        }
    }

    pub fn is_in_service(&self) -> bool {
        self.registration == RegistrationState::InService
    }

    pub fn is_radio_off(&self) -> bool {
        self.registration == RegistrationState::PowerOff
    }

    /// Whether an emergency call can be attempted on this phone
    pub fn is_available_for_emergency(&self) -> bool {
        matches!(
            self.registration,
            RegistrationState::InService | RegistrationState::EmergencyOnly
        )
    }

    /// Whether a call may be placed right now
    pub fn is_ok_to_call(&self, is_emergency: bool) -> bool {
        if is_emergency {
            self.is_available_for_emergency() || self.wifi_calling_available
        } else {
            self.is_in_service() || self.wifi_calling_available
        }
    }
}

/// SIM state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimState {
    Absent,
    PinRequired,
    PukRequired,
    NetworkLocked,
    Ready,
}

impl SimState {
    /// PIN/PUK locked SIMs cannot register for full service
    pub fn is_locked(&self) -> bool {
        matches!(self, SimState::PinRequired | SimState::PukRequired)
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, SimState::Absent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_is_terminal() {
        assert!(!CallState::Disconnected.can_transition_to(CallState::Active));
        assert!(CallState::Disconnected.can_transition_to(CallState::Disconnected));
    }

    #[test]
    fn test_disconnected_reachable_from_everywhere() {
        for state in [
            CallState::Initializing,
            CallState::Dialing,
            CallState::Ringing,
            CallState::Active,
            CallState::Holding,
            CallState::Pulling,
            CallState::Disconnecting,
        ] {
            assert!(state.can_transition_to(CallState::Disconnected), "{state}");
        }
    }

    #[test]
    fn test_hold_toggle() {
        assert!(CallState::Active.can_transition_to(CallState::Holding));
        assert!(CallState::Holding.can_transition_to(CallState::Active));
        assert!(!CallState::Ringing.can_transition_to(CallState::Pulling));
    }

    #[test]
    fn test_ok_to_call() {
        assert!(ServiceState::emergency_only().is_ok_to_call(true));
        assert!(!ServiceState::emergency_only().is_ok_to_call(false));
        assert!(!ServiceState::power_off().is_ok_to_call(true));

        let wifi = ServiceState {
            wifi_calling_available: true,
            ..ServiceState::out_of_service()
        };
        assert!(wifi.is_ok_to_call(false));
    }
}
