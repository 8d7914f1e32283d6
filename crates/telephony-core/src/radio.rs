//! Radio path handle
//!
//! A [`RadioPath`] is the opaque binding to a live CS or IMS call leg. It
//! accepts commands and reports asynchronous [`RadioPathEvent`]s to the single
//! [`RadioPathListener`] attached to it. Phones create radio paths when they
//! dial (see [`crate::phone::Phone::dial`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::disconnect::RadioFailure;
use crate::emergency::EmergencyRouting;
use crate::types::{AudioQuality, CallState, Domain, Presentation, Technology, VideoState};

/// Errors returned by radio commands
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RadioError {
    /// The radio refused the request
    #[error("Radio rejected request: {failure:?} (code {code}): {message}")]
    Rejected {
        failure: RadioFailure,
        code: i32,
        message: String,
    },

    /// The call leg is gone
    #[error("Radio path no longer exists")]
    Gone,

    /// The request is not supported on this path
    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },
}

impl RadioError {
    pub fn rejected(failure: RadioFailure, message: impl Into<String>) -> Self {
        Self::Rejected {
            failure,
            code: 0,
            message: message.into(),
        }
    }

    /// Radio failure this error maps to
    pub fn failure(&self) -> RadioFailure {
        match self {
            RadioError::Rejected { failure, .. } => *failure,
            RadioError::Gone => RadioFailure::Local,
            RadioError::Unsupported { .. } => RadioFailure::Unspecified,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            RadioError::Rejected { code, .. } => *code,
            _ => 0,
        }
    }
}

/// Opaque reference to an RTT text stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RttStream {
    pub stream_id: String,
}

/// Arguments for a dial request
#[derive(Debug, Clone, Default)]
pub struct DialArgs {
    pub video_state: VideoState,
    pub rtt: Option<RttStream>,
    pub extras: BTreeMap<String, String>,
    pub is_emergency: bool,
    pub is_test_emergency: bool,
    pub emergency_routing: Option<EmergencyRouting>,
    /// Domain chosen by the domain selector, if any
    pub domain: Option<Domain>,
    /// Participants for an adhoc conference dial
    pub conference_participants: Vec<String>,
}

/// State of a radio path as seen by the radio
#[derive(Debug, Clone, PartialEq)]
pub struct RadioPathSnapshot {
    pub state: CallState,
    pub technology: Technology,
    pub address: Option<String>,
    pub address_presentation: Presentation,
    pub caller_name: Option<String>,
    pub caller_name_presentation: Presentation,
    pub video_state: VideoState,
    pub audio_quality: AudioQuality,
    pub wifi: bool,
    pub multiparty: bool,
    pub cross_sim: bool,
    pub rtt_active: bool,
    pub local_video_capable: bool,
    pub remote_video_capable: bool,
    /// External call that can be pulled to this device
    pub pullable: bool,
    pub network_identified_emergency: bool,
    pub voice_privacy: bool,
    pub extras: BTreeMap<String, String>,
}

impl RadioPathSnapshot {
    pub fn new(state: CallState, technology: Technology) -> Self {
        Self {
            state,
            technology,
            address: None,
            address_presentation: Presentation::Allowed,
            caller_name: None,
            caller_name_presentation: Presentation::Allowed,
            video_state: VideoState::AudioOnly,
            audio_quality: AudioQuality::Standard,
            wifi: false,
            multiparty: false,
            cross_sim: false,
            rtt_active: false,
            local_video_capable: false,
            remote_video_capable: false,
            pullable: false,
            network_identified_emergency: false,
            voice_privacy: false,
            extras: BTreeMap::new(),
        }
    }

    /// Fold a non-terminal event into the snapshot
    pub fn apply(&mut self, event: &RadioPathEvent) {
        match event {
            RadioPathEvent::StateChanged(state) => self.state = *state,
            RadioPathEvent::TechnologyChanged(tech) => self.technology = *tech,
            RadioPathEvent::VideoStateChanged(video) => self.video_state = *video,
            RadioPathEvent::VideoCapabilityChanged { local, remote } => {
                self.local_video_capable = *local;
                self.remote_video_capable = *remote;
            }
            RadioPathEvent::AudioQualityChanged(quality) => self.audio_quality = *quality,
            RadioPathEvent::WifiChanged(wifi) => self.wifi = *wifi,
            RadioPathEvent::MultipartyChanged(multiparty) => self.multiparty = *multiparty,
            RadioPathEvent::ExtrasChanged(extras) => self.extras = extras.clone(),
            RadioPathEvent::AddressChanged {
                number,
                presentation,
            } => {
                self.address = number.clone();
                self.address_presentation = *presentation;
            }
            RadioPathEvent::CallerNameChanged { name, presentation } => {
                self.caller_name = name.clone();
                self.caller_name_presentation = *presentation;
            }
            RadioPathEvent::RttChanged(active) => self.rtt_active = *active,
            RadioPathEvent::VoicePrivacyChanged(on) => self.voice_privacy = *on,
            RadioPathEvent::Disconnected { .. } => self.state = CallState::Disconnected,
        }
    }
}

/// Events emitted by a radio path
#[derive(Debug, Clone, PartialEq)]
pub enum RadioPathEvent {
    StateChanged(CallState),
    TechnologyChanged(Technology),
    VideoStateChanged(VideoState),
    VideoCapabilityChanged { local: bool, remote: bool },
    AudioQualityChanged(AudioQuality),
    WifiChanged(bool),
    MultipartyChanged(bool),
    ExtrasChanged(BTreeMap<String, String>),
    AddressChanged {
        number: Option<String>,
        presentation: Presentation,
    },
    CallerNameChanged {
        name: Option<String>,
        presentation: Presentation,
    },
    RttChanged(bool),
    VoicePrivacyChanged(bool),
    Disconnected {
        failure: RadioFailure,
        code: i32,
        message: String,
    },
}

/// Receiver of radio path events
pub trait RadioPathListener: Send + Sync {
    fn on_radio_event(&self, event: RadioPathEvent);
}

/// Handle to a live call leg in the radio/IMS stack
#[async_trait]
pub trait RadioPath: Send + Sync + fmt::Debug {
    /// Current state of the leg
    fn snapshot(&self) -> RadioPathSnapshot;

    /// Attach the single listener, replacing any previous one; `None` detaches
    fn set_listener(&self, listener: Option<Arc<dyn RadioPathListener>>);

    async fn answer(&self, video_state: VideoState) -> Result<(), RadioError>;

    async fn reject(&self) -> Result<(), RadioError>;

    async fn hangup(&self) -> Result<(), RadioError>;

    async fn hold(&self) -> Result<(), RadioError>;

    async fn unhold(&self) -> Result<(), RadioError>;

    async fn transfer(&self, number: &str, consultative: bool) -> Result<(), RadioError>;

    async fn deflect(&self, number: &str) -> Result<(), RadioError>;

    async fn pull(&self) -> Result<(), RadioError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_apply() {
        let mut snap = RadioPathSnapshot::new(CallState::Dialing, Technology::Ims);
        snap.apply(&RadioPathEvent::StateChanged(CallState::Active));
        snap.apply(&RadioPathEvent::WifiChanged(true));
        snap.apply(&RadioPathEvent::VideoCapabilityChanged {
            local: true,
            remote: false,
        });
        assert_eq!(snap.state, CallState::Active);
        assert!(snap.wifi);
        assert!(snap.local_video_capable);
        assert!(!snap.remote_video_capable);

        snap.apply(&RadioPathEvent::Disconnected {
            failure: RadioFailure::Normal,
            code: 16,
            message: String::new(),
        });
        assert_eq!(snap.state, CallState::Disconnected);
    }

    #[test]
    fn test_radio_error_failure() {
        let err = RadioError::rejected(RadioFailure::FdnBlocked, "fdn");
        assert_eq!(err.failure(), RadioFailure::FdnBlocked);
        assert_eq!(RadioError::Gone.failure(), RadioFailure::Local);
    }
}
