//! Capability and property derivation
//!
//! A connection's capability and property sets are never patched bit by bit.
//! Every time any input changes the connection builds a [`ConnectionSnapshot`]
//! and recomputes both sets from scratch with [`derive_capabilities`] and
//! [`derive_properties`], using the carrier configuration of its subscription.
//!
//! # Examples
//!
//! ```rust
//! use telephony_core::capabilities::{derive_capabilities, Capabilities, ConnectionSnapshot};
//! use telephony_core::config::CarrierConfig;
//! use telephony_core::types::{CallDirection, CallState, Technology};
//!
//! let mut snapshot = ConnectionSnapshot::new(CallDirection::Outgoing, Technology::Ims);
//! snapshot.state = CallState::Active;
//! snapshot.hold_allowed_by_tracker = true;
//!
//! let caps = derive_capabilities(&snapshot, &CarrierConfig::default());
//! assert!(caps.contains(Capabilities::HOLD | Capabilities::SUPPORT_HOLD));
//! ```

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::CarrierConfig;
use crate::connection::technology::behavior_for;
use crate::types::{AudioQuality, CallDirection, CallState, Technology, VideoState};

bitflags! {
    /// Operations a connection currently allows
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        const HOLD = 1;
        const SUPPORT_HOLD = 1 << 1;
        const MUTE = 1 << 2;
        const MERGE_CONFERENCE = 1 << 3;
        const SWAP_CONFERENCE = 1 << 4;
        const TRANSFER = 1 << 5;
        const TRANSFER_CONSULTATIVE = 1 << 6;
        const DEFLECT = 1 << 7;
        const ADD_PARTICIPANT = 1 << 8;
        const CAN_PULL_CALL = 1 << 9;
        const CAN_PAUSE_VIDEO = 1 << 10;
        const SUPPORTS_VT_LOCAL_BIDIRECTIONAL = 1 << 11;
        const SUPPORTS_VT_REMOTE_BIDIRECTIONAL = 1 << 12;
        const SEPARATE_FROM_CONFERENCE = 1 << 13;
        const DISCONNECT_FROM_CONFERENCE = 1 << 14;
        const MANAGE_CONFERENCE = 1 << 15;
    }
}

bitflags! {
    /// Descriptive attributes of a connection
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Properties: u32 {
        const WIFI = 1;
        const HIGH_DEF_AUDIO = 1 << 1;
        const RTT = 1 << 2;
        const EMERGENCY = 1 << 3;
        const CROSS_SIM = 1 << 4;
        const ADHOC_CONFERENCE = 1 << 5;
        const VOICE_PRIVACY = 1 << 6;
        const NETWORK_IDENTIFIED_EMERGENCY = 1 << 7;
        const EXTERNAL_CALL = 1 << 8;
        const CONFERENCE = 1 << 9;
    }
}

macro_rules! bits_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.bits().serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let bits = u32::deserialize(deserializer)?;
                Self::from_bits(bits).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        "invalid {} bits: {bits:#x}",
                        stringify!($ty)
                    ))
                })
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::empty()
            }
        }
    };
}

bits_serde!(Capabilities);
bits_serde!(Properties);

/// Every input the derivations look at
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSnapshot {
    pub state: CallState,
    pub direction: CallDirection,
    pub technology: Technology,
    /// Emergency number, or the network identified the call as emergency
    pub is_emergency: bool,
    pub network_identified_emergency: bool,
    pub video_state: VideoState,
    pub audio_quality: AudioQuality,
    pub wifi: bool,
    pub cross_sim: bool,
    pub rtt_active: bool,
    pub has_rtt_stream: bool,
    pub adhoc_conference: bool,
    pub multiparty: bool,
    pub in_conference: bool,
    pub local_video_capable: bool,
    pub remote_video_capable: bool,
    pub pullable: bool,
    pub voice_privacy: bool,
    /// Verdict of the hold tracker
    pub hold_allowed_by_tracker: bool,
}

impl ConnectionSnapshot {
    pub fn new(direction: CallDirection, technology: Technology) -> Self {
        Self {
            state: CallState::Initializing,
            direction,
            technology,
            is_emergency: false,
            network_identified_emergency: false,
            video_state: VideoState::AudioOnly,
            audio_quality: AudioQuality::Standard,
            wifi: false,
            cross_sim: false,
            rtt_active: false,
            has_rtt_stream: false,
            adhoc_conference: false,
            multiparty: false,
            in_conference: false,
            local_video_capable: false,
            remote_video_capable: false,
            pullable: false,
            voice_privacy: false,
            hold_allowed_by_tracker: false,
        }
    }

    fn is_ims(&self) -> bool {
        self.technology == Technology::Ims
    }
}

/// Whether the connection could be held if the hold tracker agreed
pub fn is_hold_eligible(snapshot: &ConnectionSnapshot, carrier: &CarrierConfig) -> bool {
    !snapshot.is_emergency
        && snapshot.is_ims()
        && carrier.allow_hold_in_ims_call
        && snapshot.state.is_connected()
}

/// Recompute the capability set
pub fn derive_capabilities(snapshot: &ConnectionSnapshot, carrier: &CarrierConfig) -> Capabilities {
    let state = snapshot.state;
    if !state.is_live() {
        return Capabilities::empty();
    }

    let mut caps = Capabilities::MUTE;

    if is_hold_eligible(snapshot, carrier) {
        caps |= Capabilities::SUPPORT_HOLD;
        if snapshot.hold_allowed_by_tracker {
            caps |= Capabilities::HOLD;
        }
    }

    if snapshot.is_ims() && carrier.allow_transfer_ims_call && state.is_connected() && !snapshot.is_emergency {
        caps |= Capabilities::TRANSFER;
        if state == CallState::Holding {
            caps |= Capabilities::TRANSFER_CONSULTATIVE;
        }
    }

    if snapshot.is_ims()
        && carrier.allow_deflect_ims_call
        && state == CallState::Ringing
        && snapshot.direction == CallDirection::Incoming
    {
        caps |= Capabilities::DEFLECT;
    }

    let video_blocks_conference =
        snapshot.video_state.is_video() && !carrier.support_video_conference_call;
    if carrier.support_conference_call
        && !snapshot.is_emergency
        && !video_blocks_conference
        && state.is_connected()
    {
        if snapshot.in_conference {
            caps |= Capabilities::DISCONNECT_FROM_CONFERENCE | Capabilities::SEPARATE_FROM_CONFERENCE;
        } else {
            caps |= Capabilities::MERGE_CONFERENCE | Capabilities::SWAP_CONFERENCE;
        }
    }

    if snapshot.is_ims()
        && carrier.support_add_participant
        && state == CallState::Active
        && (snapshot.multiparty || snapshot.adhoc_conference)
    {
        caps |= Capabilities::ADD_PARTICIPANT;
    }

    if snapshot.pullable && state == CallState::Active {
        caps |= Capabilities::CAN_PULL_CALL;
    }

    if snapshot.local_video_capable {
        caps |= Capabilities::SUPPORTS_VT_LOCAL_BIDIRECTIONAL;
    }
    if snapshot.remote_video_capable {
        caps |= Capabilities::SUPPORTS_VT_REMOTE_BIDIRECTIONAL;
    }
    if snapshot.video_state.is_video()
        && carrier.support_pause_video
        && snapshot.local_video_capable
        && snapshot.remote_video_capable
    {
        caps |= Capabilities::CAN_PAUSE_VIDEO;
    }

    behavior_for(snapshot.technology).adjust_capabilities(snapshot, caps)
}

/// Recompute the property set
pub fn derive_properties(snapshot: &ConnectionSnapshot, carrier: &CarrierConfig) -> Properties {
    let mut props = Properties::empty();

    if snapshot.wifi {
        props |= Properties::WIFI;
    }

    let hd_allowed = carrier.display_hd_audio
        && (!snapshot.wifi || carrier.hd_audio_on_wifi)
        && (!snapshot.video_state.is_video() || carrier.hd_audio_on_video)
        && (snapshot.is_ims() || carrier.hd_audio_on_cs);
    if snapshot.audio_quality == AudioQuality::HighDefinition && hd_allowed {
        props |= Properties::HIGH_DEF_AUDIO;
    }

    if snapshot.rtt_active && snapshot.has_rtt_stream {
        props |= Properties::RTT;
    }
    if snapshot.is_emergency {
        props |= Properties::EMERGENCY;
    }
    if snapshot.network_identified_emergency {
        props |= Properties::NETWORK_IDENTIFIED_EMERGENCY;
    }
    if snapshot.cross_sim {
        props |= Properties::CROSS_SIM;
    }
    if snapshot.adhoc_conference {
        props |= Properties::ADHOC_CONFERENCE;
    }
    if snapshot.pullable {
        props |= Properties::EXTERNAL_CALL;
    }
    if snapshot.multiparty {
        props |= Properties::CONFERENCE;
    }

    behavior_for(snapshot.technology).adjust_properties(snapshot, props)
}
