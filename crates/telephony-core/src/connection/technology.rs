//! Per-technology behavior
//!
//! Connections are a single type tagged with a [`Technology`]; the handful of
//! technology specific rules live in a strategy picked by that tag.

use crate::address::looks_like_mmi;
use crate::capabilities::{Capabilities, ConnectionSnapshot, Properties};
use crate::types::Technology;

/// Technology specific rules
pub trait TechnologyBehavior: Send + Sync {
    fn technology(&self) -> Technology;

    /// Final adjustment of the derived capability set
    fn adjust_capabilities(&self, _snapshot: &ConnectionSnapshot, caps: Capabilities) -> Capabilities {
        caps
    }

    /// Final adjustment of the derived property set
    fn adjust_properties(&self, _snapshot: &ConnectionSnapshot, props: Properties) -> Properties {
        props
    }

    /// Whether the dial string is a supplementary service code on this technology
    fn is_mmi_code(&self, dial_string: &str) -> bool {
        looks_like_mmi(dial_string)
    }

    /// Whether MMI codes may be dialed while another call is up
    fn allows_mmi_during_call(&self) -> bool {
        true
    }

    /// Members needed before the aggregator forms a conference
    fn conference_threshold(&self) -> usize;
}

#[derive(Debug)]
pub struct GsmBehavior;

impl TechnologyBehavior for GsmBehavior {
    fn technology(&self) -> Technology {
        Technology::Gsm
    }

    fn conference_threshold(&self) -> usize {
        2
    }
}

#[derive(Debug)]
pub struct CdmaBehavior;

impl TechnologyBehavior for CdmaBehavior {
    fn technology(&self) -> Technology {
        Technology::Cdma
    }

    fn adjust_capabilities(&self, snapshot: &ConnectionSnapshot, caps: Capabilities) -> Capabilities {
        // legs of a CDMA conference cannot be split off
        let mut caps = caps - Capabilities::SEPARATE_FROM_CONFERENCE;
        if snapshot.in_conference {
            caps -= Capabilities::DISCONNECT_FROM_CONFERENCE;
        }
        caps
    }

    fn adjust_properties(&self, snapshot: &ConnectionSnapshot, props: Properties) -> Properties {
        if snapshot.voice_privacy {
            props | Properties::VOICE_PRIVACY
        } else {
            props
        }
    }

    fn is_mmi_code(&self, dial_string: &str) -> bool {
        // CDMA has no short-code MMI, only feature codes
        dial_string.starts_with('*') && dial_string.len() > 1 && !dial_string.ends_with('#')
    }

    fn allows_mmi_during_call(&self) -> bool {
        false
    }

    fn conference_threshold(&self) -> usize {
        2
    }
}

#[derive(Debug)]
pub struct ImsBehavior;

impl TechnologyBehavior for ImsBehavior {
    fn technology(&self) -> Technology {
        Technology::Ims
    }

    fn adjust_capabilities(&self, snapshot: &ConnectionSnapshot, caps: Capabilities) -> Capabilities {
        if snapshot.in_conference {
            caps - Capabilities::SEPARATE_FROM_CONFERENCE
        } else if snapshot.multiparty {
            caps | Capabilities::MANAGE_CONFERENCE
        } else {
            caps
        }
    }

    fn conference_threshold(&self) -> usize {
        // a single multiparty leg is the conference host
        1
    }
}

#[derive(Debug)]
pub struct SatelliteBehavior;

impl TechnologyBehavior for SatelliteBehavior {
    fn technology(&self) -> Technology {
        Technology::Satellite
    }

    fn adjust_capabilities(&self, _snapshot: &ConnectionSnapshot, caps: Capabilities) -> Capabilities {
        caps & Capabilities::MUTE
    }

    fn is_mmi_code(&self, _dial_string: &str) -> bool {
        false
    }

    fn conference_threshold(&self) -> usize {
        usize::MAX
    }
}

static GSM: GsmBehavior = GsmBehavior;
static CDMA: CdmaBehavior = CdmaBehavior;
static IMS: ImsBehavior = ImsBehavior;
static SATELLITE: SatelliteBehavior = SatelliteBehavior;

/// Strategy for a technology tag
pub fn behavior_for(technology: Technology) -> &'static dyn TechnologyBehavior {
    match technology {
        Technology::Gsm => &GSM,
        Technology::Cdma => &CDMA,
        Technology::Ims => &IMS,
        Technology::Satellite => &SATELLITE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CallDirection, CallState};

    #[test]
    fn test_behavior_matches_tag() {
        for tech in [Technology::Gsm, Technology::Cdma, Technology::Ims, Technology::Satellite] {
            assert_eq!(behavior_for(tech).technology(), tech);
        }
    }

    #[test]
    fn test_cdma_voice_privacy() {
        let mut s = ConnectionSnapshot::new(CallDirection::Outgoing, Technology::Cdma);
        s.state = CallState::Active;
        s.voice_privacy = true;
        let props = behavior_for(Technology::Cdma).adjust_properties(&s, Properties::empty());
        assert!(props.contains(Properties::VOICE_PRIVACY));

        // other technologies ignore the flag
        s.technology = Technology::Gsm;
        let props = behavior_for(Technology::Gsm).adjust_properties(&s, Properties::empty());
        assert!(!props.contains(Properties::VOICE_PRIVACY));
    }

    #[test]
    fn test_mmi_per_technology() {
        assert!(behavior_for(Technology::Gsm).is_mmi_code("*#06#"));
        assert!(!behavior_for(Technology::Cdma).is_mmi_code("*#06#"));
        assert!(behavior_for(Technology::Cdma).is_mmi_code("*72"));
        assert!(!behavior_for(Technology::Satellite).is_mmi_code("*#06#"));
    }

    #[test]
    fn test_ims_conference_child_cannot_separate() {
        let mut s = ConnectionSnapshot::new(CallDirection::Outgoing, Technology::Ims);
        s.in_conference = true;
        let caps = behavior_for(Technology::Ims)
            .adjust_capabilities(&s, Capabilities::SEPARATE_FROM_CONFERENCE | Capabilities::MUTE);
        assert_eq!(caps, Capabilities::MUTE);
    }
}
