//! Orchestrator and carrier configuration
//!
//! [`OrchestratorConfig`] holds device-wide timeouts and feature switches for
//! the origination pipeline. [`CarrierConfig`] is the per-subscription bundle of
//! carrier switches consulted when deriving capabilities and when applying
//! origination policy. Both deserialize from YAML.
//!
//! # Examples
//!
//! ```rust
//! use telephony_core::config::OrchestratorConfig;
//! use std::time::Duration;
//!
//! let config = OrchestratorConfig::default()
//!     .with_radio_power_on_timeout(Duration::from_secs(10))
//!     .with_emergency_retry_rounds(2);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.radio_power_on_timeout(), Duration::from_secs(10));
//! ```

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, TelephonyError};
use crate::types::SubscriptionId;

/// Device-wide orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Upper bound on waiting for the radio to become usable after power on
    pub radio_power_on_timeout_ms: u64,
    /// Upper bound on waiting for another subscription's call to reach HOLDING
    pub hold_confirmation_timeout_ms: u64,
    /// Upper bound on waiting for ringing calls to end before an emergency dial
    pub incoming_reject_timeout_ms: u64,
    /// Upper bound on waiting for a default data subscription switch
    pub dds_switch_timeout_ms: u64,
    /// Number of passes over the phones when redialing an emergency call
    pub emergency_retry_rounds: u32,
    /// Whether emergency calls go through the domain selector
    pub domain_selection_enabled: bool,
    /// Whether emergency failures are redialed on other phones
    pub emergency_redial_enabled: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            radio_power_on_timeout_ms: 60_000,
            hold_confirmation_timeout_ms: 2_000,
            incoming_reject_timeout_ms: 2_000,
            dds_switch_timeout_ms: 1_000,
            emergency_retry_rounds: 1,
            domain_selection_enabled: true,
            emergency_redial_enabled: true,
        }
    }
}

impl OrchestratorConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.radio_power_on_timeout_ms == 0 {
            return Err(TelephonyError::config("radio_power_on_timeout_ms must be > 0"));
        }
        if self.hold_confirmation_timeout_ms == 0 {
            return Err(TelephonyError::config("hold_confirmation_timeout_ms must be > 0"));
        }
        if self.emergency_retry_rounds == 0 {
            return Err(TelephonyError::config("emergency_retry_rounds must be >= 1"));
        }
        Ok(())
    }

    pub fn with_radio_power_on_timeout(mut self, timeout: Duration) -> Self {
        self.radio_power_on_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_hold_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.hold_confirmation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_incoming_reject_timeout(mut self, timeout: Duration) -> Self {
        self.incoming_reject_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_emergency_retry_rounds(mut self, rounds: u32) -> Self {
        self.emergency_retry_rounds = rounds;
        self
    }

    pub fn with_domain_selection(mut self, enabled: bool) -> Self {
        self.domain_selection_enabled = enabled;
        self
    }

    pub fn with_emergency_redial(mut self, enabled: bool) -> Self {
        self.emergency_redial_enabled = enabled;
        self
    }

    pub fn radio_power_on_timeout(&self) -> Duration {
        Duration::from_millis(self.radio_power_on_timeout_ms)
    }

    pub fn hold_confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.hold_confirmation_timeout_ms)
    }

    pub fn incoming_reject_timeout(&self) -> Duration {
        Duration::from_millis(self.incoming_reject_timeout_ms)
    }

    pub fn dds_switch_timeout(&self) -> Duration {
        Duration::from_millis(self.dds_switch_timeout_ms)
    }
}

/// Carrier switches for one subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarrierConfig {
    /// Hold is offered on IMS calls
    pub allow_hold_in_ims_call: bool,
    /// Calls on another subscription may stay held while an emergency call is up
    pub allow_hold_call_during_emergency: bool,
    /// New non-emergency calls may be added while an emergency call is up
    pub allow_add_call_during_emergency: bool,
    pub support_conference_call: bool,
    pub support_video_conference_call: bool,
    pub support_add_participant: bool,
    pub allow_transfer_ims_call: bool,
    pub allow_deflect_ims_call: bool,
    pub support_pause_video: bool,

    /// Show the HD audio indicator at all
    pub display_hd_audio: bool,
    pub hd_audio_on_wifi: bool,
    pub hd_audio_on_video: bool,
    pub hd_audio_on_cs: bool,

    /// Caller names that are placeholders and must not be shown
    pub filtered_cnap_names: Vec<String>,
    /// Rewrite `+81` numbers to national format
    pub format_number_to_national_for_jp: bool,
    /// MMI prefixes that set up call forwarding and are blocked while roaming
    pub call_forwarding_blocked_prefixes_while_roaming: Vec<String>,
    /// Switch the default data subscription to the emergency phone before dialing
    pub emergency_requires_dds_switch: bool,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            allow_hold_in_ims_call: true,
            allow_hold_call_during_emergency: true,
            allow_add_call_during_emergency: false,
            support_conference_call: true,
            support_video_conference_call: false,
            support_add_participant: false,
            allow_transfer_ims_call: false,
            allow_deflect_ims_call: false,
            support_pause_video: true,
            display_hd_audio: true,
            hd_audio_on_wifi: true,
            hd_audio_on_video: true,
            hd_audio_on_cs: false,
            filtered_cnap_names: Vec::new(),
            format_number_to_national_for_jp: false,
            call_forwarding_blocked_prefixes_while_roaming: Vec::new(),
            emergency_requires_dds_switch: false,
        }
    }
}

/// Source of carrier configuration
pub trait CarrierConfigProvider: Send + Sync {
    /// Current configuration for a subscription; `None` means no active SIM
    fn config_for(&self, subscription: Option<SubscriptionId>) -> CarrierConfig;
}

/// In-memory carrier configuration keyed by subscription
#[derive(Debug, Default)]
pub struct StaticCarrierConfigProvider {
    default: CarrierConfig,
    per_subscription: DashMap<SubscriptionId, CarrierConfig>,
}

#[derive(Debug, Deserialize)]
struct CarrierConfigDocument {
    #[serde(default)]
    default: CarrierConfig,
    #[serde(default)]
    subscriptions: Vec<SubscriptionEntry>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionEntry {
    subscription: i32,
    #[serde(flatten)]
    config: CarrierConfig,
}

impl StaticCarrierConfigProvider {
    pub fn new(default: CarrierConfig) -> Self {
        Self {
            default,
            per_subscription: DashMap::new(),
        }
    }

    /// Parse a document of the form
    ///
    /// ```yaml
    /// default:
    ///   allow_hold_in_ims_call: true
    /// subscriptions:
    ///   - subscription: 1
    ///     allow_transfer_ims_call: true
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let doc: CarrierConfigDocument = serde_yaml::from_str(yaml)?;
        let provider = Self::new(doc.default);
        for entry in doc.subscriptions {
            provider.set(SubscriptionId(entry.subscription), entry.config);
        }
        Ok(provider)
    }

    pub fn set(&self, subscription: SubscriptionId, config: CarrierConfig) {
        self.per_subscription.insert(subscription, config);
    }
}

impl CarrierConfigProvider for StaticCarrierConfigProvider {
    fn config_for(&self, subscription: Option<SubscriptionId>) -> CarrierConfig {
        subscription
            .and_then(|sub| self.per_subscription.get(&sub).map(|c| c.value().clone()))
            .unwrap_or_else(|| self.default.clone())
    }
}
