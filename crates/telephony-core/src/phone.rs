//! Phone, phone registry and device state collaborators
//!
//! A [`Phone`] is one SIM slot / radio. It reports its service and SIM state
//! and acts as the radio path factory for calls placed on it. The
//! [`PhoneRegistry`] enumerates phones and exposes device-wide subscription
//! settings. [`DeviceState`] covers the remaining device switches the
//! origination pipeline consults.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

use crate::radio::{DialArgs, RadioError, RadioPath};
use crate::types::{PhoneId, ServiceState, SimState, SubscriptionId, Technology};

/// One SIM slot and its radio
#[async_trait]
pub trait Phone: Send + Sync {
    fn phone_id(&self) -> PhoneId;

    /// Active subscription on the slot, `None` for an empty or inactive slot
    fn subscription_id(&self) -> Option<SubscriptionId>;

    /// Technology used for CS calls on this phone
    fn technology(&self) -> Technology;

    fn service_state(&self) -> ServiceState;

    /// Service state updates; the current value is always available
    fn subscribe_service_state(&self) -> watch::Receiver<ServiceState>;

    fn sim_state(&self) -> SimState;

    /// Bitmask of supported radio access families, more bits is more capable
    fn radio_access_family(&self) -> u32;

    fn is_in_emergency_callback_mode(&self) -> bool;

    fn is_in_emergency_sms_mode(&self) -> bool;

    /// Whether the SIM/network emergency list of this phone has `number`
    fn has_emergency_number(&self, number: &str) -> bool;

    fn voicemail_number(&self) -> Option<String>;

    /// Power the cellular radio on or off
    async fn set_radio_power(&self, on: bool, for_emergency: bool);

    /// Place a call
    ///
    /// `Ok(None)` means the request was consumed without creating a call leg,
    /// for example an MMI code handled by the network.
    async fn dial(
        &self,
        number: &str,
        args: DialArgs,
    ) -> Result<Option<Arc<dyn RadioPath>>, RadioError>;
}

/// All phones on the device
#[async_trait]
pub trait PhoneRegistry: Send + Sync {
    /// Phones in slot order
    fn phones(&self) -> Vec<Arc<dyn Phone>>;

    fn phone(&self, id: PhoneId) -> Option<Arc<dyn Phone>> {
        self.phones().into_iter().find(|p| p.phone_id() == id)
    }

    fn phone_for_subscription(&self, sub: SubscriptionId) -> Option<Arc<dyn Phone>> {
        self.phones()
            .into_iter()
            .find(|p| p.subscription_id() == Some(sub))
    }

    fn default_voice_phone(&self) -> Option<PhoneId>;

    fn default_data_phone(&self) -> Option<PhoneId>;

    /// Last resort phone
    fn default_phone(&self) -> PhoneId;

    /// Subscriptions that may carry calls at the same time (1 = DSDS, 2 = DSDA)
    fn max_active_subscriptions(&self) -> usize;

    /// Temporarily make `phone` the default data subscription
    ///
    /// Returns whether the switch completed.
    async fn switch_default_data(&self, phone: PhoneId) -> bool;
}

/// Device wide switches
#[async_trait]
pub trait DeviceState: Send + Sync {
    fn is_tty_enabled(&self) -> bool;

    fn is_airplane_mode_on(&self) -> bool;

    async fn disable_airplane_mode(&self);
}
