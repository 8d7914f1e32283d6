//! Phone selection
//!
//! Picks the SIM slot a call is placed on. Normal calls follow the request
//! hint and the default voice setting. Emergency calls rank every slot by a
//! fixed priority list over a [`SlotStatus`] snapshot, so the same snapshot
//! always yields the same phone.

use std::cmp::Reverse;
use std::sync::Arc;
use tracing::debug;

use crate::phone::{Phone, PhoneRegistry};
use crate::types::{PhoneId, ServiceState, SubscriptionId};

/// Per-slot facts used by emergency selection
#[derive(Debug, Clone, PartialEq)]
pub struct SlotStatus {
    pub phone_id: PhoneId,
    pub subscription: Option<SubscriptionId>,
    pub service: ServiceState,
    /// Radio access family bitmask
    pub capabilities: u32,
    pub sim_locked: bool,
    pub has_sim: bool,
    /// The dialed number is on this slot's emergency list
    pub has_number: bool,
    pub emergency_sms_mode: bool,
}

impl SlotStatus {
    /// Snapshot a phone for a selection round
    pub fn from_phone(phone: &dyn Phone, number: &str) -> Self {
        let sim = phone.sim_state();
        Self {
            phone_id: phone.phone_id(),
            subscription: phone.subscription_id(),
            service: phone.service_state(),
            capabilities: phone.radio_access_family(),
            sim_locked: sim.is_locked(),
            has_sim: sim.is_present() && phone.subscription_id().is_some(),
            has_number: phone.has_emergency_number(number),
            emergency_sms_mode: phone.is_in_emergency_sms_mode(),
        }
    }
}

/// Device-wide defaults consulted by selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionDefaults {
    pub default_voice: Option<PhoneId>,
    pub default_data: Option<PhoneId>,
    pub default_phone: PhoneId,
}

impl SelectionDefaults {
    pub fn from_registry(registry: &dyn PhoneRegistry) -> Self {
        Self {
            default_voice: registry.default_voice_phone(),
            default_data: registry.default_data_phone(),
            default_phone: registry.default_phone(),
        }
    }
}

/// Phone for a normal call
///
/// Order: explicit phone hint, subscription hint, default voice phone,
/// default phone.
pub fn select_for_normal_call(
    registry: &dyn PhoneRegistry,
    phone_hint: Option<PhoneId>,
    subscription_hint: Option<SubscriptionId>,
) -> Option<Arc<dyn Phone>> {
    if let Some(phone) = phone_hint.and_then(|id| registry.phone(id)) {
        return Some(phone);
    }
    if let Some(phone) = subscription_hint.and_then(|sub| registry.phone_for_subscription(sub)) {
        return Some(phone);
    }
    if let Some(phone) = registry.default_voice_phone().and_then(|id| registry.phone(id)) {
        return Some(phone);
    }
    registry.phone(registry.default_phone())
}

/// Phone for an emergency call over a slot snapshot
pub fn select_for_emergency(slots: &[SlotStatus], defaults: SelectionDefaults) -> PhoneId {
    let slot = |id: Option<PhoneId>| id.and_then(|id| slots.iter().find(|s| s.phone_id == id));

    if let Some(s) = slots.iter().find(|s| s.emergency_sms_mode) {
        debug!(phone = %s.phone_id, "Emergency selection: emergency SMS mode");
        return s.phone_id;
    }

    if let Some(s) = slot(defaults.default_voice).filter(|s| s.service.is_in_service()) {
        debug!(phone = %s.phone_id, "Emergency selection: default voice phone in service");
        return s.phone_id;
    }
    if let Some(s) = slot(defaults.default_data).filter(|s| s.service.is_in_service()) {
        debug!(phone = %s.phone_id, "Emergency selection: default data phone in service");
        return s.phone_id;
    }

    let available: Vec<&SlotStatus> = slots
        .iter()
        .filter(|s| s.service.is_available_for_emergency())
        .collect();
    if let Some(s) = available.iter().find(|s| s.has_number) {
        debug!(phone = %s.phone_id, "Emergency selection: number on emergency list");
        return s.phone_id;
    }
    if let Some(s) = available.iter().find(|s| s.service.is_in_service()) {
        debug!(phone = %s.phone_id, "Emergency selection: first phone in service");
        return s.phone_id;
    }

    let candidates: Vec<&SlotStatus> = if available.is_empty() {
        slots.iter().collect()
    } else {
        available
    };
    let best = candidates.into_iter().min_by_key(|s| {
        (
            s.sim_locked,
            Reverse(s.capabilities.count_ones()),
            Reverse(s.capabilities),
            !s.has_sim,
            s.phone_id,
        )
    });
    match best {
        Some(s) => {
            debug!(phone = %s.phone_id, locked = s.sim_locked, "Emergency selection: ranked");
            s.phone_id
        }
        None => {
            debug!(phone = %defaults.default_phone, "Emergency selection: default phone");
            defaults.default_phone
        }
    }
}
