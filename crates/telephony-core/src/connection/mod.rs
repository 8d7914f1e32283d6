//! Connection state machine
//!
//! A [`Connection`] is one call leg. It is created before any radio resource
//! exists (state [`CallState::Initializing`]), gets a [`RadioPath`] bound to it
//! once the dial succeeds, follows the radio's events, and is destroyed exactly
//! once after it reaches [`CallState::Disconnected`].
//!
//! The visible state, capability set, property set, address and caller name
//! are always recomputed as a whole by [`Connection::update_state`], which
//! publishes only what changed to the registered [`ConnectionListener`]s.
//!
//! Radio command failures never escape: a failing hangup, answer or reject
//! turns into a `Disconnected` with a structured cause, the other commands log
//! and carry on.
//!
//! # Redial and reselection
//!
//! An emergency connection with redial enabled does not end when the radio
//! reports an emergency temporary/permanent failure. It drops the radio path
//! and publishes [`ConnectionEvent::RedialRequested`] so the orchestrator can
//! dial again on another phone. A connection under domain selection reacts
//! the same way to failures asking for another domain, publishing
//! [`ConnectionEvent::DomainReselectionRequested`].

pub mod listener;
pub mod technology;

pub use listener::{ConnectionEvent, ConnectionListener, ListenerRegistry};
pub use technology::{behavior_for, TechnologyBehavior};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::address::{filter_cnap_name, format_for_carrier, Address};
use crate::capabilities::{derive_capabilities, derive_properties, Capabilities, ConnectionSnapshot, Properties};
use crate::config::CarrierConfig;
use crate::disconnect::{DisconnectCause, DisconnectInfo, RetryClass};
use crate::error::{Result, TelephonyError};
use crate::radio::{RadioPath, RadioPathEvent, RadioPathListener, RadioPathSnapshot, RttStream};
use crate::types::{
    CallDirection, CallState, ConferenceId, ConnectionId, PhoneId, Presentation, SubscriptionId,
    Technology, VideoState,
};

/// Creation parameters of a connection
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub direction: CallDirection,
    pub phone_id: PhoneId,
    pub subscription: Option<SubscriptionId>,
    pub technology: Technology,
    pub address: Address,
    pub video_state: VideoState,
    pub is_emergency: bool,
    pub is_test_emergency: bool,
    pub adhoc_conference: bool,
    pub carrier: CarrierConfig,
    pub extras: BTreeMap<String, String>,
}

impl ConnectionParams {
    pub fn outgoing(phone_id: PhoneId, technology: Technology, address: Address) -> Self {
        Self {
            direction: CallDirection::Outgoing,
            phone_id,
            subscription: None,
            technology,
            address,
            video_state: VideoState::AudioOnly,
            is_emergency: false,
            is_test_emergency: false,
            adhoc_conference: false,
            carrier: CarrierConfig::default(),
            extras: BTreeMap::new(),
        }
    }

    pub fn incoming(phone_id: PhoneId, technology: Technology) -> Self {
        Self {
            direction: CallDirection::Incoming,
            ..Self::outgoing(phone_id, technology, Address::tel(""))
        }
    }

    pub fn with_subscription(mut self, subscription: Option<SubscriptionId>) -> Self {
        self.subscription = subscription;
        self
    }

    pub fn with_video_state(mut self, video_state: VideoState) -> Self {
        self.video_state = video_state;
        self
    }

    pub fn with_emergency(mut self, is_emergency: bool, is_test: bool) -> Self {
        self.is_emergency = is_emergency;
        self.is_test_emergency = is_test;
        self
    }

    pub fn with_adhoc_conference(mut self, adhoc: bool) -> Self {
        self.adhoc_conference = adhoc;
        self
    }

    pub fn with_carrier(mut self, carrier: CarrierConfig) -> Self {
        self.carrier = carrier;
        self
    }

    pub fn with_extras(mut self, extras: BTreeMap<String, String>) -> Self {
        self.extras = extras;
        self
    }
}

/// Last values published to listeners
#[derive(Debug, Clone, PartialEq)]
struct Published {
    state: CallState,
    capabilities: Capabilities,
    properties: Properties,
    address: (Option<String>, Presentation),
    caller_name: (Option<String>, Presentation),
    video_state: VideoState,
    extras: BTreeMap<String, String>,
}

#[derive(Debug)]
struct Inner {
    phone_id: PhoneId,
    subscription: Option<SubscriptionId>,
    technology: Technology,
    carrier: CarrierConfig,
    dialed: Address,
    requested_video: VideoState,
    is_emergency: bool,
    is_test_emergency: bool,
    adhoc_conference: bool,

    radio: Option<Arc<dyn RadioPath>>,
    /// Bumped on every bind/unbind; events from older bindings are dropped
    generation: u64,
    /// Last radio snapshot, kept across unbind
    radio_snapshot: Option<RadioPathSnapshot>,
    state_override: Option<CallState>,
    local_extras: BTreeMap<String, String>,
    rtt_stream: Option<RttStream>,
    conference: Option<ConferenceId>,
    hold_allowed: bool,

    emergency_redial_enabled: bool,
    domain_selection_active: bool,
    awaiting_redial: bool,

    disconnect_info: Option<DisconnectInfo>,
    teardown_started: bool,
    destroyed: bool,

    published: Published,
    /// A fan-out is running; nested updates are queued behind it
    publishing: bool,
    republish: bool,
}

impl Inner {
    fn visible_state(&self) -> CallState {
        if self.disconnect_info.is_some() {
            return CallState::Disconnected;
        }
        if let Some(state) = self.state_override {
            return state;
        }
        self.radio_snapshot
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(CallState::Initializing)
    }

    fn snapshot(&self, direction: CallDirection) -> ConnectionSnapshot {
        let mut snap = ConnectionSnapshot::new(direction, self.technology);
        snap.state = self.visible_state();
        snap.is_emergency = self.is_emergency;
        snap.adhoc_conference = self.adhoc_conference;
        snap.in_conference = self.conference.is_some();
        snap.has_rtt_stream = self.rtt_stream.is_some();
        snap.hold_allowed_by_tracker = self.hold_allowed;
        snap.video_state = self.requested_video;
        if let Some(radio) = &self.radio_snapshot {
            snap.is_emergency = self.is_emergency || radio.network_identified_emergency;
            snap.network_identified_emergency = radio.network_identified_emergency;
            snap.video_state = radio.video_state;
            snap.audio_quality = radio.audio_quality;
            snap.wifi = radio.wifi;
            snap.cross_sim = radio.cross_sim;
            snap.rtt_active = radio.rtt_active;
            snap.multiparty = radio.multiparty;
            snap.local_video_capable = radio.local_video_capable;
            snap.remote_video_capable = radio.remote_video_capable;
            snap.pullable = radio.pullable;
            snap.voice_privacy = radio.voice_privacy;
        }
        snap
    }

    fn compute(&self, direction: CallDirection) -> Published {
        let snap = self.snapshot(direction);
        let capabilities = derive_capabilities(&snap, &self.carrier);
        let properties = derive_properties(&snap, &self.carrier);

        let (number, presentation, name, name_presentation, radio_extras) = match &self.radio_snapshot {
            Some(radio) => (
                radio.address.clone().or_else(|| non_empty(&self.dialed.number)),
                radio.address_presentation,
                radio.caller_name.clone(),
                radio.caller_name_presentation,
                radio.extras.clone(),
            ),
            None => (
                non_empty(&self.dialed.number),
                Presentation::Allowed,
                None,
                Presentation::Allowed,
                BTreeMap::new(),
            ),
        };
        let number = number.map(|n| format_for_carrier(&n, &self.carrier));
        let name = filter_cnap_name(name.as_deref(), &self.carrier);

        let mut extras = radio_extras;
        extras.extend(self.local_extras.iter().map(|(k, v)| (k.clone(), v.clone())));

        Published {
            state: snap.state,
            capabilities,
            properties,
            address: (number, presentation),
            caller_name: (name, name_presentation),
            video_state: snap.video_state,
            extras,
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() { None } else { Some(s.to_string()) }
}

/// Diff two published records into listener events, in a fixed order
fn diff(old: &Published, new: &Published) -> Vec<ConnectionEvent> {
    let mut events = Vec::new();
    if old.state != new.state {
        events.push(ConnectionEvent::StateChanged {
            old: old.state,
            new: new.state,
        });
    }
    if old.capabilities != new.capabilities {
        events.push(ConnectionEvent::CapabilitiesChanged(new.capabilities));
    }
    if old.properties != new.properties {
        events.push(ConnectionEvent::PropertiesChanged(new.properties));
    }
    if old.address != new.address {
        events.push(ConnectionEvent::AddressChanged {
            number: new.address.0.clone(),
            presentation: new.address.1,
        });
    }
    if old.caller_name != new.caller_name {
        events.push(ConnectionEvent::CallerNameChanged {
            name: new.caller_name.0.clone(),
            presentation: new.caller_name.1,
        });
    }
    if old.video_state != new.video_state {
        events.push(ConnectionEvent::VideoStateChanged(new.video_state));
    }
    if old.extras != new.extras {
        events.push(ConnectionEvent::ExtrasChanged(new.extras.clone()));
    }
    events
}

/// Forwards radio events to the connection bound at `generation`
struct RadioEventBridge {
    connection: Weak<Connection>,
    generation: u64,
}

impl RadioPathListener for RadioEventBridge {
    fn on_radio_event(&self, event: RadioPathEvent) {
        if let Some(connection) = self.connection.upgrade() {
            connection.on_radio_event(self.generation, event);
        }
    }
}

/// One call leg
pub struct Connection {
    id: ConnectionId,
    direction: CallDirection,
    created_at: DateTime<Utc>,
    inner: Mutex<Inner>,
    listeners: ListenerRegistry,
    state_tx: watch::Sender<CallState>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("phone", &inner.phone_id)
            .field("technology", &inner.technology)
            .field("state", &inner.published.state)
            .finish()
    }
}

impl Connection {
    pub fn new(params: ConnectionParams) -> Arc<Self> {
        let mut inner = Inner {
            phone_id: params.phone_id,
            subscription: params.subscription,
            technology: params.technology,
            carrier: params.carrier,
            dialed: params.address,
            requested_video: params.video_state,
            is_emergency: params.is_emergency,
            is_test_emergency: params.is_test_emergency,
            adhoc_conference: params.adhoc_conference,
            radio: None,
            generation: 0,
            radio_snapshot: None,
            state_override: None,
            local_extras: params.extras,
            rtt_stream: None,
            conference: None,
            hold_allowed: false,
            emergency_redial_enabled: false,
            domain_selection_active: false,
            awaiting_redial: false,
            disconnect_info: None,
            teardown_started: false,
            destroyed: false,
            publishing: false,
            republish: false,
            published: Published {
                state: CallState::Initializing,
                capabilities: Capabilities::empty(),
                properties: Properties::empty(),
                address: (None, Presentation::Allowed),
                caller_name: (None, Presentation::Allowed),
                video_state: VideoState::AudioOnly,
                extras: BTreeMap::new(),
            },
        };
        inner.published = inner.compute(params.direction);
        let (state_tx, _) = watch::channel(inner.published.state);

        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            direction: params.direction,
            created_at: Utc::now(),
            inner: Mutex::new(inner),
            listeners: ListenerRegistry::new(),
            state_tx,
        });
        debug!(connection = %connection.id, direction = ?connection.direction, "Connection created");
        connection
    }

    // ---- accessors ----

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> CallState {
        self.inner.lock().published.state
    }

    pub fn capabilities(&self) -> Capabilities {
        self.inner.lock().published.capabilities
    }

    pub fn properties(&self) -> Properties {
        self.inner.lock().published.properties
    }

    /// Displayed address after carrier formatting
    pub fn address(&self) -> Option<String> {
        self.inner.lock().published.address.0.clone()
    }

    pub fn address_presentation(&self) -> Presentation {
        self.inner.lock().published.address.1
    }

    /// Address as dialed
    pub fn dialed_address(&self) -> Address {
        self.inner.lock().dialed.clone()
    }

    pub fn caller_name(&self) -> Option<String> {
        self.inner.lock().published.caller_name.0.clone()
    }

    pub fn video_state(&self) -> VideoState {
        self.inner.lock().published.video_state
    }

    pub fn extras(&self) -> BTreeMap<String, String> {
        self.inner.lock().published.extras.clone()
    }

    pub fn phone_id(&self) -> PhoneId {
        self.inner.lock().phone_id
    }

    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.inner.lock().subscription
    }

    pub fn technology(&self) -> Technology {
        self.inner.lock().technology
    }

    pub fn carrier_config(&self) -> CarrierConfig {
        self.inner.lock().carrier.clone()
    }

    pub fn is_emergency(&self) -> bool {
        let inner = self.inner.lock();
        inner.is_emergency
            || inner
                .radio_snapshot
                .as_ref()
                .is_some_and(|s| s.network_identified_emergency)
    }

    pub fn is_test_emergency(&self) -> bool {
        self.inner.lock().is_test_emergency
    }

    pub fn is_adhoc_conference(&self) -> bool {
        self.inner.lock().adhoc_conference
    }

    /// Whether the radio reports this leg as part of a multiparty call
    pub fn is_multiparty(&self) -> bool {
        self.inner
            .lock()
            .radio_snapshot
            .as_ref()
            .is_some_and(|s| s.multiparty)
    }

    pub fn conference_id(&self) -> Option<ConferenceId> {
        self.inner.lock().conference
    }

    pub fn rtt_stream(&self) -> Option<RttStream> {
        self.inner.lock().rtt_stream.clone()
    }

    pub fn disconnect_info(&self) -> Option<DisconnectInfo> {
        self.inner.lock().disconnect_info.clone()
    }

    pub fn has_radio_path(&self) -> bool {
        self.inner.lock().radio.is_some()
    }

    pub fn radio_path(&self) -> Option<Arc<dyn RadioPath>> {
        self.inner.lock().radio.clone()
    }

    pub fn is_awaiting_redial(&self) -> bool {
        self.inner.lock().awaiting_redial
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }

    /// Watch the visible state
    pub fn subscribe_state(&self) -> watch::Receiver<CallState> {
        self.state_tx.subscribe()
    }

    // ---- listeners ----

    pub fn add_listener(&self, listener: Arc<dyn ConnectionListener>) -> bool {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ConnectionListener>) -> bool {
        self.listeners.remove(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn notify(self: &Arc<Self>, event: ConnectionEvent) {
        self.listeners.notify(self, &event);
    }

    // ---- orchestrator controls ----

    /// Enable emergency redial instead of a terminal disconnect
    pub fn set_emergency_redial_enabled(&self, enabled: bool) {
        self.inner.lock().emergency_redial_enabled = enabled;
    }

    /// Mark the connection as placed through domain selection
    pub fn set_domain_selection_active(&self, active: bool) {
        self.inner.lock().domain_selection_active = active;
    }

    pub fn is_domain_selection_active(&self) -> bool {
        self.inner.lock().domain_selection_active
    }

    /// Move the connection to another phone before a redial
    pub fn reassign_phone(
        self: &Arc<Self>,
        phone_id: PhoneId,
        subscription: Option<SubscriptionId>,
        technology: Technology,
        carrier: CarrierConfig,
    ) {
        {
            let mut inner = self.inner.lock();
            inner.phone_id = phone_id;
            inner.subscription = subscription;
            inner.technology = technology;
            inner.carrier = carrier;
        }
        debug!(connection = %self.id, phone = %phone_id, "Connection moved to phone");
        self.update_state();
    }

    /// Verdict of the hold tracker
    pub fn set_holdable(self: &Arc<Self>, allowed: bool) {
        {
            let mut inner = self.inner.lock();
            if inner.hold_allowed == allowed {
                return;
            }
            inner.hold_allowed = allowed;
        }
        self.update_state();
    }

    /// Join or leave a conference
    pub fn set_conference(self: &Arc<Self>, conference: Option<ConferenceId>) {
        {
            let mut inner = self.inner.lock();
            if inner.conference == conference {
                return;
            }
            inner.conference = conference;
        }
        self.notify(ConnectionEvent::ConferenceChanged(conference));
        self.update_state();
    }

    // ---- radio binding ----

    /// Bind a live radio path
    ///
    /// Any previous binding is released first. The handle's current snapshot
    /// becomes the connection's radio view.
    pub fn bind_radio_path(self: &Arc<Self>, radio: Arc<dyn RadioPath>) {
        let snapshot = radio.snapshot();
        let (previous, generation) = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            let previous = inner.radio.replace(radio.clone());
            inner.technology = snapshot.technology;
            inner.radio_snapshot = Some(snapshot);
            inner.state_override = None;
            inner.awaiting_redial = false;
            (previous, inner.generation)
        };
        if let Some(previous) = previous {
            previous.set_listener(None);
        }
        radio.set_listener(Some(Arc::new(RadioEventBridge {
            connection: Arc::downgrade(self),
            generation,
        })));
        debug!(connection = %self.id, generation, "Radio path bound");
        self.update_state();
    }

    /// Drop the radio path without changing the visible state
    pub fn unbind_radio_path(&self) {
        let previous = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.radio.take()
        };
        if let Some(previous) = previous {
            previous.set_listener(None);
            debug!(connection = %self.id, "Radio path unbound");
        }
    }

    /// Apply an event from the currently bound radio path
    pub fn handle_radio_event(self: &Arc<Self>, event: RadioPathEvent) {
        let generation = self.inner.lock().generation;
        self.on_radio_event(generation, event);
    }

    fn on_radio_event(self: &Arc<Self>, generation: u64, event: RadioPathEvent) {
        {
            let inner = self.inner.lock();
            if inner.generation != generation || inner.radio.is_none() {
                debug!(connection = %self.id, "Dropping event from stale radio path");
                return;
            }
        }

        if let RadioPathEvent::Disconnected {
            failure,
            code,
            message,
        } = event
        {
            self.on_radio_disconnected(failure, code, message);
            return;
        }

        {
            let mut inner = self.inner.lock();
            if let RadioPathEvent::StateChanged(next) = event {
                let current = inner.visible_state();
                if !current.can_transition_to(next) {
                    debug!(connection = %self.id, %current, %next, "Dropping illegal state transition from radio");
                    return;
                }
                inner.state_override = None;
            }
            if let RadioPathEvent::TechnologyChanged(tech) = event {
                inner.technology = tech;
            }
            if let Some(snapshot) = inner.radio_snapshot.as_mut() {
                snapshot.apply(&event);
            }
        }
        self.update_state();
    }

    fn on_radio_disconnected(
        self: &Arc<Self>,
        failure: crate::disconnect::RadioFailure,
        code: i32,
        message: String,
    ) {
        enum Outcome {
            Redial { phone: PhoneId, permanent: bool },
            Reselect,
            Terminal,
        }

        let outcome = {
            let mut inner = self.inner.lock();
            let retry = failure.retry_class();
            let never_connected = !inner.visible_state().is_connected();
            if inner.is_emergency
                && inner.emergency_redial_enabled
                && retry != RetryClass::None
                && never_connected
            {
                inner.awaiting_redial = true;
                Outcome::Redial {
                    phone: inner.phone_id,
                    permanent: retry == RetryClass::Permanent,
                }
            } else if inner.domain_selection_active && failure.requires_reselection() {
                inner.awaiting_redial = true;
                Outcome::Reselect
            } else {
                Outcome::Terminal
            }
        };

        match outcome {
            Outcome::Redial { phone, permanent } => {
                info!(connection = %self.id, phone = %phone, permanent, ?failure, "Emergency dial failed, requesting redial");
                self.unbind_radio_path();
                self.notify(ConnectionEvent::RedialRequested { phone, permanent });
            }
            Outcome::Reselect => {
                info!(connection = %self.id, ?failure, code, "Requesting domain reselection");
                self.unbind_radio_path();
                self.notify(ConnectionEvent::DomainReselectionRequested {
                    cause: failure.into(),
                    code,
                });
            }
            Outcome::Terminal => {
                let mut info = DisconnectInfo::from_radio(failure, code);
                if !message.is_empty() {
                    info = info.with_reason(message);
                }
                self.set_disconnected(info);
            }
        }
    }

    // ---- state recomputation ----

    /// Recompute everything derived and publish what changed
    ///
    /// Calling it twice in a row publishes nothing the second time. A call made
    /// while listeners are being notified (from a listener or another thread)
    /// is deferred until that fan-out ends, so the last value each listener
    /// sees is the current one.
    pub fn update_state(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock();
            if inner.publishing {
                inner.republish = true;
                return;
            }
            inner.publishing = true;
        }

        loop {
            let Some((events, new_state, disconnected_now)) = self.commit_published() else {
                return;
            };

            if !events.is_empty() {
                self.state_tx.send_if_modified(|current| {
                    if *current != new_state {
                        *current = new_state;
                        true
                    } else {
                        false
                    }
                });
            }

            for event in events {
                if let ConnectionEvent::StateChanged { old, new } = &event {
                    info!(connection = %self.id, %old, %new, "Connection state changed");
                }
                self.notify(event);
            }

            if disconnected_now {
                self.teardown();
            }

            let mut inner = self.inner.lock();
            if !inner.republish || inner.destroyed {
                inner.publishing = false;
                inner.republish = false;
                return;
            }
        }
    }

    /// Swap in freshly computed values and return what changed
    ///
    /// Ends the fan-out when there is nothing to publish.
    fn commit_published(&self) -> Option<(Vec<ConnectionEvent>, CallState, bool)> {
        let mut inner = self.inner.lock();
        inner.republish = false;
        if inner.destroyed {
            inner.publishing = false;
            return None;
        }
        let next = inner.compute(self.direction);
        let events = diff(&inner.published, &next);
        let disconnected_now = next.state == CallState::Disconnected && !inner.teardown_started;
        if disconnected_now {
            inner.teardown_started = true;
        }
        let new_state = next.state;
        inner.published = next;
        if events.is_empty() && !disconnected_now {
            inner.publishing = false;
            return None;
        }
        Some((events, new_state, disconnected_now))
    }

    fn teardown(self: &Arc<Self>) {
        let (info, conference) = {
            let mut inner = self.inner.lock();
            let info = inner
                .disconnect_info
                .clone()
                .unwrap_or_else(DisconnectInfo::local);
            (info, inner.conference.take())
        };
        info!(connection = %self.id, cause = ?info.cause, code = info.code, "Connection disconnected");
        self.notify(ConnectionEvent::Disconnected(info));
        if conference.is_some() {
            self.notify(ConnectionEvent::ConferenceChanged(None));
        }
        self.unbind_radio_path();
        self.destroy();
    }

    fn destroy(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock();
            if inner.destroyed {
                return;
            }
            inner.destroyed = true;
        }
        debug!(connection = %self.id, "Connection destroyed");
        self.notify(ConnectionEvent::Destroyed);
        self.listeners.clear();
    }

    // ---- commands ----

    /// End the connection with `info`; no-op once disconnected
    pub fn set_disconnected(self: &Arc<Self>, info: DisconnectInfo) {
        {
            let mut inner = self.inner.lock();
            if inner.disconnect_info.is_some() {
                return;
            }
            inner.disconnect_info = Some(info);
            inner.state_override = None;
        }
        self.update_state();
    }

    /// Disconnect if still live and release everything
    pub fn close(self: &Arc<Self>) {
        if self.state().is_live() {
            self.set_disconnected(DisconnectInfo::local());
        }
        // a fan-out in progress may have deferred the teardown
        let pending_teardown = {
            let mut inner = self.inner.lock();
            let pending = inner.disconnect_info.is_some() && !inner.teardown_started && !inner.destroyed;
            if pending {
                inner.teardown_started = true;
            }
            pending
        };
        if pending_teardown {
            self.teardown();
        } else {
            self.unbind_radio_path();
            self.destroy();
        }
    }

    /// Present `Holding` while the leg is merged into a conference
    pub fn force_holding_for_merge(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock();
            if inner.disconnect_info.is_some() {
                return;
            }
            inner.state_override = Some(CallState::Holding);
        }
        self.update_state();
    }

    pub fn put_extras(self: &Arc<Self>, extras: BTreeMap<String, String>) {
        self.inner.lock().local_extras.extend(extras);
        self.update_state();
    }

    pub fn remove_extras<S: AsRef<str>>(self: &Arc<Self>, keys: &[S]) {
        {
            let mut inner = self.inner.lock();
            for key in keys {
                inner.local_extras.remove(key.as_ref());
            }
        }
        self.update_state();
    }

    pub fn set_rtt_stream(self: &Arc<Self>, stream: Option<RttStream>) {
        self.inner.lock().rtt_stream = stream;
        self.update_state();
    }

    fn require_radio(&self, operation: &str) -> Result<Arc<dyn RadioPath>> {
        let inner = self.inner.lock();
        match &inner.radio {
            Some(radio) => Ok(radio.clone()),
            None => Err(TelephonyError::invalid_state(operation, inner.visible_state())),
        }
    }

    /// Answer a ringing call
    pub async fn answer(self: &Arc<Self>, video_state: VideoState) -> Result<()> {
        let state = self.state();
        if state != CallState::Ringing {
            return Err(TelephonyError::invalid_state("answer", state));
        }
        let radio = self.require_radio("answer")?;
        debug!(connection = %self.id, ?video_state, "Answering");
        if let Err(e) = radio.answer(video_state).await {
            warn!(connection = %self.id, error = %e, "Answer failed");
            self.set_disconnected(DisconnectInfo::from_radio(e.failure(), e.code()).with_reason(e.to_string()));
        }
        Ok(())
    }

    /// Reject a ringing call
    pub async fn reject(self: &Arc<Self>) -> Result<()> {
        let radio = self.require_radio("reject")?;
        debug!(connection = %self.id, "Rejecting");
        match radio.reject().await {
            Ok(()) => self.set_disconnected(DisconnectInfo::new(DisconnectCause::IncomingRejected)),
            Err(e) => {
                warn!(connection = %self.id, error = %e, "Reject failed");
                self.set_disconnected(DisconnectInfo::from_radio(e.failure(), e.code()).with_reason(e.to_string()));
            }
        }
        Ok(())
    }

    /// Hang up with a local cause
    ///
    /// A connection without a radio path is disconnected directly.
    pub async fn hangup(self: &Arc<Self>, cause: DisconnectCause) {
        if !self.state().is_live() {
            return;
        }
        let radio = self.radio_path();
        debug!(connection = %self.id, ?cause, bound = radio.is_some(), "Hanging up");
        let info = match radio {
            Some(radio) => match radio.hangup().await {
                Ok(()) => DisconnectInfo::new(cause),
                Err(e) => {
                    warn!(connection = %self.id, error = %e, "Hangup failed");
                    DisconnectInfo::from_radio(e.failure(), e.code()).with_reason(e.to_string())
                }
            },
            None => DisconnectInfo::new(cause),
        };
        self.set_disconnected(info);
    }

    pub async fn hold(&self) {
        match self.require_radio("hold") {
            Ok(radio) => {
                if let Err(e) = radio.hold().await {
                    warn!(connection = %self.id, error = %e, "Hold failed");
                }
            }
            Err(e) => warn!(connection = %self.id, error = %e, "Cannot hold"),
        }
    }

    pub async fn unhold(&self) {
        match self.require_radio("unhold") {
            Ok(radio) => {
                if let Err(e) = radio.unhold().await {
                    warn!(connection = %self.id, error = %e, "Unhold failed");
                }
            }
            Err(e) => warn!(connection = %self.id, error = %e, "Cannot unhold"),
        }
    }

    pub async fn transfer(&self, number: &str, consultative: bool) {
        match self.require_radio("transfer") {
            Ok(radio) => {
                if let Err(e) = radio.transfer(number, consultative).await {
                    warn!(connection = %self.id, error = %e, "Transfer failed");
                }
            }
            Err(e) => warn!(connection = %self.id, error = %e, "Cannot transfer"),
        }
    }

    pub async fn deflect(&self, number: &str) {
        match self.require_radio("deflect") {
            Ok(radio) => {
                if let Err(e) = radio.deflect(number).await {
                    warn!(connection = %self.id, error = %e, "Deflect failed");
                }
            }
            Err(e) => warn!(connection = %self.id, error = %e, "Cannot deflect"),
        }
    }

    pub async fn pull(&self) {
        match self.require_radio("pull") {
            Ok(radio) => {
                if let Err(e) = radio.pull().await {
                    warn!(connection = %self.id, error = %e, "Pull failed");
                }
            }
            Err(e) => warn!(connection = %self.id, error = %e, "Cannot pull"),
        }
    }
}
