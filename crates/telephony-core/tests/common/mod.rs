//! Shared fakes for the orchestrator integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use telephony_core::config::{CarrierConfig, StaticCarrierConfigProvider};
use telephony_core::phone::{DeviceState, Phone, PhoneRegistry};
use telephony_core::{
    CallOrchestrator, CallState, Collaborators, Connection, ConnectionEvent, ConnectionListener,
    DialArgs, DisconnectCause, Domain, DomainSelectionAttributes, DomainSelectionError, DomainSelector,
    OrchestratorConfig, PhoneId, RadioError, RadioFailure, RadioPath, RadioPathEvent, RadioPathListener,
    RadioPathSnapshot, SatelliteController, ServiceState, SimState, StaticEmergencyNumbers,
    SubscriptionId, Technology, VideoState,
};

/// Ordered record of radio commands across every fake
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == entry)
    }
}

// ---- radio path ----

pub struct FakeRadioPath {
    label: String,
    snapshot: Mutex<RadioPathSnapshot>,
    listener: Mutex<Option<Arc<dyn RadioPathListener>>>,
    commands: Mutex<Vec<String>>,
    confirm_hold: AtomicBool,
    journal: Journal,
}

impl FakeRadioPath {
    pub fn new(label: impl Into<String>, state: CallState, technology: Technology, journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            snapshot: Mutex::new(RadioPathSnapshot::new(state, technology)),
            listener: Mutex::new(None),
            commands: Mutex::new(Vec::new()),
            confirm_hold: AtomicBool::new(true),
            journal,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Report an event to the attached connection
    pub fn emit(&self, event: RadioPathEvent) {
        self.snapshot.lock().apply(&event);
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener.on_radio_event(event);
        }
    }

    pub fn fail(&self, failure: RadioFailure) {
        self.emit(RadioPathEvent::Disconnected {
            failure,
            code: 0,
            message: String::new(),
        });
    }

    pub fn set_confirm_hold(&self, confirm: bool) {
        self.confirm_hold.store(confirm, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn has_listener(&self) -> bool {
        self.listener.lock().is_some()
    }

    fn record(&self, command: &str) {
        self.commands.lock().push(command.to_string());
        self.journal.push(format!("{}:{}", command, self.label));
    }
}

impl std::fmt::Debug for FakeRadioPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeRadioPath")
            .field("label", &self.label)
            .field("state", &self.snapshot.lock().state)
            .finish()
    }
}

#[async_trait]
impl RadioPath for FakeRadioPath {
    fn snapshot(&self) -> RadioPathSnapshot {
        self.snapshot.lock().clone()
    }

    fn set_listener(&self, listener: Option<Arc<dyn RadioPathListener>>) {
        *self.listener.lock() = listener;
    }

    async fn answer(&self, _video_state: VideoState) -> Result<(), RadioError> {
        self.record("answer");
        Ok(())
    }

    async fn reject(&self) -> Result<(), RadioError> {
        self.record("reject");
        Ok(())
    }

    async fn hangup(&self) -> Result<(), RadioError> {
        self.record("hangup");
        Ok(())
    }

    async fn hold(&self) -> Result<(), RadioError> {
        self.record("hold");
        if self.confirm_hold.load(Ordering::SeqCst) {
            self.emit(RadioPathEvent::StateChanged(CallState::Holding));
        }
        Ok(())
    }

    async fn unhold(&self) -> Result<(), RadioError> {
        self.record("unhold");
        self.emit(RadioPathEvent::StateChanged(CallState::Active));
        Ok(())
    }

    async fn transfer(&self, number: &str, _consultative: bool) -> Result<(), RadioError> {
        self.record(&format!("transfer {number}"));
        Ok(())
    }

    async fn deflect(&self, number: &str) -> Result<(), RadioError> {
        self.record(&format!("deflect {number}"));
        Ok(())
    }

    async fn pull(&self) -> Result<(), RadioError> {
        self.record("pull");
        Ok(())
    }
}

// ---- phone ----

/// Scripted result of the next dial on a phone
#[derive(Debug, Clone)]
pub enum DialScript {
    Fail(RadioFailure),
    NoCall,
}

/// One recorded dial
#[derive(Debug, Clone)]
pub struct DialRecord {
    pub number: String,
    pub is_emergency: bool,
    pub domain: Option<Domain>,
    pub video_state: VideoState,
}

pub struct FakePhone {
    id: PhoneId,
    subscription: Option<SubscriptionId>,
    technology: Technology,
    service: watch::Sender<ServiceState>,
    /// Service reported once the radio is powered on
    service_after_power_on: Mutex<Option<ServiceState>>,
    sim: Mutex<SimState>,
    radio_access_family: u32,
    ecbm: AtomicBool,
    emergency_sms: AtomicBool,
    emergency_list: Mutex<Vec<String>>,
    voicemail: Mutex<Option<String>>,
    script: Mutex<VecDeque<DialScript>>,
    dials: Mutex<Vec<DialRecord>>,
    radios: Mutex<Vec<Arc<FakeRadioPath>>>,
    power_requests: Mutex<Vec<bool>>,
    journal: Journal,
}

impl FakePhone {
    pub fn new(id: usize, journal: &Journal) -> Self {
        let (service, _) = watch::channel(ServiceState::in_service());
        Self {
            id: PhoneId(id),
            subscription: Some(SubscriptionId(id as i32 + 1)),
            technology: Technology::Ims,
            service,
            service_after_power_on: Mutex::new(Some(ServiceState::in_service())),
            sim: Mutex::new(SimState::Ready),
            radio_access_family: 0b1111,
            ecbm: AtomicBool::new(false),
            emergency_sms: AtomicBool::new(false),
            emergency_list: Mutex::new(Vec::new()),
            voicemail: Mutex::new(Some("+15550000".to_string())),
            script: Mutex::new(VecDeque::new()),
            dials: Mutex::new(Vec::new()),
            radios: Mutex::new(Vec::new()),
            power_requests: Mutex::new(Vec::new()),
            journal: journal.clone(),
        }
    }

    pub fn with_technology(mut self, technology: Technology) -> Self {
        self.technology = technology;
        self
    }

    pub fn with_service(self, service: ServiceState) -> Self {
        self.service.send_replace(service);
        self
    }

    pub fn with_sim(self, sim: SimState) -> Self {
        *self.sim.lock() = sim;
        self
    }

    pub fn without_subscription(mut self) -> Self {
        self.subscription = None;
        self
    }

    pub fn with_radio_access_family(mut self, family: u32) -> Self {
        self.radio_access_family = family;
        self
    }

    pub fn with_emergency_callback_mode(self) -> Self {
        self.ecbm.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_voicemail(self, number: Option<&str>) -> Self {
        *self.voicemail.lock() = number.map(str::to_string);
        self
    }

    /// Radio comes up with `service` after power on; `None` keeps it down
    pub fn with_service_after_power_on(self, service: Option<ServiceState>) -> Self {
        *self.service_after_power_on.lock() = service;
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn id(&self) -> PhoneId {
        self.id
    }

    pub fn set_service(&self, service: ServiceState) {
        self.service.send_replace(service);
    }

    pub fn script(&self, step: DialScript) {
        self.script.lock().push_back(step);
    }

    pub fn dials(&self) -> Vec<DialRecord> {
        self.dials.lock().clone()
    }

    pub fn dialed_numbers(&self) -> Vec<String> {
        self.dials.lock().iter().map(|d| d.number.clone()).collect()
    }

    pub fn radios(&self) -> Vec<Arc<FakeRadioPath>> {
        self.radios.lock().clone()
    }

    pub fn last_radio(&self) -> Arc<FakeRadioPath> {
        self.radios.lock().last().cloned().expect("phone has dialed")
    }

    pub fn power_requests(&self) -> Vec<bool> {
        self.power_requests.lock().clone()
    }

    /// A ringing call arriving on this phone
    pub fn incoming_radio(&self) -> Arc<FakeRadioPath> {
        let label = format!("in{}.{}", self.id.0, self.radios.lock().len());
        let radio = FakeRadioPath::new(label, CallState::Ringing, self.technology, self.journal.clone());
        self.radios.lock().push(radio.clone());
        radio
    }
}

#[async_trait]
impl Phone for FakePhone {
    fn phone_id(&self) -> PhoneId {
        self.id
    }

    fn subscription_id(&self) -> Option<SubscriptionId> {
        self.subscription
    }

    fn technology(&self) -> Technology {
        self.technology
    }

    fn service_state(&self) -> ServiceState {
        *self.service.borrow()
    }

    fn subscribe_service_state(&self) -> watch::Receiver<ServiceState> {
        self.service.subscribe()
    }

    fn sim_state(&self) -> SimState {
        *self.sim.lock()
    }

    fn radio_access_family(&self) -> u32 {
        self.radio_access_family
    }

    fn is_in_emergency_callback_mode(&self) -> bool {
        self.ecbm.load(Ordering::SeqCst)
    }

    fn is_in_emergency_sms_mode(&self) -> bool {
        self.emergency_sms.load(Ordering::SeqCst)
    }

    fn has_emergency_number(&self, number: &str) -> bool {
        self.emergency_list.lock().iter().any(|n| n == number)
    }

    fn voicemail_number(&self) -> Option<String> {
        self.voicemail.lock().clone()
    }

    async fn set_radio_power(&self, on: bool, _for_emergency: bool) {
        self.power_requests.lock().push(on);
        if on {
            let service = *self.service_after_power_on.lock();
            if let Some(service) = service {
                self.service.send_replace(service);
            }
        }
    }

    async fn dial(&self, number: &str, args: DialArgs) -> Result<Option<Arc<dyn RadioPath>>, RadioError> {
        self.dials.lock().push(DialRecord {
            number: number.to_string(),
            is_emergency: args.is_emergency,
            domain: args.domain,
            video_state: args.video_state,
        });
        self.journal.push(format!("dial:{}:{}", self.id.0, number));

        let step = self.script.lock().pop_front();
        match step {
            Some(DialScript::Fail(failure)) => Err(RadioError::rejected(failure, "scripted failure")),
            Some(DialScript::NoCall) => Ok(None),
            None => {
                let label = format!("out{}.{}", self.id.0, self.radios.lock().len());
                let radio = FakeRadioPath::new(label, CallState::Dialing, self.technology, self.journal.clone());
                self.radios.lock().push(radio.clone());
                Ok(Some(radio))
            }
        }
    }
}

// ---- registry, device, satellite ----

pub struct FakeRegistry {
    phones: Vec<Arc<FakePhone>>,
    default_voice: Mutex<Option<PhoneId>>,
    default_data: Mutex<Option<PhoneId>>,
    max_active: AtomicUsize,
    dds_switches: Mutex<Vec<PhoneId>>,
}

impl FakeRegistry {
    pub fn new(phones: Vec<Arc<FakePhone>>) -> Self {
        Self {
            phones,
            default_voice: Mutex::new(Some(PhoneId(0))),
            default_data: Mutex::new(Some(PhoneId(0))),
            max_active: AtomicUsize::new(1),
            dds_switches: Mutex::new(Vec::new()),
        }
    }

    pub fn set_defaults(&self, voice: Option<PhoneId>, data: Option<PhoneId>) {
        *self.default_voice.lock() = voice;
        *self.default_data.lock() = data;
    }

    pub fn set_max_active_subscriptions(&self, max: usize) {
        self.max_active.store(max, Ordering::SeqCst);
    }

    pub fn dds_switches(&self) -> Vec<PhoneId> {
        self.dds_switches.lock().clone()
    }
}

#[async_trait]
impl PhoneRegistry for FakeRegistry {
    fn phones(&self) -> Vec<Arc<dyn Phone>> {
        self.phones.iter().map(|p| p.clone() as Arc<dyn Phone>).collect()
    }

    fn default_voice_phone(&self) -> Option<PhoneId> {
        *self.default_voice.lock()
    }

    fn default_data_phone(&self) -> Option<PhoneId> {
        *self.default_data.lock()
    }

    fn default_phone(&self) -> PhoneId {
        PhoneId(0)
    }

    fn max_active_subscriptions(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn switch_default_data(&self, phone: PhoneId) -> bool {
        self.dds_switches.lock().push(phone);
        *self.default_data.lock() = Some(phone);
        true
    }
}

#[derive(Default)]
pub struct FakeDevice {
    pub tty: AtomicBool,
    pub airplane: AtomicBool,
}

#[async_trait]
impl DeviceState for FakeDevice {
    fn is_tty_enabled(&self) -> bool {
        self.tty.load(Ordering::SeqCst)
    }

    fn is_airplane_mode_on(&self) -> bool {
        self.airplane.load(Ordering::SeqCst)
    }

    async fn disable_airplane_mode(&self) {
        self.airplane.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeSatellite {
    pub active: AtomicBool,
    pub exit_for_emergency: AtomicBool,
    pub exits: AtomicUsize,
}

#[async_trait]
impl SatelliteController for FakeSatellite {
    fn is_satellite_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn should_exit_for_emergency(&self) -> bool {
        self.exit_for_emergency.load(Ordering::SeqCst)
    }

    async fn exit_satellite_mode(&self) -> bool {
        self.exits.fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
        true
    }
}

// ---- domain selection ----

#[derive(Default)]
pub struct FakeDomainSelector {
    selections: Mutex<VecDeque<Result<Domain, DomainSelectionError>>>,
    reselections: Mutex<VecDeque<Result<Domain, DomainSelectionError>>>,
    pub requests: Mutex<Vec<DomainSelectionAttributes>>,
    pub finished: AtomicUsize,
    pub cancelled: AtomicUsize,
}

impl FakeDomainSelector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_select(&self, result: Result<Domain, DomainSelectionError>) {
        self.selections.lock().push_back(result);
    }

    pub fn on_reselect(&self, result: Result<Domain, DomainSelectionError>) {
        self.reselections.lock().push_back(result);
    }
}

#[async_trait]
impl DomainSelector for FakeDomainSelector {
    async fn select(&self, attributes: DomainSelectionAttributes) -> Result<Domain, DomainSelectionError> {
        self.requests.lock().push(attributes);
        self.selections.lock().pop_front().unwrap_or(Ok(Domain::Ps))
    }

    async fn reselect(&self, attributes: DomainSelectionAttributes) -> Result<Domain, DomainSelectionError> {
        self.requests.lock().push(attributes);
        self.reselections.lock().pop_front().unwrap_or(Ok(Domain::Cs))
    }

    fn cancel(&self) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

// ---- listeners ----

/// Records every event of the connections it is attached to
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<ConnectionEvent>>,
}

impl EventRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ConnectionEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&ConnectionEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

impl ConnectionListener for EventRecorder {
    fn on_connection_event(&self, _connection: &Arc<Connection>, event: &ConnectionEvent) {
        self.events.lock().push(event.clone());
    }
}

// ---- harness ----

pub struct Harness {
    pub orchestrator: CallOrchestrator,
    pub registry: Arc<FakeRegistry>,
    pub phones: Vec<Arc<FakePhone>>,
    pub device: Arc<FakeDevice>,
    pub satellite: Arc<FakeSatellite>,
    pub carrier_configs: Arc<StaticCarrierConfigProvider>,
    pub journal: Journal,
}

pub struct HarnessBuilder {
    journal: Journal,
    phones: Vec<Arc<FakePhone>>,
    config: OrchestratorConfig,
    carrier: CarrierConfig,
    selector: Option<Arc<FakeDomainSelector>>,
    emergency_numbers: StaticEmergencyNumbers,
}

impl HarnessBuilder {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            phones: Vec::new(),
            config: OrchestratorConfig::default().with_domain_selection(false),
            carrier: CarrierConfig::default(),
            selector: None,
            emergency_numbers: StaticEmergencyNumbers::new(["112", "911"]),
        }
    }

    pub fn phone(mut self, phone: Arc<FakePhone>) -> Self {
        self.phones.push(phone);
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn carrier(mut self, carrier: CarrierConfig) -> Self {
        self.carrier = carrier;
        self
    }

    pub fn domain_selector(mut self, selector: Arc<FakeDomainSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn emergency_numbers(mut self, numbers: StaticEmergencyNumbers) -> Self {
        self.emergency_numbers = numbers;
        self
    }

    pub fn build(self) -> Harness {
        let registry = Arc::new(FakeRegistry::new(self.phones.clone()));
        let device = Arc::new(FakeDevice::default());
        let satellite = Arc::new(FakeSatellite::default());
        let carrier_configs = Arc::new(StaticCarrierConfigProvider::new(self.carrier));
        let orchestrator = CallOrchestrator::new(
            self.config,
            Collaborators {
                phones: registry.clone(),
                carrier_configs: carrier_configs.clone(),
                emergency_numbers: Arc::new(self.emergency_numbers),
                domain_selector: self.selector.map(|s| s as Arc<dyn DomainSelector>),
                satellite: satellite.clone(),
                device: device.clone(),
            },
        )
        .expect("valid orchestrator config");

        Harness {
            orchestrator,
            registry,
            phones: self.phones,
            device,
            satellite,
            carrier_configs,
            journal: self.journal,
        }
    }
}

impl Harness {
    /// Two in-service IMS phones
    pub fn dual_sim() -> Self {
        let journal = Journal::default();
        HarnessBuilder::new(journal.clone())
            .phone(FakePhone::new(0, &journal).build())
            .phone(FakePhone::new(1, &journal).build())
            .build()
    }

    pub fn phone(&self, index: usize) -> &Arc<FakePhone> {
        &self.phones[index]
    }
}

/// Poll `condition` until it holds, failing the test after a while
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {what}");
}

/// Number of `Destroyed` events in a recording
pub fn destroyed_count(recorder: &EventRecorder) -> usize {
    recorder.count(|e| matches!(e, ConnectionEvent::Destroyed))
}

pub fn is_cause(info: &telephony_core::DisconnectInfo, cause: DisconnectCause) -> bool {
    info.cause == cause
}
