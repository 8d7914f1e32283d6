//! # telephony-core
//!
//! Call-connection lifecycle and origination orchestration for multi-SIM
//! voice calling.
//!
//! The crate owns the state machine of every call leg ([`Connection`]),
//! groups multiparty legs into conferences, arbitrates which calls may be
//! held, and decides which SIM slot and network domain carries an outgoing
//! call, including emergency redial across slots and mid-call domain
//! reselection. Radio signaling, carrier configuration storage and the
//! emergency number database stay outside and are reached through the traits
//! in [`phone`], [`radio`], [`config`], [`emergency`], [`domain_selection`]
//! and [`satellite`].
//!
//! ## Components
//!
//! - [`connection`]: per-call state machine with listener fan-out
//! - [`conference`]: per-technology conference aggregators
//! - [`hold_tracker`]: hold arbitration across calls and conferences
//! - [`orchestrator`]: outgoing/incoming call pipelines
//! - [`selector`]: deterministic SIM slot ranking
//! - [`retry`]: emergency redial queue
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use telephony_core::{
//!     CallOrchestrator, Collaborators, OrchestratorConfig, OutgoingCallRequest,
//!     StaticCarrierConfigProvider, StaticEmergencyNumbers, NoSatellite,
//! };
//! # use telephony_core::phone::{DeviceState, PhoneRegistry};
//! # async fn example(phones: Arc<dyn PhoneRegistry>, device: Arc<dyn DeviceState>) {
//! let orchestrator = CallOrchestrator::new(
//!     OrchestratorConfig::default(),
//!     Collaborators {
//!         phones,
//!         carrier_configs: Arc::new(StaticCarrierConfigProvider::default()),
//!         emergency_numbers: Arc::new(StaticEmergencyNumbers::new(["112", "911"])),
//!         domain_selector: None,
//!         satellite: Arc::new(NoSatellite),
//!         device,
//!     },
//! )
//! .expect("valid config");
//!
//! match orchestrator.place_outgoing_call(OutgoingCallRequest::new("tel:+15551234")).await {
//!     Ok(connection) => println!("dialing {}", connection.id()),
//!     Err(info) => println!("call failed: {info}"),
//! }
//! # }
//! ```

pub mod address;
pub mod capabilities;
pub mod conference;
pub mod config;
pub mod connection;
pub mod disconnect;
pub mod domain_selection;
pub mod emergency;
pub mod error;
pub mod hold_tracker;
pub mod logging;
pub mod orchestrator;
pub mod phone;
pub mod radio;
pub mod retry;
pub mod satellite;
pub mod selector;
pub mod types;
pub mod wait;

pub use address::Address;
pub use capabilities::{Capabilities, Properties};
pub use conference::{Conference, ConferenceCoordinator};
pub use config::{CarrierConfig, CarrierConfigProvider, OrchestratorConfig, StaticCarrierConfigProvider};
pub use connection::{Connection, ConnectionEvent, ConnectionListener, ConnectionParams};
pub use disconnect::{DisconnectCause, DisconnectInfo, RadioFailure};
pub use domain_selection::{DomainSelectionAttributes, DomainSelectionError, DomainSelector};
pub use emergency::{EmergencyNumberClassifier, EmergencyRole, EmergencyRouting, StaticEmergencyNumbers};
pub use error::{Result, TelephonyError};
pub use hold_tracker::HoldTracker;
pub use logging::{setup_logging, LogFormat, LoggingConfig};
pub use orchestrator::{CallOrchestrator, Collaborators, OrchestratorEvent, OutgoingCallRequest};
pub use radio::{DialArgs, RadioError, RadioPath, RadioPathEvent, RadioPathListener, RadioPathSnapshot};
pub use satellite::{NoSatellite, SatelliteController};
pub use types::{
    CallDirection, CallState, ConferenceId, ConnectionId, Domain, PhoneId, ServiceState, SimState,
    SubscriptionId, Technology, VideoState,
};
