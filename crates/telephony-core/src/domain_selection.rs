//! Domain selection collaborator
//!
//! The domain selector decides whether a call goes over CS, IMS over
//! cellular, IMS over Wi-Fi or satellite. The orchestrator runs at most one
//! emergency selection session at a time; [`DomainSelectionSession`] tracks
//! it and cancels the previous one when a new one starts.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::disconnect::DisconnectCause;
use crate::types::{ConnectionId, Domain, PhoneId, SubscriptionId};

/// Inputs of a selection or reselection request
#[derive(Debug, Clone, PartialEq)]
pub struct DomainSelectionAttributes {
    pub subscription: Option<SubscriptionId>,
    pub phone: PhoneId,
    pub address: String,
    pub is_emergency: bool,
    pub is_video: bool,
    /// Cause and cause code of the failure that triggered a reselection
    pub failure: Option<(DisconnectCause, i32)>,
}

impl DomainSelectionAttributes {
    pub fn new(phone: PhoneId, subscription: Option<SubscriptionId>, address: impl Into<String>) -> Self {
        Self {
            subscription,
            phone,
            address: address.into(),
            is_emergency: false,
            is_video: false,
            failure: None,
        }
    }

    pub fn emergency(mut self, is_emergency: bool) -> Self {
        self.is_emergency = is_emergency;
        self
    }

    pub fn video(mut self, is_video: bool) -> Self {
        self.is_video = is_video;
        self
    }

    pub fn with_failure(mut self, cause: DisconnectCause, code: i32) -> Self {
        self.failure = Some((cause, code));
        self
    }
}

/// Domain selection failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainSelectionError {
    /// No selector service; callers dial directly over CS
    #[error("Domain selection unavailable")]
    Unavailable,

    /// Selection finished with no usable domain
    #[error("Domain selection failed: {0}")]
    Terminal(DisconnectCause),
}

/// Domain selection service
#[async_trait]
pub trait DomainSelector: Send + Sync {
    async fn select(&self, attributes: DomainSelectionAttributes) -> Result<Domain, DomainSelectionError>;

    async fn reselect(&self, attributes: DomainSelectionAttributes) -> Result<Domain, DomainSelectionError>;

    /// Abandon the running selection
    fn cancel(&self);

    /// The call placed with the selected domain completed
    fn finish(&self);
}

/// The single active emergency selection sequence
#[derive(Default)]
pub struct DomainSelectionSession {
    active: Mutex<Option<ConnectionId>>,
}

impl DomainSelectionSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a sequence for `connection`, cancelling any prior one
    pub fn begin(&self, selector: &Arc<dyn DomainSelector>, connection: ConnectionId) {
        let previous = self.active.lock().replace(connection);
        if let Some(previous) = previous.filter(|p| *p != connection) {
            debug!(previous = %previous, connection = %connection, "Cancelling previous domain selection");
            selector.cancel();
        }
    }

    pub fn is_active_for(&self, connection: ConnectionId) -> bool {
        *self.active.lock() == Some(connection)
    }

    /// End the sequence of `connection` if it is the active one
    pub fn end(&self, selector: &Arc<dyn DomainSelector>, connection: ConnectionId) -> bool {
        let mut active = self.active.lock();
        if *active == Some(connection) {
            *active = None;
            drop(active);
            selector.finish();
            true
        } else {
            false
        }
    }

    pub fn active(&self) -> Option<ConnectionId> {
        *self.active.lock()
    }
}

impl std::fmt::Debug for DomainSelectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainSelectionSession")
            .field("active", &self.active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSelector {
        cancels: AtomicUsize,
        finishes: AtomicUsize,
    }

    #[async_trait]
    impl DomainSelector for CountingSelector {
        async fn select(&self, _attributes: DomainSelectionAttributes) -> Result<Domain, DomainSelectionError> {
            Ok(Domain::Ps)
        }

        async fn reselect(&self, _attributes: DomainSelectionAttributes) -> Result<Domain, DomainSelectionError> {
            Ok(Domain::Cs)
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }

        fn finish(&self) {
            self.finishes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_new_session_cancels_previous() {
        let counting = Arc::new(CountingSelector::default());
        let selector: Arc<dyn DomainSelector> = counting.clone();
        let session = DomainSelectionSession::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        session.begin(&selector, a);
        session.begin(&selector, a);
        assert_eq!(counting.cancels.load(Ordering::SeqCst), 0);

        session.begin(&selector, b);
        assert_eq!(counting.cancels.load(Ordering::SeqCst), 1);
        assert!(session.is_active_for(b));

        assert!(!session.end(&selector, a));
        assert!(session.end(&selector, b));
        assert_eq!(counting.finishes.load(Ordering::SeqCst), 1);
        assert_eq!(session.active(), None);
    }

    #[test]
    fn test_attributes_builder() {
        let attrs = DomainSelectionAttributes::new(PhoneId(0), Some(SubscriptionId(1)), "911")
            .emergency(true)
            .with_failure(DisconnectCause::RetryRequired, 146);
        assert!(attrs.is_emergency);
        assert!(!attrs.is_video);
        assert_eq!(attrs.failure, Some((DisconnectCause::RetryRequired, 146)));
    }
}
