//! Incoming calls

use std::sync::Arc;
use tracing::info;

use crate::connection::{Connection, ConnectionParams};
use crate::error::{Result, TelephonyError};
use crate::radio::RadioPath;
use crate::types::{CallState, ConnectionId, PhoneId, VideoState};

use super::CallOrchestrator;

impl CallOrchestrator {
    /// Track a new terminating call reported by `phone`
    pub fn on_incoming_call(&self, phone: PhoneId, radio: Arc<dyn RadioPath>) -> Result<Arc<Connection>> {
        let inner = &self.inner;
        let phone = inner
            .collab
            .phones
            .phone(phone)
            .ok_or(TelephonyError::PhoneNotFound(phone))?;
        let snapshot = radio.snapshot();
        let subscription = phone.subscription_id();

        let params = ConnectionParams::incoming(phone.phone_id(), snapshot.technology)
            .with_subscription(subscription)
            .with_video_state(snapshot.video_state)
            .with_carrier(inner.collab.carrier_configs.config_for(subscription));
        let connection = Connection::new(params);
        inner.register(&connection);
        connection.bind_radio_path(radio);
        info!(connection = %connection.id(), phone = %phone.phone_id(), state = %connection.state(), "Incoming call");
        Ok(connection)
    }

    /// Answer a ringing call, making room on other subscriptions first
    pub async fn accept_incoming_call(&self, id: ConnectionId, video_state: VideoState) -> Result<()> {
        let connection = self.inner.require_connection(id)?;
        let state = connection.state();
        if state != CallState::Ringing {
            return Err(TelephonyError::invalid_state("accept_incoming_call", state));
        }

        self.inner.prepare_for_answer(&connection).await;

        let state = connection.state();
        if state != CallState::Ringing {
            return Err(TelephonyError::invalid_state("accept_incoming_call", state));
        }
        connection.answer(video_state).await
    }

    pub async fn reject_incoming_call(&self, id: ConnectionId) -> Result<()> {
        let connection = self.inner.require_connection(id)?;
        let state = connection.state();
        if state != CallState::Ringing {
            return Err(TelephonyError::invalid_state("reject_incoming_call", state));
        }
        connection.reject().await
    }
}
