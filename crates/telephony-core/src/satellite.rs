//! Satellite (non-terrestrial network) controller collaborator

use async_trait::async_trait;

/// Satellite mode controller
#[async_trait]
pub trait SatelliteController: Send + Sync {
    /// Whether satellite mode is on and would block terrestrial calls
    fn is_satellite_active(&self) -> bool;

    /// Whether satellite mode may be left to place an emergency call
    fn should_exit_for_emergency(&self) -> bool;

    /// Leave satellite mode; returns whether it was left
    async fn exit_satellite_mode(&self) -> bool;
}

/// Controller for devices without satellite support
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSatellite;

#[async_trait]
impl SatelliteController for NoSatellite {
    fn is_satellite_active(&self) -> bool {
        false
    }

    fn should_exit_for_emergency(&self) -> bool {
        false
    }

    async fn exit_satellite_mode(&self) -> bool {
        true
    }
}
