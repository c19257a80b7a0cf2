//! Method channels from the UI layer.
//!
//! The UI layer sends named method calls over two channels and expects a
//! boolean back, or a "not implemented" marker for anything unknown:
//!
//! | Channel                | Method                              |
//! |------------------------|-------------------------------------|
//! | `com.movliq/location`  | `enableBackgroundLocationTracking`  |
//! | `com.movliq/location`  | `disableBackgroundLocationTracking` |
//! | `com.movliq/healthkit` | `checkHealthKitAuthorization`       |
//! | `com.movliq/healthkit` | `requestHealthKitAuthorization`     |

use tracing::debug;

use crate::health::{HealthBridge, HealthStore};
use crate::tracking::TrackingHandle;

pub const LOCATION_CHANNEL: &str = "com.movliq/location";
pub const HEALTHKIT_CHANNEL: &str = "com.movliq/healthkit";

pub const ENABLE_BACKGROUND_LOCATION: &str = "enableBackgroundLocationTracking";
pub const DISABLE_BACKGROUND_LOCATION: &str = "disableBackgroundLocationTracking";
pub const CHECK_HEALTH_AUTHORIZATION: &str = "checkHealthKitAuthorization";
pub const REQUEST_HEALTH_AUTHORIZATION: &str = "requestHealthKitAuthorization";

/// A method invocation from the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub method: String,
}

impl MethodCall {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
        }
    }
}

/// Reply to a [`MethodCall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodResult {
    Success(bool),
    NotImplemented,
}

/// `com.movliq/location` handler.
#[derive(Clone)]
pub struct LocationChannel {
    handle: TrackingHandle,
}

impl LocationChannel {
    pub fn new(handle: TrackingHandle) -> Self {
        Self { handle }
    }

    /// Queue the command and acknowledge immediately.
    pub fn handle_call(&self, call: &MethodCall) -> MethodResult {
        match call.method.as_str() {
            ENABLE_BACKGROUND_LOCATION => {
                MethodResult::Success(self.handle.enable_background_location_tracking())
            }
            DISABLE_BACKGROUND_LOCATION => {
                MethodResult::Success(self.handle.disable_background_location_tracking())
            }
            _ => MethodResult::NotImplemented,
        }
    }
}

/// `com.movliq/healthkit` handler.
pub struct HealthChannel<S: HealthStore> {
    bridge: HealthBridge<S>,
}

impl<S: HealthStore> HealthChannel<S> {
    pub fn new(bridge: HealthBridge<S>) -> Self {
        Self { bridge }
    }

    pub async fn handle_call(&self, call: &MethodCall) -> MethodResult {
        match call.method.as_str() {
            CHECK_HEALTH_AUTHORIZATION => MethodResult::Success(self.bridge.check_authorization()),
            REQUEST_HEALTH_AUTHORIZATION => {
                MethodResult::Success(self.bridge.request_authorization().await)
            }
            _ => MethodResult::NotImplemented,
        }
    }
}

/// Routes calls to the channel they were sent on.
pub struct MethodChannels<S: HealthStore> {
    location: LocationChannel,
    health: HealthChannel<S>,
}

impl<S: HealthStore> MethodChannels<S> {
    pub fn new(handle: TrackingHandle, health: HealthBridge<S>) -> Self {
        Self {
            location: LocationChannel::new(handle),
            health: HealthChannel::new(health),
        }
    }

    pub async fn invoke(&self, channel: &str, call: &MethodCall) -> MethodResult {
        let result = match channel {
            LOCATION_CHANNEL => self.location.handle_call(call),
            HEALTHKIT_CHANNEL => self.health.handle_call(call).await,
            _ => MethodResult::NotImplemented,
        };
        debug!(channel, method = %call.method, ?result, "Method call handled");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{HealthAuthorizationStatus, HealthDataKind};
    use crate::simulation::{SimulatedHealthStore, SimulatedPlatform};
    use crate::tracking::{ControllerState, PermissionState, TrackingConfig, TrackingService};

    fn channels(
        health: SimulatedHealthStore,
    ) -> (MethodChannels<SimulatedHealthStore>, TrackingHandle) {
        let platform = SimulatedPlatform::with_authorization(PermissionState::WhenInUse);
        let (handle, _task) = TrackingService::spawn(platform, TrackingConfig::default());
        let channels = MethodChannels::new(handle.clone(), HealthBridge::new(health));
        (channels, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_location_methods_drive_controller() {
        let (channels, handle) = channels(SimulatedHealthStore::new(true));

        let result = channels
            .invoke(LOCATION_CHANNEL, &MethodCall::new(ENABLE_BACKGROUND_LOCATION))
            .await;
        assert_eq!(result, MethodResult::Success(true));
        handle.wait_for_state(ControllerState::Active).await.unwrap();

        let result = channels
            .invoke(LOCATION_CHANNEL, &MethodCall::new(DISABLE_BACKGROUND_LOCATION))
            .await;
        assert_eq!(result, MethodResult::Success(true));
        handle.wait_for_state(ControllerState::Idle).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_after_shutdown_acknowledge_false() {
        let (channels, handle) = channels(SimulatedHealthStore::new(true));
        handle.shutdown();

        let result = channels
            .invoke(LOCATION_CHANNEL, &MethodCall::new(ENABLE_BACKGROUND_LOCATION))
            .await;
        assert_eq!(result, MethodResult::Success(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_methods() {
        let store = SimulatedHealthStore::new(true);
        let (channels, _handle) = channels(store.clone());

        let check = MethodCall::new(CHECK_HEALTH_AUTHORIZATION);
        assert_eq!(
            channels.invoke(HEALTHKIT_CHANNEL, &check).await,
            MethodResult::Success(false)
        );

        let request = MethodCall::new(REQUEST_HEALTH_AUTHORIZATION);
        assert_eq!(
            channels.invoke(HEALTHKIT_CHANNEL, &request).await,
            MethodResult::Success(true)
        );
        assert_eq!(
            store.authorization_status(HealthDataKind::StepCount),
            HealthAuthorizationStatus::SharingAuthorized
        );
        assert_eq!(
            channels.invoke(HEALTHKIT_CHANNEL, &check).await,
            MethodResult::Success(true)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_methods_not_implemented() {
        let (channels, _handle) = channels(SimulatedHealthStore::new(true));

        assert_eq!(
            channels
                .invoke(LOCATION_CHANNEL, &MethodCall::new("getCurrentLocation"))
                .await,
            MethodResult::NotImplemented
        );
        assert_eq!(
            channels
                .invoke(HEALTHKIT_CHANNEL, &MethodCall::new(ENABLE_BACKGROUND_LOCATION))
                .await,
            MethodResult::NotImplemented
        );
        assert_eq!(
            channels
                .invoke("com.movliq/notifications", &MethodCall::new(CHECK_HEALTH_AUTHORIZATION))
                .await,
            MethodResult::NotImplemented
        );
    }
}
