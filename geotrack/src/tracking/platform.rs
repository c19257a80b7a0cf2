//! Collaborator traits for the OS location and permission subsystems.
//!
//! The controller drives the OS through these traits and nothing else.
//! Calls return immediately; results (samples, errors, acknowledgements,
//! authorization answers) come back as events through the [`EventSink`]
//! the platform receives in [`LocationUpdates::set_event_sink`], the same
//! way a CoreLocation delegate is wired up.

use super::event::EventSink;
use super::permission::PermissionState;

/// Default OS-side distance filter in meters.
pub const DEFAULT_DISTANCE_FILTER_M: f64 = 5.0;

/// Accuracy level requested from the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DesiredAccuracy {
    /// Best the hardware can do.
    #[default]
    Best,
    NearestTenMeters,
    HundredMeters,
}

/// Parameters handed to the OS when updates start.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOptions {
    /// Minimum displacement before the OS delivers a new fix.
    pub distance_filter_meters: f64,

    /// Requested accuracy.
    pub desired_accuracy: DesiredAccuracy,

    /// Keep delivering while the app is in the background.
    pub allows_background_updates: bool,

    /// Let the OS pause updates when it thinks the device is stationary.
    pub pauses_automatically: bool,

    /// Show the system background-location indicator.
    pub shows_background_indicator: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            distance_filter_meters: DEFAULT_DISTANCE_FILTER_M,
            desired_accuracy: DesiredAccuracy::Best,
            allows_background_updates: true,
            pauses_automatically: false,
            shows_background_indicator: true,
        }
    }
}

/// OS permission subsystem.
pub trait AuthorizationProvider: Send + Sync {
    /// Point-in-time authorization status.
    fn authorization_status(&self) -> PermissionState;

    /// Ask the user for access. The answer arrives as
    /// [`ControllerEvent::AuthorizationChanged`](super::event::ControllerEvent::AuthorizationChanged).
    fn request_authorization(&self);
}

/// OS location update subsystem.
pub trait LocationUpdates: Send + Sync {
    /// Register the sink that receives samples, errors and acknowledgements.
    fn set_event_sink(&self, sink: EventSink);

    /// Whether location services are enabled device-wide.
    fn location_services_enabled(&self) -> bool;

    /// Begin fine-grained updates. Acknowledged with `DeliveryStarted`.
    fn start_updates(&self, options: &UpdateOptions);

    /// End fine-grained updates. Acknowledged with `DeliveryStopped`.
    fn stop_updates(&self);

    /// Begin coarse, low-power significant-change monitoring.
    fn start_significant_change_monitoring(&self);

    /// End significant-change monitoring.
    fn stop_significant_change_monitoring(&self);
}

/// Everything the controller needs from the OS.
pub trait LocationPlatform: AuthorizationProvider + LocationUpdates + 'static {}

impl<T: AuthorizationProvider + LocationUpdates + 'static> LocationPlatform for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_update_options() {
        let options = UpdateOptions::default();
        assert_eq!(options.distance_filter_meters, 5.0);
        assert_eq!(options.desired_accuracy, DesiredAccuracy::Best);
        assert!(options.allows_background_updates);
        assert!(!options.pauses_automatically);
        assert!(options.shows_background_indicator);
    }
}
