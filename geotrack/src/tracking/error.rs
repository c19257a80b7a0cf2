//! Error types for background tracking.
//!
//! None of these are fatal. They describe why the controller is waiting,
//! and are logged and published as events rather than returned across the
//! command boundary.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Failure conditions the controller can be in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackingError {
    /// User or policy refused location access; waits for an external grant.
    #[error("Location permission denied")]
    PermissionDenied,

    /// Location services are switched off for the whole device.
    #[error("Location services are disabled on this device")]
    ServicesDisabled,

    /// No sample accepted for longer than the stall threshold.
    #[error("No location samples for {}s", elapsed.as_secs())]
    DeliveryStall { elapsed: Duration },

    /// A delivery error the OS is expected to recover from.
    #[error("Transient delivery error: {0}")]
    TransientDelivery(String),

    /// The controller's event loop has shut down.
    #[error("Tracking controller is not running")]
    ControllerUnavailable,
}

/// Delivery error reported by the OS location subsystem.
///
/// Mirrors the CoreLocation error domain codes that reach the delegate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformError {
    /// Access to location was denied (`kCLErrorDenied`).
    Denied,
    /// No fix could be obtained right now (`kCLErrorLocationUnknown`).
    LocationUnknown,
    /// Network-assisted positioning failed (`kCLErrorNetwork`).
    Network,
    /// Compass interference (`kCLErrorHeadingFailure`).
    HeadingFailure,
    /// Any other code.
    Other(i64),
}

impl PlatformError {
    /// Sort the error into the class the controller reacts to.
    pub fn classify(&self) -> DeliveryErrorClass {
        match self {
            Self::Denied => DeliveryErrorClass::PermissionRevoked,
            Self::LocationUnknown | Self::Network | Self::HeadingFailure => {
                DeliveryErrorClass::TransientNetworkOrSensor
            }
            Self::Other(_) => DeliveryErrorClass::Unknown,
        }
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Denied => write!(f, "location access denied"),
            Self::LocationUnknown => write!(f, "location currently unknown"),
            Self::Network => write!(f, "network positioning failed"),
            Self::HeadingFailure => write!(f, "heading could not be determined"),
            Self::Other(code) => write!(f, "location error code {}", code),
        }
    }
}

/// Controller-facing classification of a delivery error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryErrorClass {
    /// Suspend the session until permission returns.
    PermissionRevoked,
    /// Log only; the watchdog restart recovers.
    TransientNetworkOrSensor,
    /// Log only.
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            PlatformError::Denied.classify(),
            DeliveryErrorClass::PermissionRevoked
        );
        assert_eq!(
            PlatformError::Network.classify(),
            DeliveryErrorClass::TransientNetworkOrSensor
        );
        assert_eq!(
            PlatformError::LocationUnknown.classify(),
            DeliveryErrorClass::TransientNetworkOrSensor
        );
        assert_eq!(
            PlatformError::Other(17).classify(),
            DeliveryErrorClass::Unknown
        );
    }

    #[test]
    fn test_stall_message() {
        let err = TrackingError::DeliveryStall {
            elapsed: Duration::from_secs(75),
        };
        assert_eq!(err.to_string(), "No location samples for 75s");
    }
}
