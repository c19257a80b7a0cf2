//! Location sample types.
//!
//! - [`LocationSample`] - one fix as delivered by the OS, immutable
//! - [`Confidence`] - annotation added by the filter
//! - [`TaggedSample`] - what consumers receive

use chrono::{DateTime, Utc};

/// A single position fix delivered by the OS location subsystem.
///
/// Fields are private so a sample cannot change after it leaves the OS
/// callback; read them through the accessors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationSample {
    latitude: f64,
    longitude: f64,
    horizontal_accuracy_meters: f64,
    speed_meters_per_second: f64,
    captured_at: DateTime<Utc>,
}

impl LocationSample {
    /// Create a sample.
    pub fn new(
        latitude: f64,
        longitude: f64,
        horizontal_accuracy_meters: f64,
        speed_meters_per_second: f64,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            horizontal_accuracy_meters,
            speed_meters_per_second,
            captured_at,
        }
    }

    /// Latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Radius of uncertainty in meters.
    pub fn horizontal_accuracy_meters(&self) -> f64 {
        self.horizontal_accuracy_meters
    }

    /// Instantaneous speed in meters per second.
    pub fn speed_meters_per_second(&self) -> f64 {
        self.speed_meters_per_second
    }

    /// When the OS captured the fix.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Returns true if `other` is the same fix delivered again.
    pub fn is_same_fix(&self, other: &LocationSample) -> bool {
        self.captured_at == other.captured_at
            && self.latitude == other.latitude
            && self.longitude == other.longitude
    }
}

/// Confidence annotation attached by the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Confidence {
    /// Accuracy within the configured threshold.
    #[default]
    Nominal,
    /// Accuracy worse than the threshold; kept, but consumers should weigh it.
    Low,
}

/// A sample forwarded to consumers with its confidence tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaggedSample {
    pub sample: LocationSample,
    pub confidence: Confidence,
}

impl TaggedSample {
    /// Returns true if the sample was tagged low-confidence.
    pub fn is_low_confidence(&self) -> bool {
        self.confidence == Confidence::Low
    }
}
