//! Location update filter.
//!
//! The OS already applies the distance filter from [`UpdateOptions`] before
//! delivering, so this filter does not gate on displacement. It drops only a
//! fix the OS re-delivers after a stop/restart cycle (CoreLocation replays its
//! cached location on every `startUpdatingLocation`) and tags samples whose
//! accuracy is worse than the threshold. Low-accuracy samples are still
//! accepted: some signal beats none in the background.
//!
//! [`UpdateOptions`]: super::platform::UpdateOptions

use super::sample::{Confidence, LocationSample};

/// Default accuracy above which samples are tagged low-confidence (meters).
pub const DEFAULT_LOW_ACCURACY_THRESHOLD_M: f64 = 100.0;

/// Outcome of running a sample through the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Forward the sample with this confidence tag.
    Accept(Confidence),
    /// Drop the sample.
    Reject,
}

/// Pass-through filter that annotates sample confidence.
#[derive(Debug, Clone)]
pub struct LocationFilter {
    low_accuracy_threshold_m: f64,
}

impl Default for LocationFilter {
    fn default() -> Self {
        Self::new(DEFAULT_LOW_ACCURACY_THRESHOLD_M)
    }
}

impl LocationFilter {
    /// Create a filter with a custom low-accuracy threshold.
    pub fn new(low_accuracy_threshold_m: f64) -> Self {
        Self {
            low_accuracy_threshold_m,
        }
    }

    /// Threshold in meters.
    pub fn low_accuracy_threshold_m(&self) -> f64 {
        self.low_accuracy_threshold_m
    }

    /// Decide whether `sample` is forwarded, given the last accepted sample.
    pub fn accept(
        &self,
        sample: &LocationSample,
        last_accepted: Option<&LocationSample>,
    ) -> FilterDecision {
        if let Some(last) = last_accepted {
            if sample.is_same_fix(last) {
                return FilterDecision::Reject;
            }
        }

        FilterDecision::Accept(self.confidence_of(sample))
    }

    fn confidence_of(&self, sample: &LocationSample) -> Confidence {
        if sample.horizontal_accuracy_meters() > self.low_accuracy_threshold_m {
            Confidence::Low
        } else {
            Confidence::Nominal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn sample_at(offset_secs: i64, lat: f64, accuracy: f64) -> LocationSample {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        LocationSample::new(lat, 29.0, accuracy, 1.4, base + Duration::seconds(offset_secs))
    }

    #[test]
    fn test_first_sample_accepted() {
        let filter = LocationFilter::default();
        let decision = filter.accept(&sample_at(0, 41.0, 8.0), None);
        assert_eq!(decision, FilterDecision::Accept(Confidence::Nominal));
    }

    #[test]
    fn test_low_accuracy_tagged_not_dropped() {
        let filter = LocationFilter::default();
        let previous = sample_at(0, 41.0, 8.0);
        let decision = filter.accept(&sample_at(5, 41.001, 150.0), Some(&previous));
        assert_eq!(decision, FilterDecision::Accept(Confidence::Low));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let filter = LocationFilter::default();
        let decision = filter.accept(&sample_at(0, 41.0, 100.0), None);
        assert_eq!(decision, FilterDecision::Accept(Confidence::Nominal));
    }

    #[test]
    fn test_redelivered_fix_rejected() {
        let filter = LocationFilter::default();
        let previous = sample_at(0, 41.0, 8.0);
        let replay = previous;
        assert_eq!(filter.accept(&replay, Some(&previous)), FilterDecision::Reject);
    }

    #[test]
    fn test_stationary_new_fix_accepted() {
        // Same coordinates but a new capture time is a genuine sample
        let filter = LocationFilter::default();
        let previous = sample_at(0, 41.0, 8.0);
        let decision = filter.accept(&sample_at(30, 41.0, 8.0), Some(&previous));
        assert_eq!(decision, FilterDecision::Accept(Confidence::Nominal));
    }

    #[test]
    fn test_custom_threshold() {
        let filter = LocationFilter::new(20.0);
        assert_eq!(filter.low_accuracy_threshold_m(), 20.0);
        let decision = filter.accept(&sample_at(0, 41.0, 25.0), None);
        assert_eq!(decision, FilterDecision::Accept(Confidence::Low));
    }
}
