//! Runtime configuration for the tracking controller.

use std::time::Duration;

use tracing::warn;

use crate::config::TrackingSettings;

use super::filter::DEFAULT_LOW_ACCURACY_THRESHOLD_M;
use super::platform::UpdateOptions;
use super::telemetry::DEFAULT_BROADCAST_CAPACITY;
use super::watchdog::{
    DEFAULT_RESTART_DELAY, DEFAULT_STALL_THRESHOLD, DEFAULT_START_TIMEOUT, DEFAULT_WATCHDOG_INTERVAL,
};

/// Configuration for [`TrackingController`](super::TrackingController).
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingConfig {
    /// Keep-alive period.
    pub watchdog_interval: Duration,

    /// Pause between stopping and restarting the update stream.
    pub restart_delay: Duration,

    /// Time without samples before a stall is reported.
    pub stall_threshold: Duration,

    /// How long `Starting` waits for the OS to acknowledge before retrying.
    pub start_timeout: Duration,

    /// Accuracy above which samples are tagged low-confidence (meters).
    pub low_accuracy_threshold_m: f64,

    /// Options passed to the OS when updates start.
    pub update_options: UpdateOptions,

    /// Also run significant-change monitoring when permission is `Always`.
    pub significant_change_fallback: bool,

    /// Capacity of the sample/event broadcast channels.
    pub broadcast_capacity: usize,
}

impl TrackingConfig {
    /// Create a config from settings-file values.
    pub fn from_config(
        watchdog_interval_secs: u64,
        restart_delay_ms: u64,
        stall_threshold_secs: u64,
        low_accuracy_threshold_m: f64,
        distance_filter_m: f64,
        significant_change_fallback: bool,
    ) -> Self {
        Self {
            watchdog_interval: Duration::from_secs(watchdog_interval_secs),
            restart_delay: Duration::from_millis(restart_delay_ms),
            stall_threshold: Duration::from_secs(stall_threshold_secs),
            start_timeout: DEFAULT_START_TIMEOUT,
            low_accuracy_threshold_m,
            update_options: UpdateOptions {
                distance_filter_meters: distance_filter_m,
                ..Default::default()
            },
            significant_change_fallback,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }

    /// Replace values the runtime cannot use with their defaults.
    ///
    /// Timer periods must be non-zero and broadcast channels need at least
    /// one slot.
    pub fn normalized(mut self) -> Self {
        if self.watchdog_interval.is_zero() {
            warn!("watchdog_interval must be non-zero, using default");
            self.watchdog_interval = DEFAULT_WATCHDOG_INTERVAL;
        }
        if self.start_timeout.is_zero() {
            warn!("start_timeout must be non-zero, using default");
            self.start_timeout = DEFAULT_START_TIMEOUT;
        }
        if self.broadcast_capacity == 0 {
            warn!("broadcast_capacity must be at least 1, using default");
            self.broadcast_capacity = DEFAULT_BROADCAST_CAPACITY;
        }
        self
    }
}

impl From<&TrackingSettings> for TrackingConfig {
    fn from(settings: &TrackingSettings) -> Self {
        Self::from_config(
            settings.watchdog_interval_secs,
            settings.restart_delay_ms,
            settings.stall_threshold_secs,
            settings.low_accuracy_threshold_m,
            settings.distance_filter_m,
            settings.significant_change_fallback,
        )
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            watchdog_interval: DEFAULT_WATCHDOG_INTERVAL,
            restart_delay: DEFAULT_RESTART_DELAY,
            stall_threshold: DEFAULT_STALL_THRESHOLD,
            start_timeout: DEFAULT_START_TIMEOUT,
            low_accuracy_threshold_m: DEFAULT_LOW_ACCURACY_THRESHOLD_M,
            update_options: UpdateOptions::default(),
            significant_change_fallback: true,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackingConfig::default();
        assert_eq!(config.watchdog_interval, Duration::from_secs(30));
        assert_eq!(config.restart_delay, Duration::from_millis(500));
        assert_eq!(config.stall_threshold, Duration::from_secs(60));
        assert_eq!(config.low_accuracy_threshold_m, 100.0);
        assert_eq!(config.update_options.distance_filter_meters, 5.0);
        assert!(config.significant_change_fallback);
        assert_eq!(config.start_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_normalized_replaces_unusable_values() {
        let config = TrackingConfig {
            watchdog_interval: Duration::ZERO,
            start_timeout: Duration::ZERO,
            broadcast_capacity: 0,
            ..Default::default()
        }
        .normalized();

        assert_eq!(config.watchdog_interval, DEFAULT_WATCHDOG_INTERVAL);
        assert_eq!(config.start_timeout, DEFAULT_START_TIMEOUT);
        assert_eq!(config.broadcast_capacity, DEFAULT_BROADCAST_CAPACITY);
    }

    #[test]
    fn test_normalized_keeps_valid_values() {
        let config = TrackingConfig {
            watchdog_interval: Duration::from_secs(5),
            restart_delay: Duration::ZERO,
            broadcast_capacity: 1,
            ..Default::default()
        };
        assert_eq!(config.clone().normalized(), config);
    }

    #[test]
    fn test_from_config() {
        let config = TrackingConfig::from_config(45, 250, 90, 50.0, 10.0, false);
        assert_eq!(config.watchdog_interval, Duration::from_secs(45));
        assert_eq!(config.restart_delay, Duration::from_millis(250));
        assert_eq!(config.stall_threshold, Duration::from_secs(90));
        assert_eq!(config.update_options.distance_filter_meters, 10.0);
        assert!(!config.significant_change_fallback);
    }

    #[test]
    fn test_default_settings_match_default_config() {
        let config = TrackingConfig::from(&TrackingSettings::default());
        assert_eq!(config, TrackingConfig::default());
    }
}
