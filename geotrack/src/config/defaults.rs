//! Default values for every configuration setting.

use super::file::config_directory;
use super::settings::*;
use crate::tracking::{self, PermissionState};

pub const DEFAULT_WATCHDOG_INTERVAL_SECS: u64 = tracking::DEFAULT_WATCHDOG_INTERVAL.as_secs();
pub const DEFAULT_RESTART_DELAY_MS: u64 = tracking::DEFAULT_RESTART_DELAY.as_millis() as u64;
pub const DEFAULT_STALL_THRESHOLD_SECS: u64 = tracking::DEFAULT_STALL_THRESHOLD.as_secs();
pub const DEFAULT_LOW_ACCURACY_THRESHOLD_M: f64 = tracking::DEFAULT_LOW_ACCURACY_THRESHOLD_M;
pub const DEFAULT_DISTANCE_FILTER_M: f64 = tracking::DEFAULT_DISTANCE_FILTER_M;
pub const DEFAULT_SIGNIFICANT_CHANGE_FALLBACK: bool = true;

pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_AUTHORIZATION_RESPONSE: PermissionState = PermissionState::WhenInUse;

/// Log file name inside the logs directory.
pub const DEFAULT_LOG_FILE_NAME: &str = "geotrack.log";

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            watchdog_interval_secs: DEFAULT_WATCHDOG_INTERVAL_SECS,
            restart_delay_ms: DEFAULT_RESTART_DELAY_MS,
            stall_threshold_secs: DEFAULT_STALL_THRESHOLD_SECS,
            low_accuracy_threshold_m: DEFAULT_LOW_ACCURACY_THRESHOLD_M,
            distance_filter_m: DEFAULT_DISTANCE_FILTER_M,
            significant_change_fallback: DEFAULT_SIGNIFICANT_CHANGE_FALLBACK,
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            authorization_response: DEFAULT_AUTHORIZATION_RESPONSE,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            file: config_directory().join("logs").join(DEFAULT_LOG_FILE_NAME),
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            tracking: TrackingSettings::default(),
            simulation: SimulationSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}
