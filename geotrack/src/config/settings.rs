//! Settings structs, one per `[section]` of config.ini.

use std::path::PathBuf;

use crate::tracking::PermissionState;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub tracking: TrackingSettings,
    pub simulation: SimulationSettings,
    pub logging: LoggingSettings,
}

/// `[tracking]` - controller timing and filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSettings {
    /// Keep-alive watchdog period in seconds
    pub watchdog_interval_secs: u64,
    /// Pause between stopping and restarting the update stream
    pub restart_delay_ms: u64,
    /// Seconds without samples before a stall is reported
    pub stall_threshold_secs: u64,
    /// Accuracy above which samples are tagged low-confidence
    pub low_accuracy_threshold_m: f64,
    /// OS-side distance filter
    pub distance_filter_m: f64,
    /// Run significant-change monitoring alongside updates under `Always`
    pub significant_change_fallback: bool,
}

/// `[simulation]` - the simulated platform used by `geotrack simulate`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    pub sample_interval_ms: u64,
    /// Answer given to the first authorization prompt
    pub authorization_response: PermissionState,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Log file path
    pub file: PathBuf,
}
