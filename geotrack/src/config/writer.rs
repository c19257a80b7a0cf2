//! INI serialization: `ConfigFile` → commented config.ini text.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let tracking = &config.tracking;
    let simulation = &config.simulation;

    format!(
        r#"[tracking]
; Keep-alive watchdog period. Every tick stops and restarts the location
; update stream so the OS does not silently suspend it.
watchdog_interval_secs = {}
; Pause between stopping and restarting the stream
restart_delay_ms = {}
; Warn when no sample has arrived for this long
stall_threshold_secs = {}
; Samples less accurate than this are kept but tagged low-confidence
low_accuracy_threshold_m = {}
; Minimum movement before the OS delivers a new fix
distance_filter_m = {}
; Also run significant-change monitoring when permission is "always"
significant_change_fallback = {}

[simulation]
; Delay between fixes produced by the simulated platform
sample_interval_ms = {}
; Answer to the first permission prompt:
;   undetermined, when_in_use, always, denied, restricted
authorization_response = {}

[logging]
file = {}
"#,
        tracking.watchdog_interval_secs,
        tracking.restart_delay_ms,
        tracking.stall_threshold_secs,
        tracking.low_accuracy_threshold_m,
        tracking.distance_filter_m,
        tracking.significant_change_fallback,
        simulation.sample_interval_ms,
        simulation.authorization_response,
        path_to_string(&config.logging.file),
    )
}

/// Flatten a `ConfigFile` into `(section.key, value)` pairs.
pub(super) fn to_entries(config: &ConfigFile) -> Vec<(String, String)> {
    let tracking = &config.tracking;
    let simulation = &config.simulation;

    [
        ("tracking.watchdog_interval_secs", tracking.watchdog_interval_secs.to_string()),
        ("tracking.restart_delay_ms", tracking.restart_delay_ms.to_string()),
        ("tracking.stall_threshold_secs", tracking.stall_threshold_secs.to_string()),
        ("tracking.low_accuracy_threshold_m", tracking.low_accuracy_threshold_m.to_string()),
        ("tracking.distance_filter_m", tracking.distance_filter_m.to_string()),
        (
            "tracking.significant_change_fallback",
            tracking.significant_change_fallback.to_string(),
        ),
        ("simulation.sample_interval_ms", simulation.sample_interval_ms.to_string()),
        (
            "simulation.authorization_response",
            simulation.authorization_response.to_string(),
        ),
        ("logging.file", path_to_string(&config.logging.file)),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}

/// Render a path, abbreviating the home directory to `~`.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
