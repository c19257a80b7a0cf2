//! INI parsing: `Ini` → `ConfigFile`.
//!
//! The single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::tracking::PermissionState;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [tracking] section
    if let Some(section) = ini.section(Some("tracking")) {
        if let Some(v) = section.get("watchdog_interval_secs") {
            config.tracking.watchdog_interval_secs =
                parse_positive("tracking", "watchdog_interval_secs", v, "seconds")?;
        }
        if let Some(v) = section.get("restart_delay_ms") {
            config.tracking.restart_delay_ms =
                v.trim().parse().map_err(|_| ConfigFileError::InvalidValue {
                    section: "tracking".to_string(),
                    key: "restart_delay_ms".to_string(),
                    value: v.to_string(),
                    reason: "must be a non-negative integer (milliseconds)".to_string(),
                })?;
        }
        if let Some(v) = section.get("stall_threshold_secs") {
            config.tracking.stall_threshold_secs =
                parse_positive("tracking", "stall_threshold_secs", v, "seconds")?;
        }
        if let Some(v) = section.get("low_accuracy_threshold_m") {
            config.tracking.low_accuracy_threshold_m =
                parse_meters("tracking", "low_accuracy_threshold_m", v, false)?;
        }
        if let Some(v) = section.get("distance_filter_m") {
            config.tracking.distance_filter_m =
                parse_meters("tracking", "distance_filter_m", v, true)?;
        }
        if let Some(v) = section.get("significant_change_fallback") {
            config.tracking.significant_change_fallback = parse_bool(v);
        }
    }

    // [simulation] section
    if let Some(section) = ini.section(Some("simulation")) {
        if let Some(v) = section.get("sample_interval_ms") {
            config.simulation.sample_interval_ms =
                parse_positive("simulation", "sample_interval_ms", v, "milliseconds")?;
        }
        if let Some(v) = section.get("authorization_response") {
            config.simulation.authorization_response =
                PermissionState::from_str(v).map_err(|_| ConfigFileError::InvalidValue {
                    section: "simulation".to_string(),
                    key: "authorization_response".to_string(),
                    value: v.to_string(),
                    reason: "must be one of: undetermined, when_in_use, always, denied, restricted"
                        .to_string(),
                })?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = expand_tilde(v);
            }
        }
    }

    Ok(config)
}

fn parse_positive(section: &str, key: &str, value: &str, unit: &str) -> Result<u64, ConfigFileError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigFileError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: format!("must be a positive integer ({})", unit),
        }),
    }
}

fn parse_meters(
    section: &str,
    key: &str,
    value: &str,
    allow_zero: bool,
) -> Result<f64, ConfigFileError> {
    match value.trim().parse::<f64>() {
        Ok(m) if m.is_finite() && (m > 0.0 || (allow_zero && m == 0.0)) => Ok(m),
        _ => Err(ConfigFileError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: if allow_zero {
                "must be a non-negative number (meters)".to_string()
            } else {
                "must be a positive number (meters)".to_string()
            },
        }),
    }
}

/// Parse a boolean value from a config string.
/// Accepts: true/false, yes/no, 1/0, on/off (case-insensitive)
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
