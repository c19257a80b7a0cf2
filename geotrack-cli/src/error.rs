//! CLI error handling with user-friendly messages.

use std::fmt;
use std::process;

use geotrack::config::ConfigFileError;
use geotrack::tracking::TrackingError;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(ConfigFileError),
    /// Failed to build the async runtime
    Runtime(std::io::Error),
    /// Failed to install the Ctrl-C handler
    Signal(String),
    /// The controller stopped responding
    Tracking(TrackingError),
}

impl CliError {
    /// Exit the process with an error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Config(ConfigFileError::InvalidValue { .. }) => {
                eprintln!();
                eprintln!("Fix the value in the config file, or regenerate it with:");
                eprintln!("  geotrack config init --force");
            }
            CliError::LoggingInit(_) => {
                eprintln!();
                eprintln!("Check that the [logging] file path in the config is writable.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Signal(msg) => write!(f, "Failed to set signal handler: {}", msg),
            CliError::Tracking(e) => write!(f, "Tracking controller error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Tracking(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<TrackingError> for CliError {
    fn from(e: TrackingError) -> Self {
        CliError::Tracking(e)
    }
}
