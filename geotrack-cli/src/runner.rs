//! CLI runner: config loading and logging setup shared by commands.

use tracing::info;

use geotrack::config::ConfigFile;
use geotrack::logging::{init_logging, LoggingGuard, LoggingOptions};

use crate::error::CliError;

/// Keeps logging alive for the duration of a command.
pub struct CliRunner {
    _logging_guard: LoggingGuard,
    config: ConfigFile,
}

impl CliRunner {
    /// Load the config file (defaults if missing) and start logging.
    pub fn with_debug(debug_mode: bool) -> Result<Self, CliError> {
        let config = ConfigFile::load()?;

        let options = LoggingOptions::new(&config.logging.file).with_debug(debug_mode);
        let logging_guard =
            init_logging(&options).map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            _logging_guard: logging_guard,
            config,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("geotrack v{}", geotrack::VERSION);
        info!("geotrack CLI: {} command", command);
        info!(log_file = %self.config.logging.file.display(), "Logging to file");
    }
}
