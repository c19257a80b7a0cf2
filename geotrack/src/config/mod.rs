//! User configuration for geotrack.
//!
//! Settings live in `~/.geotrack/config.ini`. A missing file means
//! defaults; a present file is overlaid onto the defaults key by key.
//!
//! # Example
//!
//! ```ignore
//! use geotrack::config::ConfigFile;
//! use geotrack::tracking::TrackingConfig;
//!
//! let config = ConfigFile::load()?;
//! let tracking = TrackingConfig::from(&config.tracking);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{ConfigFile, LoggingSettings, SimulationSettings, TrackingSettings};
