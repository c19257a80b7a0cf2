//! CLI command implementations.
//!
//! - [`config`] - Configuration management (path, list, init)
//! - [`simulate`] - Run the controller against a simulated device

pub mod config;
pub mod simulate;
