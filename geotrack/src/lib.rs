//! geotrack - background location tracking for a mobile fitness app
//!
//! The core is a tracking controller that keeps a location subscription
//! alive while the app is backgrounded, follows the user's location
//! permission, and restarts delivery when the OS silently stops it.
//!
//! # High-Level API
//!
//! ```ignore
//! use geotrack::channel::{MethodCall, MethodChannels, LOCATION_CHANNEL};
//! use geotrack::tracking::{TrackingConfig, TrackingService};
//!
//! let (handle, _task) = TrackingService::spawn(platform, TrackingConfig::default());
//! let channels = MethodChannels::new(handle.clone(), health_bridge);
//!
//! channels
//!     .invoke(LOCATION_CHANNEL, &MethodCall::new("enableBackgroundLocationTracking"))
//!     .await;
//! ```

pub mod channel;
pub mod config;
pub mod health;
pub mod logging;
pub mod simulation;
pub mod tracking;

/// Version of the geotrack library and CLI.
///
/// Synchronized across the workspace and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
