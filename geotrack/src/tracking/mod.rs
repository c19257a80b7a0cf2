//! Background location tracking.
//!
//! Keeps a location subscription alive while the app moves between
//! foreground and background, follows the user's location permission, and
//! restarts delivery when the OS silently stops it.
//!
//! # Architecture
//!
//! ```text
//! TrackingHandle ──┐
//! LifecycleBridge ─┼──> EventSink ──> [ controller task ] ──> watch<TrackingStatus>
//! LocationPlatform ┘        ^                 │          ──> broadcast<TaggedSample>
//!                           │                 │          ──> broadcast<TrackingEvent>
//!           watchdog ticks, restart timers <──┘
//! ```
//!
//! Everything asynchronous is an event on one queue. The controller task
//! is the only owner of the session, the watchdog and the OS subscription.
//!
//! # Usage
//!
//! ```ignore
//! use geotrack::simulation::SimulatedPlatform;
//! use geotrack::tracking::{ControllerState, TrackingConfig, TrackingService};
//!
//! let platform = SimulatedPlatform::new(Default::default());
//! let (handle, task) = TrackingService::spawn(platform, TrackingConfig::default());
//!
//! handle.enable_background_location_tracking();
//! handle.wait_for_state(ControllerState::Active).await?;
//!
//! let mut samples = handle.subscribe_samples();
//! while let Ok(tagged) = samples.recv().await {
//!     println!("{:?} {:?}", tagged.sample, tagged.confidence);
//! }
//! ```
//!
//! # Components
//!
//! - [`permission`] - `PermissionState` and `PermissionTracker`
//! - [`filter`] - `LocationFilter` (re-delivery rejection, low-accuracy tagging)
//! - [`watchdog`] - `KeepAliveWatchdog` keep-alive timer
//! - [`controller`] - `TrackingController` state machine
//! - [`lifecycle`] - `LifecycleBridge`
//! - [`service`] / [`handle`] - event loop and command interface

mod config;
pub mod controller;
mod error;
mod event;
pub mod filter;
pub mod handle;
pub mod lifecycle;
pub mod permission;
mod platform;
mod sample;
pub mod service;
mod session;
mod telemetry;
pub mod watchdog;

pub use config::TrackingConfig;
pub use controller::TrackingController;
pub use error::{DeliveryErrorClass, PlatformError, TrackingError};
pub use event::{event_channel, Command, ControllerEvent, EventSink, LifecycleTransition};
pub use filter::{FilterDecision, LocationFilter, DEFAULT_LOW_ACCURACY_THRESHOLD_M};
pub use handle::TrackingHandle;
pub use lifecycle::{AppLifecycleNotification, LifecycleBridge};
pub use permission::{PermissionChange, PermissionState, PermissionTracker};
pub use platform::{
    AuthorizationProvider, DesiredAccuracy, LocationPlatform, LocationUpdates, UpdateOptions,
    DEFAULT_DISTANCE_FILTER_M,
};
pub use sample::{Confidence, LocationSample, TaggedSample};
pub use service::TrackingService;
pub use session::TrackingSession;
pub use telemetry::{
    ControllerState, RestartReason, TrackingEvent, TrackingOutputs, TrackingStatus,
    DEFAULT_BROADCAST_CAPACITY,
};
pub use watchdog::{
    KeepAliveWatchdog, DEFAULT_RESTART_DELAY, DEFAULT_STALL_THRESHOLD, DEFAULT_START_TIMEOUT,
    DEFAULT_WATCHDOG_INTERVAL,
};
