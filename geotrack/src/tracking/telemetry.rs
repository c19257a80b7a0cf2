//! Controller outputs: status, samples and telemetry events.
//!
//! The controller emits; it does not decide how anything is presented.
//! Three channels leave the controller task:
//!
//! - a `watch` channel carrying the latest [`TrackingStatus`]
//! - a `broadcast` channel of [`TaggedSample`]s for location consumers
//! - a `broadcast` channel of [`TrackingEvent`]s for observability

use std::time::Duration;

use tokio::sync::{broadcast, watch};

use super::error::{DeliveryErrorClass, PlatformError};
use super::permission::PermissionState;
use super::sample::TaggedSample;

/// Capacity of the sample and event broadcast channels.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 64;

/// Controller state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    /// Nothing running.
    #[default]
    Idle,
    /// Updates requested, waiting for the OS to confirm delivery.
    Starting,
    /// Delivery confirmed, watchdog armed.
    Active,
    /// Session torn down; waiting for permission or for teardown to finish.
    Suspended,
}

impl ControllerState {
    /// Returns true for `Starting` and `Active`.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Starting | Self::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Suspended => "suspended",
        }
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stop/restart cycle ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    Watchdog,
    Background,
    Foreground,
    /// The OS never acknowledged a start.
    StartTimeout,
}

/// Observability events emitted by the controller.
#[derive(Debug, Clone)]
pub enum TrackingEvent {
    /// State machine transition.
    StateChanged {
        from: ControllerState,
        to: ControllerState,
    },

    /// An authorization prompt was issued.
    AuthorizationRequested,

    /// The update stream was stopped; the restart is scheduled.
    RestartCycleStarted { cycle: u64, reason: RestartReason },

    /// The update stream was restarted.
    RestartCycleCompleted { cycle: u64, reason: RestartReason },

    /// A pending restart was cancelled before it ran.
    RestartCycleCancelled { cycle: u64 },

    /// No sample for longer than the stall threshold.
    StallDetected { since_last_sample: Duration },

    /// A delivery error and how it was classified.
    DeliveryError {
        error: PlatformError,
        class: DeliveryErrorClass,
    },

    /// A sample the filter dropped.
    SampleRejected,

    /// No delivery acknowledgement within the start timeout.
    StartTimedOut { attempt: u64 },
}

/// Snapshot of controller status for the command interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackingStatus {
    pub state: ControllerState,
    pub intent: bool,
    pub permission: PermissionState,
    pub samples_accepted: u64,
}

/// Sending halves of the controller outputs.
pub struct TrackingOutputs {
    status_tx: watch::Sender<TrackingStatus>,
    samples_tx: broadcast::Sender<TaggedSample>,
    events_tx: broadcast::Sender<TrackingEvent>,
}

impl Default for TrackingOutputs {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

impl TrackingOutputs {
    /// Create outputs with the given broadcast capacity.
    pub fn new(capacity: usize) -> Self {
        let (status_tx, _) = watch::channel(TrackingStatus::default());
        let (samples_tx, _) = broadcast::channel(capacity);
        let (events_tx, _) = broadcast::channel(capacity);
        Self {
            status_tx,
            samples_tx,
            events_tx,
        }
    }

    /// Replace the published status if it changed.
    pub fn publish_status(&self, status: TrackingStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    /// Forward a sample to consumers. Having no consumers is fine.
    pub fn publish_sample(&self, sample: TaggedSample) {
        let _ = self.samples_tx.send(sample);
    }

    /// Emit a telemetry event. Having no listeners is fine.
    pub fn emit(&self, event: TrackingEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Current published status.
    pub fn status(&self) -> TrackingStatus {
        *self.status_tx.borrow()
    }

    /// Receiver for status updates.
    pub fn watch_status(&self) -> watch::Receiver<TrackingStatus> {
        self.status_tx.subscribe()
    }

    /// Sender used to subscribe to samples.
    pub fn samples_sender(&self) -> broadcast::Sender<TaggedSample> {
        self.samples_tx.clone()
    }

    /// Sender used to subscribe to events.
    pub fn events_sender(&self) -> broadcast::Sender<TrackingEvent> {
        self.events_tx.clone()
    }
}
