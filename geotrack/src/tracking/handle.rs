//! Command interface to a running tracking controller.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::TrackingError;
use super::event::{Command, ControllerEvent, EventSink};
use super::lifecycle::LifecycleBridge;
use super::sample::TaggedSample;
use super::telemetry::{ControllerState, TrackingEvent, TrackingStatus};

/// Cloneable handle to the controller task.
///
/// Every command returns an acknowledgement immediately: `true` when the
/// command was queued, `false` when the controller has shut down. The
/// command itself runs later on the controller task.
#[derive(Clone)]
pub struct TrackingHandle {
    sink: EventSink,
    status_rx: watch::Receiver<TrackingStatus>,
    samples_tx: broadcast::Sender<TaggedSample>,
    events_tx: broadcast::Sender<TrackingEvent>,
    armed_watchdogs: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl TrackingHandle {
    pub(crate) fn new(
        sink: EventSink,
        status_rx: watch::Receiver<TrackingStatus>,
        samples_tx: broadcast::Sender<TaggedSample>,
        events_tx: broadcast::Sender<TrackingEvent>,
        armed_watchdogs: Arc<AtomicUsize>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sink,
            status_rx,
            samples_tx,
            events_tx,
            armed_watchdogs,
            shutdown,
        }
    }

    /// Request background tracking.
    pub fn enable_background_location_tracking(&self) -> bool {
        self.send(Command::Start)
    }

    /// Cancel background tracking.
    pub fn disable_background_location_tracking(&self) -> bool {
        self.send(Command::Stop)
    }

    fn send(&self, command: Command) -> bool {
        if self.shutdown.is_cancelled() {
            debug!(?command, error = %TrackingError::ControllerUnavailable, "Command dropped");
            return false;
        }
        self.sink.post(ControllerEvent::Command(command))
    }

    /// Latest published status.
    pub fn status(&self) -> TrackingStatus {
        *self.status_rx.borrow()
    }

    pub fn state(&self) -> ControllerState {
        self.status().state
    }

    /// Receiver that is notified on every status change.
    pub fn watch_status(&self) -> watch::Receiver<TrackingStatus> {
        self.status_rx.clone()
    }

    /// Wait until the controller reports `target`.
    pub async fn wait_for_state(
        &self,
        target: ControllerState,
    ) -> Result<TrackingStatus, TrackingError> {
        let mut rx = self.status_rx.clone();
        rx.wait_for(|status| status.state == target)
            .await
            .map(|status| *status)
            .map_err(|_| TrackingError::ControllerUnavailable)
    }

    /// Subscribe to accepted, tagged samples.
    pub fn subscribe_samples(&self) -> broadcast::Receiver<TaggedSample> {
        self.samples_tx.subscribe()
    }

    /// Subscribe to controller telemetry.
    pub fn subscribe_events(&self) -> broadcast::Receiver<TrackingEvent> {
        self.events_tx.subscribe()
    }

    /// Number of keep-alive timers currently armed.
    pub fn armed_watchdogs(&self) -> usize {
        self.armed_watchdogs.load(Ordering::SeqCst)
    }

    /// Bridge for forwarding app lifecycle notifications.
    pub fn lifecycle_bridge(&self) -> LifecycleBridge {
        LifecycleBridge::new(self.sink.clone())
    }

    /// Sink the platform reports through.
    pub fn event_sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// Stop tracking and end the controller task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
