//! Events posted into the controller's queue.
//!
//! Every asynchronous input (commands, OS callbacks, timers) becomes a
//! [`ControllerEvent`] and goes through one [`EventSink`]. The controller
//! task is the only reader, so no input ever touches controller state
//! directly.

use tokio::sync::mpsc;

use super::error::PlatformError;
use super::permission::PermissionState;
use super::sample::LocationSample;

/// Commands from the UI-facing interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
}

/// App lifecycle transitions the controller reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleTransition {
    EnteredBackground,
    EnteringForeground,
}

/// Everything the controller can be told.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// Start or stop requested by the command interface.
    Command(Command),

    /// Foreground/background transition from the lifecycle bridge.
    Lifecycle(LifecycleTransition),

    /// OS authorization callback.
    AuthorizationChanged(PermissionState),

    /// Device-wide location services switched on or off.
    ServicesAvailabilityChanged(bool),

    /// The OS confirmed that update delivery has begun.
    DeliveryStarted,

    /// The OS confirmed that an update stream was torn down.
    DeliveryStopped,

    /// A raw position fix.
    SampleDelivered(LocationSample),

    /// The OS reported a delivery failure.
    DeliveryError(PlatformError),

    /// Keep-alive timer fired.
    WatchdogTick { generation: u64 },

    /// The deferred half of a stop/restart cycle is due.
    RestartDue { cycle: u64 },

    /// A start went unacknowledged for the configured timeout.
    StartTimeout { attempt: u64 },
}

/// Sending side of the controller queue.
///
/// Cheap to clone; handed to the platform (as its delegate), the lifecycle
/// bridge, the command handle, and every timer the controller spawns.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ControllerEvent>,
}

/// Create a controller queue.
pub fn event_channel() -> (EventSink, mpsc::UnboundedReceiver<ControllerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, rx)
}

impl EventSink {
    /// Post an event. Returns false if the controller has shut down.
    pub fn post(&self, event: ControllerEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Whether the controller has shut down.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Post an authorization callback.
    pub fn authorization_changed(&self, state: PermissionState) -> bool {
        self.post(ControllerEvent::AuthorizationChanged(state))
    }

    /// Post a services availability change.
    pub fn services_availability_changed(&self, enabled: bool) -> bool {
        self.post(ControllerEvent::ServicesAvailabilityChanged(enabled))
    }

    /// Post a delivered sample.
    pub fn sample_delivered(&self, sample: LocationSample) -> bool {
        self.post(ControllerEvent::SampleDelivered(sample))
    }

    /// Post a delivery error.
    pub fn delivery_error(&self, error: PlatformError) -> bool {
        self.post(ControllerEvent::DeliveryError(error))
    }

    /// Acknowledge that delivery started.
    pub fn delivery_started(&self) -> bool {
        self.post(ControllerEvent::DeliveryStarted)
    }

    /// Acknowledge that an update stream stopped.
    pub fn delivery_stopped(&self) -> bool {
        self.post(ControllerEvent::DeliveryStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_post_and_receive() {
        let (sink, mut rx) = event_channel();
        assert!(sink.post(ControllerEvent::Command(Command::Start)));
        assert!(sink.delivery_started());

        assert!(matches!(
            rx.recv().await,
            Some(ControllerEvent::Command(Command::Start))
        ));
        assert!(matches!(rx.recv().await, Some(ControllerEvent::DeliveryStarted)));
    }

    #[test]
    fn test_post_after_close_fails() {
        let (sink, rx) = event_channel();
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.post(ControllerEvent::Command(Command::Stop)));
    }
}
