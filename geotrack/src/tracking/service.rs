//! Controller event loop.
//!
//! [`TrackingService::spawn`] moves a [`TrackingController`] onto its own
//! task and returns the [`TrackingHandle`] used to command it. The task
//! drains the event queue until the handle requests shutdown.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::config::TrackingConfig;
use super::controller::TrackingController;
use super::event::{event_channel, ControllerEvent};
use super::handle::TrackingHandle;
use super::platform::LocationPlatform;

/// Spawns and runs the tracking controller.
pub struct TrackingService;

impl TrackingService {
    /// Start the controller task.
    ///
    /// Registers the controller's event sink with `platform`, so the
    /// platform must not be shared with another controller.
    pub fn spawn<P: LocationPlatform>(
        platform: P,
        config: TrackingConfig,
    ) -> (TrackingHandle, JoinHandle<()>) {
        let (sink, rx) = event_channel();
        platform.set_event_sink(sink.clone());

        let controller = TrackingController::new(platform, sink.clone(), config);
        let shutdown = CancellationToken::new();

        let handle = TrackingHandle::new(
            sink,
            controller.outputs().watch_status(),
            controller.outputs().samples_sender(),
            controller.outputs().events_sender(),
            controller.armed_watchdogs(),
            shutdown.clone(),
        );

        let task = tokio::spawn(run(controller, rx, shutdown));
        (handle, task)
    }
}

async fn run<P: LocationPlatform>(
    mut controller: TrackingController<P>,
    mut rx: mpsc::UnboundedReceiver<ControllerEvent>,
    shutdown: CancellationToken,
) {
    info!(permission = %controller.permission(), "Tracking controller started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                controller.stop();
                break;
            }

            event = rx.recv() => match event {
                Some(event) => controller.handle(event),
                None => break,
            },
        }
    }

    info!(state = %controller.state(), "Tracking controller stopped");
}
