//! Background tracking controller - the state machine.
//!
//! The controller owns the OS location subscription, the keep-alive
//! watchdog, the filter and the current [`TrackingSession`]. It is driven
//! exclusively through [`TrackingController::handle`], called from a single
//! task that drains the event queue, so no field is ever touched
//! concurrently.
//!
//! # States
//!
//! ```text
//!            start (authorized)          DeliveryStarted
//!   Idle ────────────────────> Starting ───────────────> Active
//!    ^  start (not authorized):    ^                       │
//!    │  request, stay Idle         │ permission restored   │ permission revoked
//!    │                             │ (intent kept)         │ or stop
//!    │   teardown acknowledged     │                       v
//!    └──────────────────────── Suspended <─────────────────┘
//! ```
//!
//! An explicit stop clears tracking intent and, when an OS subscription was
//! live, passes through `Suspended` until every `stop_updates` has been
//! acknowledged. A permission loss keeps intent so the session restarts on
//! its own when access returns.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::config::TrackingConfig;
use super::error::{DeliveryErrorClass, PlatformError, TrackingError};
use super::event::{Command, ControllerEvent, EventSink, LifecycleTransition};
use super::filter::{FilterDecision, LocationFilter};
use super::permission::{PermissionChange, PermissionState, PermissionTracker};
use super::platform::LocationPlatform;
use super::sample::{Confidence, LocationSample, TaggedSample};
use super::session::TrackingSession;
use super::telemetry::{
    ControllerState, RestartReason, TrackingEvent, TrackingOutputs, TrackingStatus,
};
use super::watchdog::KeepAliveWatchdog;

/// The deferred half of a stop/restart cycle.
struct PendingRestart {
    cycle: u64,
    reason: RestartReason,
    cancel: CancellationToken,
}

/// Background tracking state machine.
pub struct TrackingController<P: LocationPlatform> {
    platform: P,
    sink: EventSink,
    config: TrackingConfig,
    state: ControllerState,
    intent: bool,
    permission: PermissionTracker,
    filter: LocationFilter,
    watchdog: KeepAliveWatchdog,
    session: Option<TrackingSession>,
    pending_restart: Option<PendingRestart>,
    restart_sequence: u64,
    start_timeout: Option<CancellationToken>,
    start_attempt: u64,
    updates_running: bool,
    outstanding_stops: u32,
    idle_after_teardown: bool,
    significant_change_active: bool,
    samples_forwarded: u64,
    outputs: TrackingOutputs,
}

impl<P: LocationPlatform> TrackingController<P> {
    /// Create a controller in `Idle`.
    ///
    /// `sink` must feed the queue this controller is driven from; timers
    /// post their ticks through it.
    pub fn new(platform: P, sink: EventSink, config: TrackingConfig) -> Self {
        let config = config.normalized();
        let permission = PermissionTracker::new(platform.authorization_status());
        let outputs = TrackingOutputs::new(config.broadcast_capacity);
        let watchdog = KeepAliveWatchdog::new(config.watchdog_interval, config.stall_threshold);
        let filter = LocationFilter::new(config.low_accuracy_threshold_m);

        let controller = Self {
            platform,
            sink,
            config,
            state: ControllerState::Idle,
            intent: false,
            permission,
            filter,
            watchdog,
            session: None,
            pending_restart: None,
            restart_sequence: 0,
            start_timeout: None,
            start_attempt: 0,
            updates_running: false,
            outstanding_stops: 0,
            idle_after_teardown: false,
            significant_change_active: false,
            samples_forwarded: 0,
            outputs,
        };
        controller.publish_status();
        controller
    }

    /// Process one event.
    pub fn handle(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Command(Command::Start) => self.start(),
            ControllerEvent::Command(Command::Stop) => self.stop(),
            ControllerEvent::Lifecycle(LifecycleTransition::EnteredBackground) => {
                self.on_background()
            }
            ControllerEvent::Lifecycle(LifecycleTransition::EnteringForeground) => {
                self.on_foreground()
            }
            ControllerEvent::AuthorizationChanged(state) => self.on_authorization_changed(state),
            ControllerEvent::ServicesAvailabilityChanged(enabled) => {
                self.on_services_changed(enabled)
            }
            ControllerEvent::DeliveryStarted => self.on_delivery_started(),
            ControllerEvent::DeliveryStopped => self.on_delivery_stopped(),
            ControllerEvent::SampleDelivered(sample) => self.on_sample_delivered(sample),
            ControllerEvent::DeliveryError(error) => self.on_delivery_error(error),
            ControllerEvent::WatchdogTick { generation } => self.on_watchdog_tick(generation),
            ControllerEvent::RestartDue { cycle } => self.on_restart_due(cycle),
            ControllerEvent::StartTimeout { attempt } => self.on_start_timeout(attempt),
        }
        self.publish_status();
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Whether tracking has been requested and not cancelled.
    pub fn intent(&self) -> bool {
        self.intent
    }

    pub fn permission(&self) -> PermissionState {
        self.permission.current_state()
    }

    pub fn session(&self) -> Option<&TrackingSession> {
        self.session.as_ref()
    }

    pub fn watchdog_armed(&self) -> bool {
        self.watchdog.is_armed()
    }

    /// Shared gauge of armed keep-alive timers.
    pub fn armed_watchdogs(&self) -> Arc<AtomicUsize> {
        self.watchdog.armed_gauge()
    }

    pub fn restart_pending(&self) -> bool {
        self.pending_restart.is_some()
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn outputs(&self) -> &TrackingOutputs {
        &self.outputs
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Request tracking. A no-op while running, apart from re-validating
    /// permission.
    pub fn start(&mut self) {
        let was_running = self.state.is_running();
        info!(state = %self.state, "Background tracking start requested");

        self.intent = true;
        self.idle_after_teardown = false;
        self.refresh_authorization();

        if was_running || self.state.is_running() {
            debug!(state = %self.state, "Tracking already running");
            return;
        }

        self.try_begin();
    }

    /// Cancel tracking. Safe in any state.
    pub fn stop(&mut self) {
        info!(state = %self.state, "Background tracking stop requested");

        self.intent = false;
        self.teardown_session();

        if self.outstanding_stops > 0 {
            self.idle_after_teardown = true;
            self.set_state(ControllerState::Suspended);
        } else {
            self.idle_after_teardown = false;
            self.set_state(ControllerState::Idle);
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// App entered the background: pre-empt suspension with a restart cycle.
    pub fn on_background(&mut self) {
        if self.state == ControllerState::Active {
            info!("Entered background, restarting update stream");
            self.begin_restart_cycle(RestartReason::Background);
        } else {
            debug!(state = %self.state, "Entered background");
        }
    }

    /// App is entering the foreground: re-validate and resume if needed.
    pub fn on_foreground(&mut self) {
        debug!(state = %self.state, "Entering foreground");
        self.refresh_authorization();

        match self.state {
            ControllerState::Active => {
                let now = Instant::now();
                let stalled = self.session.as_ref().is_some_and(|session| {
                    session.time_since_last_sample(now) > self.config.stall_threshold
                });
                let stream_down = !self.updates_running && self.pending_restart.is_none();

                if stalled || stream_down {
                    info!(stalled, stream_down, "Delivery stopped while in background, resuming");
                    self.begin_restart_cycle(RestartReason::Foreground);
                }
            }
            ControllerState::Starting => {}
            ControllerState::Idle | ControllerState::Suspended => {
                if self.intent && self.permission.current_state().is_authorized() {
                    self.try_begin();
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // OS callbacks
    // -------------------------------------------------------------------------

    fn on_authorization_changed(&mut self, new_state: PermissionState) {
        let previous = self.permission.current_state();

        match self.permission.on_authorization_changed(new_state) {
            PermissionChange::Unchanged => {
                debug!(permission = %new_state, "Authorization unchanged");
            }
            PermissionChange::Granted => {
                info!(from = %previous, to = %new_state, "Location permission granted");
                if self.intent && !self.state.is_running() {
                    self.try_begin();
                }
            }
            PermissionChange::Revoked => {
                warn!(
                    from = %previous,
                    to = %new_state,
                    error = %TrackingError::PermissionDenied,
                    "Location permission revoked"
                );
                if self.state.is_running() || self.session.is_some() {
                    self.teardown_session();
                    self.set_state(ControllerState::Suspended);
                }
            }
            PermissionChange::Updated => {
                info!(from = %previous, to = %new_state, "Location permission changed");
                self.sync_significant_change();
                if self.intent && new_state.is_blocking() {
                    warn!(permission = %new_state, "Tracking blocked until permission is granted");
                }
            }
        }
    }

    fn on_services_changed(&mut self, enabled: bool) {
        if enabled {
            info!("Location services enabled");
            if self.intent && !self.state.is_running() {
                self.try_begin();
            } else if self.state.is_running()
                && !self.updates_running
                && self.pending_restart.is_none()
            {
                info!("Resuming update stream held back while services were off");
                self.resume_update_stream();
            }
        } else {
            warn!(
                error = %TrackingError::ServicesDisabled,
                state = %self.state,
                "Location services switched off"
            );
        }
    }

    fn on_delivery_started(&mut self) {
        match self.state {
            ControllerState::Starting => {
                self.disarm_start_timeout();
                if let Some(session) = self.session.as_mut() {
                    session.activate();
                }
                self.watchdog.arm(self.sink.clone());
                self.set_state(ControllerState::Active);
            }
            ControllerState::Active => debug!("Update delivery resumed"),
            state => debug!(%state, "Ignoring delivery acknowledgement outside a session"),
        }
    }

    fn on_delivery_stopped(&mut self) {
        self.outstanding_stops = self.outstanding_stops.saturating_sub(1);

        if self.outstanding_stops == 0 && self.idle_after_teardown {
            self.idle_after_teardown = false;
            debug!("Update stream teardown acknowledged");
            self.set_state(ControllerState::Idle);
        }
    }

    fn on_sample_delivered(&mut self, sample: LocationSample) {
        // A fix is proof that delivery began, even if the ack is late
        if self.state == ControllerState::Starting {
            self.on_delivery_started();
        }

        let Some(session) = self.session.as_mut() else {
            debug!("Sample arrived outside a session, ignoring");
            return;
        };

        match self.filter.accept(&sample, session.last_sample()) {
            FilterDecision::Reject => {
                debug!("Redelivered fix dropped");
                self.outputs.emit(TrackingEvent::SampleRejected);
            }
            FilterDecision::Accept(confidence) => {
                session.record_sample(sample, Instant::now());
                self.samples_forwarded += 1;

                if confidence == Confidence::Low {
                    debug!(
                        accuracy_m = sample.horizontal_accuracy_meters(),
                        "Low-confidence sample forwarded"
                    );
                } else {
                    trace!(
                        lat = %format!("{:.5}", sample.latitude()),
                        lon = %format!("{:.5}", sample.longitude()),
                        "Sample forwarded"
                    );
                }

                self.outputs
                    .publish_sample(TaggedSample { sample, confidence });
            }
        }
    }

    fn on_delivery_error(&mut self, error: PlatformError) {
        let class = error.classify();
        self.outputs
            .emit(TrackingEvent::DeliveryError { error, class });

        match class {
            DeliveryErrorClass::PermissionRevoked => {
                warn!(%error, "Location delivery failed: permission revoked");
                self.on_authorization_changed(PermissionState::Denied);
            }
            DeliveryErrorClass::TransientNetworkOrSensor => {
                warn!(
                    error = %TrackingError::TransientDelivery(error.to_string()),
                    "Location delivery error, keep-alive restart will recover"
                );
            }
            DeliveryErrorClass::Unknown => {
                warn!(%error, "Unclassified location delivery error");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Keep-alive
    // -------------------------------------------------------------------------

    fn on_watchdog_tick(&mut self, generation: u64) {
        if !self.watchdog.is_current(generation) {
            debug!(generation, "Ignoring tick from a cancelled watchdog");
            return;
        }

        if !self.intent {
            debug!("Tracking intent cleared, keep-alive watchdog exiting");
            self.watchdog.disarm();
            return;
        }

        if self.state != ControllerState::Active {
            return;
        }

        if let Some(session) = self.session.as_ref() {
            let since_last_sample = session.time_since_last_sample(Instant::now());
            if let Some(elapsed) = self.watchdog.assess(since_last_sample) {
                self.outputs.emit(TrackingEvent::StallDetected {
                    since_last_sample: elapsed,
                });
            }
        }

        if !self.permission.current_state().is_authorized() {
            debug!(permission = %self.permission.current_state(), "Keep-alive skipped: not authorized");
            return;
        }

        if !self.platform.location_services_enabled() {
            warn!(
                error = %TrackingError::ServicesDisabled,
                "Keep-alive skipped, no corrective action taken"
            );
            return;
        }

        self.begin_restart_cycle(RestartReason::Watchdog);
    }

    /// Stop the stream now and schedule the restart after the delay.
    fn begin_restart_cycle(&mut self, reason: RestartReason) {
        if self.pending_restart.is_some() {
            debug!(?reason, "Restart already pending");
            return;
        }

        if self.updates_running {
            self.stop_update_stream();
        }

        self.restart_sequence += 1;
        let cycle = self.restart_sequence;
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let sink = self.sink.clone();
        let delay = self.config.restart_delay;

        tokio::spawn(async move {
            tokio::select! {
                biased;

                _ = token.cancelled() => {}

                _ = tokio::time::sleep(delay) => {
                    sink.post(ControllerEvent::RestartDue { cycle });
                }
            }
        });

        self.pending_restart = Some(PendingRestart {
            cycle,
            reason,
            cancel,
        });

        info!(
            cycle,
            ?reason,
            delay_ms = delay.as_millis() as u64,
            "Update stream stopped, restart scheduled"
        );
        self.outputs
            .emit(TrackingEvent::RestartCycleStarted { cycle, reason });
    }

    fn on_restart_due(&mut self, cycle: u64) {
        let pending = match self.pending_restart.take() {
            Some(pending) if pending.cycle == cycle => pending,
            other => {
                self.pending_restart = other;
                debug!(cycle, "Ignoring stale restart");
                return;
            }
        };

        if !self.state.is_running()
            || !self.intent
            || !self.permission.current_state().is_authorized()
        {
            debug!(cycle, state = %self.state, "Restart skipped, session no longer active");
            return;
        }

        if !self.platform.location_services_enabled() {
            warn!(
                cycle,
                error = %TrackingError::ServicesDisabled,
                "Restart held back until location services return"
            );
            return;
        }

        self.resume_update_stream();

        info!(cycle, reason = ?pending.reason, "Update stream restarted");
        self.outputs.emit(TrackingEvent::RestartCycleCompleted {
            cycle,
            reason: pending.reason,
        });
    }

    /// Restart the OS stream inside the current session.
    fn resume_update_stream(&mut self) {
        self.platform.start_updates(&self.config.update_options);
        self.updates_running = true;

        if self.state == ControllerState::Starting {
            self.arm_start_timeout();
        }
    }

    fn on_start_timeout(&mut self, attempt: u64) {
        if attempt != self.start_attempt
            || self.start_timeout.is_none()
            || self.state != ControllerState::Starting
        {
            debug!(attempt, "Ignoring stale start timeout");
            return;
        }
        self.start_timeout = None;

        warn!(
            attempt,
            timeout_secs = self.config.start_timeout.as_secs(),
            "Location delivery never acknowledged, retrying start"
        );
        self.outputs.emit(TrackingEvent::StartTimedOut { attempt });
        self.begin_restart_cycle(RestartReason::StartTimeout);
    }

    /// One-shot timer covering the wait for `DeliveryStarted`.
    fn arm_start_timeout(&mut self) {
        self.disarm_start_timeout();

        self.start_attempt += 1;
        let attempt = self.start_attempt;
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let sink = self.sink.clone();
        let timeout = self.config.start_timeout;

        tokio::spawn(async move {
            tokio::select! {
                biased;

                _ = token.cancelled() => {}

                _ = tokio::time::sleep(timeout) => {
                    sink.post(ControllerEvent::StartTimeout { attempt });
                }
            }
        });

        self.start_timeout = Some(cancel);
    }

    fn disarm_start_timeout(&mut self) {
        if let Some(token) = self.start_timeout.take() {
            token.cancel();
        }
    }

    fn cancel_pending_restart(&mut self) {
        if let Some(pending) = self.pending_restart.take() {
            pending.cancel.cancel();
            debug!(cycle = pending.cycle, "Pending restart cancelled");
            self.outputs.emit(TrackingEvent::RestartCycleCancelled {
                cycle: pending.cycle,
            });
        }
    }

    // -------------------------------------------------------------------------
    // Session management
    // -------------------------------------------------------------------------

    /// Start a session if permission and services allow, otherwise record
    /// why not (and prompt if permission is missing).
    fn try_begin(&mut self) {
        let permission = self.permission.current_state();

        if !permission.is_authorized() {
            if permission.is_blocking() {
                warn!(
                    %permission,
                    error = %TrackingError::PermissionDenied,
                    "Tracking blocked until permission is granted"
                );
            }
            self.request_authorization();
            return;
        }

        if !self.platform.location_services_enabled() {
            warn!(
                error = %TrackingError::ServicesDisabled,
                "Tracking blocked until location services are enabled"
            );
            return;
        }

        self.begin_session();
    }

    fn begin_session(&mut self) {
        self.cancel_pending_restart();
        self.watchdog.disarm();

        self.session = Some(TrackingSession::new(Instant::now()));
        self.platform.start_updates(&self.config.update_options);
        self.updates_running = true;
        self.sync_significant_change();

        self.set_state(ControllerState::Starting);
        self.arm_start_timeout();
    }

    /// Disarm timers, stop the OS stream and drop the session.
    fn teardown_session(&mut self) {
        self.watchdog.disarm();
        self.disarm_start_timeout();
        self.cancel_pending_restart();

        if self.updates_running {
            self.stop_update_stream();
        }

        if self.session.take().is_some() {
            debug!("Tracking session dropped");
        }
        self.sync_significant_change();
    }

    fn stop_update_stream(&mut self) {
        self.platform.stop_updates();
        self.updates_running = false;
        self.outstanding_stops += 1;
    }

    fn request_authorization(&mut self) {
        if !self.permission.should_request() {
            debug!("Authorization prompt already outstanding");
            return;
        }

        self.permission.mark_requested();
        info!(permission = %self.permission.current_state(), "Requesting location authorization");
        self.platform.request_authorization();
        self.outputs.emit(TrackingEvent::AuthorizationRequested);
    }

    /// Run significant-change monitoring exactly when a session exists
    /// under `Always` permission with the fallback enabled.
    fn sync_significant_change(&mut self) {
        let wanted = self.config.significant_change_fallback
            && self.session.is_some()
            && self.permission.current_state() == PermissionState::Always;

        match (wanted, self.significant_change_active) {
            (true, false) => {
                self.platform.start_significant_change_monitoring();
                self.significant_change_active = true;
                debug!("Significant-change monitoring started");
            }
            (false, true) => {
                self.platform.stop_significant_change_monitoring();
                self.significant_change_active = false;
                debug!("Significant-change monitoring stopped");
            }
            _ => {}
        }
    }

    /// Pull the OS's point-in-time status and apply it if it drifted.
    fn refresh_authorization(&mut self) {
        let reported = self.platform.authorization_status();
        if reported != self.permission.current_state() {
            debug!(
                tracked = %self.permission.current_state(),
                reported = %reported,
                "Authorization drifted from last callback"
            );
            self.on_authorization_changed(reported);
        }
    }

    fn set_state(&mut self, new_state: ControllerState) {
        if self.state == new_state {
            return;
        }

        let from = std::mem::replace(&mut self.state, new_state);
        info!(from = %from, to = %new_state, "Tracking state changed");
        self.outputs.emit(TrackingEvent::StateChanged {
            from,
            to: new_state,
        });
        self.publish_status();
    }

    fn publish_status(&self) {
        self.outputs.publish_status(TrackingStatus {
            state: self.state,
            intent: self.intent,
            permission: self.permission.current_state(),
            samples_accepted: self.samples_forwarded,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimulatedPlatform;
    use crate::tracking::event::event_channel;
    use crate::tracking::platform::LocationUpdates;
    use chrono::Utc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::sync::mpsc;

    type Queue = mpsc::UnboundedReceiver<ControllerEvent>;

    fn controller_with(
        permission: PermissionState,
    ) -> (TrackingController<SimulatedPlatform>, Queue, SimulatedPlatform) {
        let platform = SimulatedPlatform::with_authorization(permission);
        let (sink, rx) = event_channel();
        platform.set_event_sink(sink.clone());
        let controller = TrackingController::new(platform.clone(), sink, TrackingConfig::default());
        (controller, rx, platform)
    }

    /// Feed every queued event back into the controller.
    fn pump(controller: &mut TrackingController<SimulatedPlatform>, rx: &mut Queue) {
        while let Ok(event) = rx.try_recv() {
            controller.handle(event);
        }
    }

    fn sample(accuracy: f64) -> LocationSample {
        LocationSample::new(41.0082, 28.9784, accuracy, 1.3, Utc::now())
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_reaches_active() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::WhenInUse);

        controller.handle(ControllerEvent::Command(Command::Start));
        assert_eq!(controller.state(), ControllerState::Starting);
        assert!(!controller.watchdog_armed());

        pump(&mut controller, &mut rx);
        assert_eq!(controller.state(), ControllerState::Active);
        assert!(controller.watchdog_armed());
        assert!(controller.session().is_some_and(|s| s.is_active()));
        assert_eq!(platform.calls().start_updates, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::Always);

        controller.start();
        pump(&mut controller, &mut rx);
        controller.start();
        controller.start();
        pump(&mut controller, &mut rx);

        assert_eq!(controller.state(), ControllerState::Active);
        assert_eq!(platform.calls().start_updates, 1);
        assert_eq!(controller.armed_watchdogs().load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_denied_requests_once_and_stays_idle() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::Denied);

        controller.start();
        pump(&mut controller, &mut rx);

        assert_eq!(controller.state(), ControllerState::Idle);
        assert!(controller.intent());
        assert_eq!(platform.calls().authorization_requests, 1);
        assert_eq!(platform.calls().start_updates, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grant_promotes_without_second_start() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::Undetermined);
        platform.set_authorization_response(PermissionState::WhenInUse);

        controller.start();
        assert_eq!(controller.state(), ControllerState::Idle);

        pump(&mut controller, &mut rx);
        assert_eq!(controller.state(), ControllerState::Active);
        assert_eq!(controller.permission(), PermissionState::WhenInUse);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoke_suspends_and_restore_resumes() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::Always);
        controller.start();
        pump(&mut controller, &mut rx);

        controller.handle(ControllerEvent::AuthorizationChanged(PermissionState::Denied));
        assert_eq!(controller.state(), ControllerState::Suspended);
        assert!(controller.intent(), "Intent is blocked, not cancelled");
        assert!(!controller.watchdog_armed());
        assert!(controller.session().is_none());
        assert_eq!(platform.calls().stop_updates, 1);

        pump(&mut controller, &mut rx);
        assert_eq!(controller.state(), ControllerState::Suspended);

        controller.handle(ControllerEvent::AuthorizationChanged(PermissionState::WhenInUse));
        pump(&mut controller, &mut rx);
        assert_eq!(controller.state(), ControllerState::Active);
        assert_eq!(platform.calls().start_updates, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_teardown_ack() {
        let (mut controller, mut rx, _platform) = controller_with(PermissionState::WhenInUse);
        controller.start();
        pump(&mut controller, &mut rx);

        controller.stop();
        assert_eq!(controller.state(), ControllerState::Suspended);
        assert!(!controller.intent());
        assert!(!controller.watchdog_armed());

        pump(&mut controller, &mut rx);
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_idle_is_safe() {
        let (mut controller, _rx, platform) = controller_with(PermissionState::WhenInUse);
        controller.stop();
        controller.stop();
        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(platform.calls().stop_updates, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_restart() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::WhenInUse);
        controller.start();
        pump(&mut controller, &mut rx);

        controller.on_background();
        assert!(controller.restart_pending());
        controller.stop();
        assert!(!controller.restart_pending());

        tokio::time::sleep(Duration::from_secs(1)).await;
        pump(&mut controller, &mut rx);

        assert_eq!(platform.calls().start_updates, 1, "No resurrected stream");
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_restart_due_ignored() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::WhenInUse);
        controller.start();
        pump(&mut controller, &mut rx);

        controller.on_background();
        controller.stop();
        controller.handle(ControllerEvent::RestartDue { cycle: 1 });

        assert_eq!(platform.calls().start_updates, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_watchdog_tick_ignored() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::WhenInUse);
        controller.start();
        pump(&mut controller, &mut rx);

        controller.handle(ControllerEvent::WatchdogTick { generation: 999 });
        assert!(!controller.restart_pending());
        assert_eq!(platform.calls().stop_updates, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_restart_cycle() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::WhenInUse);
        controller.start();
        pump(&mut controller, &mut rx);

        controller.handle(ControllerEvent::Lifecycle(
            LifecycleTransition::EnteredBackground,
        ));
        assert_eq!(platform.calls().stop_updates, 1);

        tokio::time::sleep(Duration::from_millis(499)).await;
        pump(&mut controller, &mut rx);
        assert_eq!(platform.calls().start_updates, 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        pump(&mut controller, &mut rx);
        assert_eq!(platform.calls().start_updates, 2);
        assert_eq!(controller.state(), ControllerState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_held_back_while_services_off() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::WhenInUse);
        controller.start();
        pump(&mut controller, &mut rx);

        controller.on_background();
        platform.set_services_enabled(false);
        pump(&mut controller, &mut rx);

        tokio::time::sleep(Duration::from_millis(600)).await;
        pump(&mut controller, &mut rx);
        assert_eq!(platform.calls().start_updates, 1);
        assert!(!platform.is_delivering());
        assert!(!controller.restart_pending());
        assert_eq!(controller.state(), ControllerState::Active);

        platform.set_services_enabled(true);
        pump(&mut controller, &mut rx);
        assert_eq!(platform.calls().start_updates, 2);
        assert!(platform.is_delivering());
        assert_eq!(controller.state(), ControllerState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_when_idle_does_nothing() {
        let (mut controller, _rx, platform) = controller_with(PermissionState::WhenInUse);
        controller.on_background();
        assert!(!controller.restart_pending());
        assert_eq!(platform.calls().stop_updates, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_accuracy_sample_forwarded() {
        let (mut controller, mut rx, _platform) = controller_with(PermissionState::WhenInUse);
        let mut samples = controller.outputs().samples_sender().subscribe();
        controller.start();
        pump(&mut controller, &mut rx);

        controller.handle(ControllerEvent::SampleDelivered(sample(150.0)));

        let tagged = samples.try_recv().expect("sample forwarded");
        assert!(tagged.is_low_confidence());
        assert_eq!(tagged.sample.horizontal_accuracy_meters(), 150.0);
        assert_eq!(controller.session().map(|s| s.samples_accepted()), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_redelivered_fix_not_forwarded_twice() {
        let (mut controller, mut rx, _platform) = controller_with(PermissionState::WhenInUse);
        let mut samples = controller.outputs().samples_sender().subscribe();
        controller.start();
        pump(&mut controller, &mut rx);

        let fix = sample(10.0);
        controller.handle(ControllerEvent::SampleDelivered(fix));
        controller.handle(ControllerEvent::SampleDelivered(fix));

        assert!(samples.try_recv().is_ok());
        assert!(samples.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_outside_session_ignored() {
        let (mut controller, _rx, _platform) = controller_with(PermissionState::WhenInUse);
        let mut samples = controller.outputs().samples_sender().subscribe();

        controller.handle(ControllerEvent::SampleDelivered(sample(10.0)));
        assert!(samples.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_keeps_state() {
        let (mut controller, mut rx, _platform) = controller_with(PermissionState::WhenInUse);
        controller.start();
        pump(&mut controller, &mut rx);

        controller.handle(ControllerEvent::DeliveryError(PlatformError::Network));
        controller.handle(ControllerEvent::DeliveryError(PlatformError::Other(42)));
        assert_eq!(controller.state(), ControllerState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_error_suspends() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::WhenInUse);
        controller.start();
        pump(&mut controller, &mut rx);

        controller.handle(ControllerEvent::DeliveryError(PlatformError::Denied));
        assert_eq!(controller.state(), ControllerState::Suspended);
        assert_eq!(controller.permission(), PermissionState::Denied);
        assert_eq!(platform.calls().stop_updates, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_significant_change_follows_always_permission() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::Always);
        controller.start();
        pump(&mut controller, &mut rx);
        assert_eq!(platform.calls().significant_change_starts, 1);

        controller.handle(ControllerEvent::AuthorizationChanged(PermissionState::WhenInUse));
        assert_eq!(platform.calls().significant_change_stops, 1);
        assert_eq!(controller.state(), ControllerState::Active);

        controller.handle(ControllerEvent::AuthorizationChanged(PermissionState::Always));
        assert_eq!(platform.calls().significant_change_starts, 2);

        controller.stop();
        assert_eq!(platform.calls().significant_change_stops, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_services_disabled_blocks_start_until_enabled() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::WhenInUse);
        platform.set_services_enabled(false);
        pump(&mut controller, &mut rx);

        controller.start();
        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(platform.calls().start_updates, 0);

        platform.set_services_enabled(true);
        pump(&mut controller, &mut rx);
        assert_eq!(controller.state(), ControllerState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_resumes_after_stall() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::WhenInUse);
        controller.start();
        pump(&mut controller, &mut rx);
        controller.watchdog.disarm();

        tokio::time::sleep(Duration::from_secs(61)).await;
        controller.on_foreground();
        assert!(controller.restart_pending());

        tokio::time::sleep(Duration::from_millis(600)).await;
        pump(&mut controller, &mut rx);
        assert_eq!(platform.calls().start_updates, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_picks_up_missed_grant() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::Denied);
        controller.start();
        pump(&mut controller, &mut rx);
        assert_eq!(controller.state(), ControllerState::Idle);

        platform.set_authorization_silently(PermissionState::WhenInUse);
        controller.handle(ControllerEvent::Lifecycle(
            LifecycleTransition::EnteringForeground,
        ));
        assert_eq!(controller.state(), ControllerState::Starting);

        pump(&mut controller, &mut rx);
        assert_eq!(controller.state(), ControllerState::Active);
        assert_eq!(controller.permission(), PermissionState::WhenInUse);
        assert_eq!(platform.calls().start_updates, 1);
        assert_eq!(platform.calls().authorization_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_without_intent_stays_idle() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::WhenInUse);
        controller.on_foreground();
        pump(&mut controller, &mut rx);

        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(platform.calls().start_updates, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_start_retries() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::WhenInUse);
        let mut events = controller.outputs().events_sender().subscribe();
        platform.withhold_start_acks(true);

        controller.start();
        pump(&mut controller, &mut rx);
        assert_eq!(controller.state(), ControllerState::Starting);
        assert!(!controller.watchdog_armed());

        tokio::time::sleep(Duration::from_millis(10_100)).await;
        pump(&mut controller, &mut rx);
        assert_eq!(platform.calls().stop_updates, 1);
        assert!(controller.restart_pending());

        tokio::time::sleep(Duration::from_millis(600)).await;
        pump(&mut controller, &mut rx);
        assert_eq!(platform.calls().start_updates, 2);
        assert_eq!(controller.state(), ControllerState::Starting);

        controller.handle(ControllerEvent::DeliveryStarted);
        assert_eq!(controller.state(), ControllerState::Active);
        assert!(controller.watchdog_armed());

        let mut timed_out = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, TrackingEvent::StartTimedOut { attempt: 1 }) {
                timed_out += 1;
            }
        }
        assert_eq!(timed_out, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledged_start_cancels_timeout() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::WhenInUse);
        controller.start();
        pump(&mut controller, &mut rx);

        tokio::time::sleep(Duration::from_secs(11)).await;
        pump(&mut controller, &mut rx);
        assert_eq!(platform.calls().stop_updates, 0);
        assert!(!controller.restart_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_start_timeout() {
        let (mut controller, mut rx, platform) = controller_with(PermissionState::WhenInUse);
        platform.withhold_start_acks(true);
        controller.start();
        controller.stop();

        tokio::time::sleep(Duration::from_secs(11)).await;
        pump(&mut controller, &mut rx);
        controller.handle(ControllerEvent::StartTimeout { attempt: 1 });

        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(platform.calls().start_updates, 1);
        assert!(!controller.restart_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unusable_config_values_normalized() {
        let platform = SimulatedPlatform::with_authorization(PermissionState::WhenInUse);
        let (sink, mut rx) = event_channel();
        platform.set_event_sink(sink.clone());
        let config = TrackingConfig {
            watchdog_interval: Duration::ZERO,
            broadcast_capacity: 0,
            ..Default::default()
        };
        let mut controller = TrackingController::new(platform, sink, config);

        controller.start();
        pump(&mut controller, &mut rx);
        assert_eq!(controller.state(), ControllerState::Active);
        assert!(controller.watchdog_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_published() {
        let (mut controller, mut rx, _platform) = controller_with(PermissionState::WhenInUse);
        let status_rx = controller.outputs().watch_status();

        controller.start();
        pump(&mut controller, &mut rx);
        controller.handle(ControllerEvent::SampleDelivered(sample(5.0)));

        let status = *status_rx.borrow();
        assert_eq!(status.state, ControllerState::Active);
        assert!(status.intent);
        assert_eq!(status.permission, PermissionState::WhenInUse);
        assert_eq!(status.samples_accepted, 1);
    }
}
