//! Simulated OS location platform.
//!
//! [`SimulatedPlatform`] implements the permission and location traits
//! without any OS underneath. It acknowledges start/stop immediately,
//! walks a straight track while updates run, answers the first
//! authorization prompt with a configured response, and counts every call.
//! The CLI `simulate` command and the integration tests drive the
//! controller with it.
//!
//! Two fault controls mimic what a real device does to a backgrounded app:
//!
//! - [`SimulatedPlatform::stall`] silently stops delivery. Restarting the
//!   update stream does not cure it; [`SimulatedPlatform::resume`] does.
//! - [`SimulatedPlatform::set_services_enabled`] toggles location services.
//!
//! [`SimulatedHealthStore`] plays the same role for the health store.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::SimulationSettings;
use crate::health::{HealthAuthorizationStatus, HealthDataKind, HealthError, HealthStore};
use crate::tracking::{
    AuthorizationProvider, ControllerEvent, EventSink, LocationSample, LocationUpdates,
    PermissionState, PlatformError, UpdateOptions,
};

/// Default delay between simulated fixes.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Settings for a [`SimulatedPlatform`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Authorization reported before any prompt.
    pub initial_authorization: PermissionState,

    /// What the simulated user answers when prompted.
    pub authorization_response: PermissionState,

    /// Whether location services start enabled.
    pub services_enabled: bool,

    /// Delay between fixes while updates run. `None` emits nothing.
    pub sample_interval: Option<Duration>,

    pub origin_latitude: f64,
    pub origin_longitude: f64,

    /// Direction of travel, degrees clockwise from north.
    pub heading_degrees: f64,

    pub speed_meters_per_second: f64,
    pub horizontal_accuracy_meters: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_authorization: PermissionState::Undetermined,
            authorization_response: PermissionState::WhenInUse,
            services_enabled: true,
            sample_interval: Some(DEFAULT_SAMPLE_INTERVAL),
            origin_latitude: 41.0082,
            origin_longitude: 28.9784,
            heading_degrees: 45.0,
            speed_meters_per_second: 2.8,
            horizontal_accuracy_meters: 8.0,
        }
    }
}

impl SimulationConfig {
    /// Build from the `[simulation]` settings section.
    pub fn from_settings(settings: &SimulationSettings, initial: PermissionState) -> Self {
        Self {
            initial_authorization: initial,
            authorization_response: settings.authorization_response,
            sample_interval: Some(Duration::from_millis(settings.sample_interval_ms)),
            ..Default::default()
        }
    }
}

/// Call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatedCalls {
    pub start_updates: u32,
    pub stop_updates: u32,
    pub authorization_requests: u32,
    pub significant_change_starts: u32,
    pub significant_change_stops: u32,
}

struct SimState {
    config: SimulationConfig,
    authorization: PermissionState,
    services_enabled: bool,
    sink: Option<EventSink>,
    calls: SimulatedCalls,
    delivering: bool,
    stalled: bool,
    acks_withheld: bool,
    significant_change: bool,
    emitter: Option<CancellationToken>,
    latitude: f64,
    longitude: f64,
}

impl SimState {
    fn post(&self, event: ControllerEvent) -> bool {
        match &self.sink {
            Some(sink) => sink.post(event),
            None => false,
        }
    }

    /// Advance along the track by one period and produce the fix.
    fn next_sample(&mut self, period: Duration) -> LocationSample {
        let distance = self.config.speed_meters_per_second * period.as_secs_f64();
        let heading = self.config.heading_degrees.to_radians();
        let meters_per_degree_lon = METERS_PER_DEGREE_LAT * self.latitude.to_radians().cos();

        self.latitude += distance * heading.cos() / METERS_PER_DEGREE_LAT;
        if meters_per_degree_lon > f64::EPSILON {
            self.longitude += distance * heading.sin() / meters_per_degree_lon;
        }

        LocationSample::new(
            self.latitude,
            self.longitude,
            self.config.horizontal_accuracy_meters,
            self.config.speed_meters_per_second,
            Utc::now(),
        )
    }

    fn cancel_emitter(&mut self) {
        if let Some(token) = self.emitter.take() {
            token.cancel();
        }
    }
}

/// In-process stand-in for the OS location and permission subsystems.
///
/// Cheap to clone; clones share state, so a test can keep one to drive
/// faults while the controller owns another.
#[derive(Clone)]
pub struct SimulatedPlatform {
    inner: Arc<Mutex<SimState>>,
}

impl SimulatedPlatform {
    pub fn new(config: SimulationConfig) -> Self {
        let state = SimState {
            authorization: config.initial_authorization,
            services_enabled: config.services_enabled,
            sink: None,
            calls: SimulatedCalls::default(),
            delivering: false,
            stalled: false,
            acks_withheld: false,
            significant_change: false,
            emitter: None,
            latitude: config.origin_latitude,
            longitude: config.origin_longitude,
            config,
        };
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// A silent platform (no emitted fixes) with the given authorization.
    pub fn with_authorization(authorization: PermissionState) -> Self {
        Self::new(SimulationConfig {
            initial_authorization: authorization,
            sample_interval: None,
            ..Default::default()
        })
    }

    pub fn calls(&self) -> SimulatedCalls {
        self.inner.lock().calls
    }

    /// Whether the fine-grained update stream is running.
    pub fn is_delivering(&self) -> bool {
        self.inner.lock().delivering
    }

    pub fn significant_change_active(&self) -> bool {
        self.inner.lock().significant_change
    }

    /// Change the answer given to future prompts.
    pub fn set_authorization_response(&self, response: PermissionState) {
        self.inner.lock().config.authorization_response = response;
    }

    /// Change authorization as if from the system settings.
    pub fn set_authorization(&self, authorization: PermissionState) -> bool {
        let mut state = self.inner.lock();
        state.authorization = authorization;
        debug!(%authorization, "Simulated authorization change");
        state.post(ControllerEvent::AuthorizationChanged(authorization))
    }

    /// Change authorization without a callback, as when the user changed
    /// settings while the app was suspended.
    pub fn set_authorization_silently(&self, authorization: PermissionState) {
        debug!(%authorization, "Simulated authorization change, callback lost");
        self.inner.lock().authorization = authorization;
    }

    /// Toggle device-wide location services.
    pub fn set_services_enabled(&self, enabled: bool) -> bool {
        let mut state = self.inner.lock();
        state.services_enabled = enabled;
        debug!(enabled, "Simulated location services change");
        state.post(ControllerEvent::ServicesAvailabilityChanged(enabled))
    }

    /// Silently stop delivering fixes.
    pub fn stall(&self) {
        debug!("Simulated delivery stall");
        self.inner.lock().stalled = true;
    }

    /// Undo [`stall`](Self::stall).
    pub fn resume(&self) {
        self.inner.lock().stalled = false;
    }

    /// Stop acknowledging `start_updates` with `DeliveryStarted`.
    pub fn withhold_start_acks(&self, withhold: bool) {
        self.inner.lock().acks_withheld = withhold;
    }

    /// Deliver a fix now, as if the OS had produced it.
    pub fn inject_sample(&self, sample: LocationSample) -> bool {
        self.inner.lock().post(ControllerEvent::SampleDelivered(sample))
    }

    /// Deliver a failure now.
    pub fn inject_error(&self, error: PlatformError) -> bool {
        self.inner.lock().post(ControllerEvent::DeliveryError(error))
    }
}

impl AuthorizationProvider for SimulatedPlatform {
    fn authorization_status(&self) -> PermissionState {
        self.inner.lock().authorization
    }

    fn request_authorization(&self) {
        let mut state = self.inner.lock();
        state.calls.authorization_requests += 1;

        // Only an undetermined user is actually prompted
        if state.authorization != PermissionState::Undetermined {
            debug!(authorization = %state.authorization, "Prompt suppressed, already answered");
            return;
        }

        let response = state.config.authorization_response;
        if response != PermissionState::Undetermined {
            state.authorization = response;
            state.post(ControllerEvent::AuthorizationChanged(response));
        }
    }
}

impl LocationUpdates for SimulatedPlatform {
    fn set_event_sink(&self, sink: EventSink) {
        self.inner.lock().sink = Some(sink);
    }

    fn location_services_enabled(&self) -> bool {
        self.inner.lock().services_enabled
    }

    fn start_updates(&self, options: &UpdateOptions) {
        let mut state = self.inner.lock();
        state.calls.start_updates += 1;
        state.delivering = true;
        trace!(distance_filter_m = options.distance_filter_meters, "Simulated updates started");

        state.cancel_emitter();
        if let Some(period) = state.config.sample_interval {
            let token = CancellationToken::new();
            tokio::spawn(run_emitter(
                Arc::clone(&self.inner),
                period,
                token.clone(),
            ));
            state.emitter = Some(token);
        }

        if state.acks_withheld {
            trace!("Simulated start acknowledgement withheld");
        } else {
            state.post(ControllerEvent::DeliveryStarted);
        }
    }

    fn stop_updates(&self) {
        let mut state = self.inner.lock();
        state.calls.stop_updates += 1;
        state.delivering = false;
        state.cancel_emitter();
        trace!("Simulated updates stopped");
        state.post(ControllerEvent::DeliveryStopped);
    }

    fn start_significant_change_monitoring(&self) {
        let mut state = self.inner.lock();
        state.calls.significant_change_starts += 1;
        state.significant_change = true;
    }

    fn stop_significant_change_monitoring(&self) {
        let mut state = self.inner.lock();
        state.calls.significant_change_stops += 1;
        state.significant_change = false;
    }
}

/// Emits one fix per period until cancelled.
async fn run_emitter(state: Arc<Mutex<SimState>>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            _ = interval.tick() => {
                let mut state = state.lock();
                if state.stalled {
                    trace!("Simulated fix suppressed by stall");
                } else {
                    let sample = state.next_sample(period);
                    if !state.post(ControllerEvent::SampleDelivered(sample)) {
                        break;
                    }
                }
            }
        }
    }
}

struct HealthState {
    available: bool,
    statuses: HashMap<HealthDataKind, HealthAuthorizationStatus>,
    steps: Option<f64>,
    request_error: Option<String>,
    last_requested: Vec<HealthDataKind>,
}

/// In-process stand-in for the platform health store.
///
/// Every prompt is granted unless [`fail_requests`](Self::fail_requests)
/// was called.
#[derive(Clone)]
pub struct SimulatedHealthStore {
    inner: Arc<Mutex<HealthState>>,
}

impl SimulatedHealthStore {
    pub fn new(available: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HealthState {
                available,
                statuses: HashMap::new(),
                steps: None,
                request_error: None,
                last_requested: Vec::new(),
            })),
        }
    }

    pub fn set_status(&self, kind: HealthDataKind, status: HealthAuthorizationStatus) {
        self.inner.lock().statuses.insert(kind, status);
    }

    pub fn set_steps(&self, steps: Option<f64>) {
        self.inner.lock().steps = steps;
    }

    /// Make every later prompt fail with `message`.
    pub fn fail_requests(&self, message: &str) {
        self.inner.lock().request_error = Some(message.to_string());
    }

    /// Types passed to the most recent prompt.
    pub fn last_requested(&self) -> Vec<HealthDataKind> {
        self.inner.lock().last_requested.clone()
    }
}

impl HealthStore for SimulatedHealthStore {
    fn is_health_data_available(&self) -> bool {
        self.inner.lock().available
    }

    fn authorization_status(&self, kind: HealthDataKind) -> HealthAuthorizationStatus {
        self.inner
            .lock()
            .statuses
            .get(&kind)
            .copied()
            .unwrap_or_default()
    }

    fn request_authorization(
        &self,
        read: &[HealthDataKind],
    ) -> impl Future<Output = Result<bool, HealthError>> + Send {
        let result = {
            let mut state = self.inner.lock();
            state.last_requested = read.to_vec();
            match state.request_error.clone() {
                Some(message) => Err(HealthError::AuthorizationFailed(message)),
                None => {
                    for kind in read {
                        state
                            .statuses
                            .insert(*kind, HealthAuthorizationStatus::SharingAuthorized);
                    }
                    Ok(true)
                }
            }
        };
        async move { result }
    }

    fn today_step_count(&self) -> impl Future<Output = Result<Option<f64>, HealthError>> + Send {
        let steps = self.inner.lock().steps;
        async move { Ok(steps) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::event_channel;

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ControllerEvent>) -> Vec<ControllerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn sample_count(events: &[ControllerEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ControllerEvent::SampleDelivered(_)))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledges_start_and_stop() {
        let platform = SimulatedPlatform::with_authorization(PermissionState::WhenInUse);
        let (sink, mut rx) = event_channel();
        platform.set_event_sink(sink);

        platform.start_updates(&UpdateOptions::default());
        platform.stop_updates();

        let events = drain(&mut rx);
        assert!(matches!(events[0], ControllerEvent::DeliveryStarted));
        assert!(matches!(events[1], ControllerEvent::DeliveryStopped));
        assert_eq!(platform.calls().start_updates, 1);
        assert_eq!(platform.calls().stop_updates, 1);
        assert!(!platform.is_delivering());
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_along_track_until_stalled() {
        let platform = SimulatedPlatform::new(SimulationConfig {
            initial_authorization: PermissionState::WhenInUse,
            ..Default::default()
        });
        let (sink, mut rx) = event_channel();
        platform.set_event_sink(sink);
        platform.start_updates(&UpdateOptions::default());

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let events = drain(&mut rx);
        assert_eq!(sample_count(&events), 3);

        let fixes: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ControllerEvent::SampleDelivered(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert!(fixes[1].latitude() > fixes[0].latitude());
        assert!(fixes[1].longitude() > fixes[0].longitude());

        platform.stall();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sample_count(&drain(&mut rx)), 0);

        // A restart does not cure a stall
        platform.stop_updates();
        platform.start_updates(&UpdateOptions::default());
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert_eq!(sample_count(&drain(&mut rx)), 0);

        platform.resume();
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert_eq!(sample_count(&drain(&mut rx)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_emission() {
        let platform = SimulatedPlatform::new(SimulationConfig {
            initial_authorization: PermissionState::Always,
            ..Default::default()
        });
        let (sink, mut rx) = event_channel();
        platform.set_event_sink(sink);

        platform.start_updates(&UpdateOptions::default());
        platform.stop_updates();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(sample_count(&drain(&mut rx)), 0);
    }

    #[test]
    fn test_prompt_answered_once() {
        let platform = SimulatedPlatform::with_authorization(PermissionState::Undetermined);
        platform.set_authorization_response(PermissionState::Always);
        let (sink, mut rx) = event_channel();
        platform.set_event_sink(sink);

        platform.request_authorization();
        platform.request_authorization();

        assert_eq!(platform.authorization_status(), PermissionState::Always);
        assert_eq!(platform.calls().authorization_requests, 2);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ControllerEvent::AuthorizationChanged(PermissionState::Always)
        ));
    }

    #[test]
    fn test_denied_user_not_prompted() {
        let platform = SimulatedPlatform::with_authorization(PermissionState::Denied);
        let (sink, mut rx) = event_channel();
        platform.set_event_sink(sink);

        platform.request_authorization();
        assert_eq!(platform.authorization_status(), PermissionState::Denied);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_faults_post_events() {
        let platform = SimulatedPlatform::with_authorization(PermissionState::WhenInUse);
        assert!(!platform.set_services_enabled(false), "No sink registered yet");

        let (sink, mut rx) = event_channel();
        platform.set_event_sink(sink);
        assert!(platform.set_services_enabled(false));
        assert!(!platform.location_services_enabled());
        assert!(platform.inject_error(PlatformError::Network));

        let events = drain(&mut rx);
        assert!(matches!(
            events[0],
            ControllerEvent::ServicesAvailabilityChanged(false)
        ));
        assert!(matches!(
            events[1],
            ControllerEvent::DeliveryError(PlatformError::Network)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_withheld_start_ack() {
        let platform = SimulatedPlatform::with_authorization(PermissionState::WhenInUse);
        let (sink, mut rx) = event_channel();
        platform.set_event_sink(sink);

        platform.withhold_start_acks(true);
        platform.start_updates(&UpdateOptions::default());
        assert!(platform.is_delivering());
        assert!(drain(&mut rx).is_empty());

        platform.withhold_start_acks(false);
        platform.start_updates(&UpdateOptions::default());
        assert!(matches!(drain(&mut rx)[..], [ControllerEvent::DeliveryStarted]));
    }

    #[test]
    fn test_silent_authorization_change() {
        let platform = SimulatedPlatform::with_authorization(PermissionState::Denied);
        let (sink, mut rx) = event_channel();
        platform.set_event_sink(sink);

        platform.set_authorization_silently(PermissionState::WhenInUse);
        assert_eq!(platform.authorization_status(), PermissionState::WhenInUse);
        assert!(drain(&mut rx).is_empty());
    }
}
