//! The tracking session owned by the controller.

use tokio::time::{Duration, Instant};

use super::sample::LocationSample;

/// One tracking run, from the start request until teardown.
///
/// The session exists from the moment updates are requested; it becomes
/// active once the OS acknowledges that delivery has begun.
#[derive(Debug)]
pub struct TrackingSession {
    is_active: bool,
    started_at: Instant,
    last_sample_at: Option<Instant>,
    last_sample: Option<LocationSample>,
    samples_accepted: u64,
}

impl TrackingSession {
    /// Create a session that has requested updates at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            is_active: false,
            started_at: now,
            last_sample_at: None,
            last_sample: None,
            samples_accepted: 0,
        }
    }

    /// Mark delivery as confirmed.
    pub fn activate(&mut self) {
        self.is_active = true;
    }

    /// Whether the OS has confirmed delivery.
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// When updates were requested.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// When the last accepted sample arrived.
    pub fn last_sample_at(&self) -> Option<Instant> {
        self.last_sample_at
    }

    /// The last accepted sample.
    pub fn last_sample(&self) -> Option<&LocationSample> {
        self.last_sample.as_ref()
    }

    /// Number of samples accepted in this session.
    pub fn samples_accepted(&self) -> u64 {
        self.samples_accepted
    }

    /// Record an accepted sample.
    pub fn record_sample(&mut self, sample: LocationSample, now: Instant) {
        self.last_sample = Some(sample);
        self.last_sample_at = Some(now);
        self.samples_accepted += 1;
    }

    /// Time since the last accepted sample, or since start if none arrived.
    pub fn time_since_last_sample(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_sample_at.unwrap_or(self.started_at))
    }
}
