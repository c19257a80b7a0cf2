//! Keep-alive watchdog.
//!
//! The OS suspends location delivery for backgrounded apps without telling
//! them. The watchdog is a repeating timer that posts a tick into the
//! controller queue; on each tick the controller stops and restarts the
//! update stream and checks how long it has been since the last sample.
//!
//! Each armed timer carries a generation number. Disarming cancels the
//! timer task synchronously and bumps nothing else, so a tick from an old
//! timer that is already queued is recognised by [`KeepAliveWatchdog::is_current`]
//! and dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::event::{ControllerEvent, EventSink};

/// Default keep-alive period (30 seconds).
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(30);

/// Default pause between stopping and restarting the stream (500 ms).
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(500);

/// Default time without samples before a stall is reported (60 seconds).
pub const DEFAULT_STALL_THRESHOLD: Duration = Duration::from_secs(60);

/// Default wait for the OS to acknowledge a start before retrying (10 seconds).
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(10);

struct ArmedTimer {
    generation: u64,
    cancel: CancellationToken,
}

/// Owner of the single keep-alive timer.
pub struct KeepAliveWatchdog {
    interval: Duration,
    stall_threshold: Duration,
    armed: Option<ArmedTimer>,
    generation: u64,
    armed_gauge: Arc<AtomicUsize>,
}

impl KeepAliveWatchdog {
    /// Create a disarmed watchdog.
    pub fn new(interval: Duration, stall_threshold: Duration) -> Self {
        Self {
            interval,
            stall_threshold,
            armed: None,
            generation: 0,
            armed_gauge: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Tick period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Arm the timer, cancelling any existing one first.
    ///
    /// Returns the generation of the new timer.
    pub fn arm(&mut self, sink: EventSink) -> u64 {
        self.disarm();

        self.generation += 1;
        let generation = self.generation;
        let cancel = CancellationToken::new();

        tokio::spawn(run_timer(self.interval, generation, sink, cancel.clone()));

        self.armed = Some(ArmedTimer { generation, cancel });
        self.armed_gauge.fetch_add(1, Ordering::SeqCst);
        debug!(
            generation,
            interval_secs = self.interval.as_secs(),
            "Keep-alive watchdog armed"
        );
        generation
    }

    /// Cancel the timer if one is armed. Returns true if one was.
    pub fn disarm(&mut self) -> bool {
        match self.armed.take() {
            Some(timer) => {
                timer.cancel.cancel();
                self.armed_gauge.fetch_sub(1, Ordering::SeqCst);
                debug!(generation = timer.generation, "Keep-alive watchdog disarmed");
                true
            }
            None => false,
        }
    }

    /// Whether a timer is armed.
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Whether a tick with this generation comes from the armed timer.
    pub fn is_current(&self, generation: u64) -> bool {
        self.armed
            .as_ref()
            .is_some_and(|timer| timer.generation == generation)
    }

    /// Shared count of armed timers (always 0 or 1).
    pub fn armed_gauge(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.armed_gauge)
    }

    /// Check the time since the last sample against the stall threshold.
    ///
    /// Returns the elapsed time when it counts as a stall.
    pub fn assess(&self, since_last_sample: Duration) -> Option<Duration> {
        if since_last_sample > self.stall_threshold {
            warn!(
                elapsed_secs = since_last_sample.as_secs(),
                threshold_secs = self.stall_threshold.as_secs(),
                "STALL DETECTED: no location samples for {}s",
                since_last_sample.as_secs()
            );
            Some(since_last_sample)
        } else {
            debug!(
                elapsed_ms = since_last_sample.as_millis() as u64,
                "Keep-alive watchdog: delivery healthy"
            );
            None
        }
    }
}

impl Drop for KeepAliveWatchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Timer task: posts a tick every period until cancelled or the queue closes.
async fn run_timer(
    period: Duration,
    generation: u64,
    sink: EventSink,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            _ = interval.tick() => {
                if !sink.post(ControllerEvent::WatchdogTick { generation }) {
                    break;
                }
            }
        }
    }

    debug!(generation, "Keep-alive timer stopped");
}
