//! `geotrack simulate`: run the controller against a simulated device.
//!
//! Enables tracking through the location method channel, replays an
//! optional fault timeline (stall, background, foreground, revocation),
//! prints samples and controller events, then disables tracking and
//! prints a summary of the platform calls made.

use std::time::Duration;

use clap::Args;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use geotrack::channel::{
    MethodCall, MethodChannels, MethodResult, DISABLE_BACKGROUND_LOCATION,
    ENABLE_BACKGROUND_LOCATION, LOCATION_CHANNEL,
};
use geotrack::config::ConfigFile;
use geotrack::health::HealthBridge;
use geotrack::simulation::{SimulatedHealthStore, SimulatedPlatform, SimulationConfig};
use geotrack::tracking::{
    ControllerState, PermissionState, TaggedSample, TrackingConfig, TrackingEvent, TrackingService,
};

use crate::error::CliError;
use crate::runner::CliRunner;

/// How long to wait for teardown acknowledgements on exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Steps reported by the simulated health store.
const SIMULATED_STEPS: f64 = 4_200.0;

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Total run time in seconds
    #[arg(long, default_value_t = 120)]
    pub duration_secs: u64,

    /// Initial location permission (undetermined, when_in_use, always, denied, restricted)
    #[arg(long, default_value = "undetermined")]
    pub permission: PermissionState,

    /// Silently stop sample delivery after N seconds
    #[arg(long)]
    pub stall_after_secs: Option<u64>,

    /// Send the app to the background after N seconds
    #[arg(long)]
    pub background_at_secs: Option<u64>,

    /// Bring the app back to the foreground after N seconds
    #[arg(long)]
    pub foreground_at_secs: Option<u64>,

    /// Revoke location permission after N seconds
    #[arg(long)]
    pub revoke_at_secs: Option<u64>,
}

/// A scripted fault applied to the simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Stall,
    Background,
    Foreground,
    Revoke,
}

impl SimulateArgs {
    /// Faults in the order they fire.
    fn timeline(&self) -> Vec<(Duration, Fault)> {
        let mut faults: Vec<(Duration, Fault)> = [
            (self.stall_after_secs, Fault::Stall),
            (self.background_at_secs, Fault::Background),
            (self.foreground_at_secs, Fault::Foreground),
            (self.revoke_at_secs, Fault::Revoke),
        ]
        .into_iter()
        .filter_map(|(at, fault)| at.map(|secs| (Duration::from_secs(secs), fault)))
        .filter(|(at, _)| at.as_secs() < self.duration_secs)
        .collect();

        faults.sort_by_key(|(at, _)| *at);
        faults
    }
}

/// Run the simulate command.
pub fn run(args: SimulateArgs, debug: bool) -> Result<(), CliError> {
    let runner = CliRunner::with_debug(debug)?;
    runner.log_startup("simulate");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let cancellation = CancellationToken::new();
    let ctrlc_token = cancellation.clone();
    ctrlc::set_handler(move || {
        if ctrlc_token.is_cancelled() {
            eprintln!("\nForce exit");
            std::process::exit(130);
        }
        eprintln!("\nStopping simulation (Ctrl+C again to force)...");
        ctrlc_token.cancel();
    })
    .map_err(|e| CliError::Signal(e.to_string()))?;

    runtime.block_on(simulate(args, runner.config(), cancellation))
}

async fn simulate(
    args: SimulateArgs,
    config: &ConfigFile,
    cancellation: CancellationToken,
) -> Result<(), CliError> {
    let platform = SimulatedPlatform::new(SimulationConfig::from_settings(
        &config.simulation,
        args.permission,
    ));
    let (handle, task) =
        TrackingService::spawn(platform.clone(), TrackingConfig::from(&config.tracking));

    let health_store = SimulatedHealthStore::new(true);
    health_store.set_steps(Some(SIMULATED_STEPS));
    let health = HealthBridge::new(health_store);
    match health.initialize().await {
        Ok(Some(steps)) => println!("Health: {:.0} steps today", steps),
        Ok(None) => println!("Health: no step data"),
        Err(e) => warn!(error = %e, "Health initialization failed"),
    }

    let printer_stop = CancellationToken::new();
    let printer = tokio::spawn(print_outputs(
        handle.subscribe_events(),
        handle.subscribe_samples(),
        printer_stop.clone(),
    ));

    let channels = MethodChannels::new(handle.clone(), health);
    let enabled = channels
        .invoke(
            LOCATION_CHANNEL,
            &MethodCall::new(ENABLE_BACKGROUND_LOCATION),
        )
        .await;
    println!("{} -> {:?}", ENABLE_BACKGROUND_LOCATION, enabled);

    let started = Instant::now();
    let bridge = handle.lifecycle_bridge();
    for (at, fault) in args.timeline() {
        tokio::select! {
            _ = cancellation.cancelled() => break,
            _ = tokio::time::sleep_until(started + at) => {}
        }

        println!("[{:>4}s] fault: {:?}", at.as_secs(), fault);
        info!(?fault, at_secs = at.as_secs(), "Applying simulated fault");
        match fault {
            Fault::Stall => platform.stall(),
            Fault::Background => {
                bridge.on_enter_background();
            }
            Fault::Foreground => {
                bridge.on_enter_foreground();
            }
            Fault::Revoke => {
                platform.set_authorization(PermissionState::Denied);
            }
        }
    }

    tokio::select! {
        _ = cancellation.cancelled() => {}
        _ = tokio::time::sleep_until(started + Duration::from_secs(args.duration_secs)) => {}
    }

    let disabled = channels
        .invoke(
            LOCATION_CHANNEL,
            &MethodCall::new(DISABLE_BACKGROUND_LOCATION),
        )
        .await;
    println!("{} -> {:?}", DISABLE_BACKGROUND_LOCATION, disabled);

    if disabled == MethodResult::Success(true) {
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle.wait_for_state(ControllerState::Idle))
            .await
        {
            Ok(result) => {
                result?;
            }
            Err(_) => warn!("Timed out waiting for the controller to go idle"),
        }
    }

    let status = handle.status();
    handle.shutdown();
    if let Err(e) = task.await {
        warn!(error = %e, "Controller task ended abnormally");
    }
    printer_stop.cancel();
    let _ = printer.await;

    let calls = platform.calls();
    println!();
    println!("Summary");
    println!("=======");
    println!("  final state:            {}", status.state);
    println!("  permission:             {}", status.permission);
    println!("  samples accepted:       {}", status.samples_accepted);
    println!("  authorization requests: {}", calls.authorization_requests);
    println!("  start updates:          {}", calls.start_updates);
    println!("  stop updates:           {}", calls.stop_updates);
    println!(
        "  significant change:     {} started, {} stopped",
        calls.significant_change_starts, calls.significant_change_stops
    );

    Ok(())
}

async fn print_outputs(
    mut events: broadcast::Receiver<TrackingEvent>,
    mut samples: broadcast::Receiver<TaggedSample>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = stop.cancelled() => break,

            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event printer lagged"),
                Err(RecvError::Closed) => break,
            },

            sample = samples.recv() => match sample {
                Ok(tagged) => print_sample(&tagged),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Sample printer lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }
}

fn print_event(event: &TrackingEvent) {
    match event {
        TrackingEvent::StateChanged { from, to } => println!("state: {} -> {}", from, to),
        TrackingEvent::AuthorizationRequested => println!("authorization requested"),
        TrackingEvent::RestartCycleStarted { cycle, reason } => {
            println!("restart #{} started ({:?})", cycle, reason)
        }
        TrackingEvent::RestartCycleCompleted { cycle, reason } => {
            println!("restart #{} completed ({:?})", cycle, reason)
        }
        TrackingEvent::RestartCycleCancelled { cycle } => println!("restart #{} cancelled", cycle),
        TrackingEvent::StallDetected { since_last_sample } => println!(
            "stall: no sample for {}s",
            since_last_sample.as_secs()
        ),
        TrackingEvent::DeliveryError { error, class } => {
            println!("delivery error: {:?} ({:?})", error, class)
        }
        TrackingEvent::SampleRejected => println!("sample rejected"),
        TrackingEvent::StartTimedOut { attempt } => {
            println!("start #{} never acknowledged, retrying", attempt)
        }
    }
}

fn print_sample(tagged: &TaggedSample) {
    let sample = &tagged.sample;
    println!(
        "{} {:>10.6}, {:>10.6}  ±{:.0}m  {:.1}m/s{}",
        sample.captured_at().format("%H:%M:%S"),
        sample.latitude(),
        sample.longitude(),
        sample.horizontal_accuracy_meters(),
        sample.speed_meters_per_second(),
        if tagged.is_low_confidence() { "  (low confidence)" } else { "" },
    );
}
