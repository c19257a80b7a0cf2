//! Health data authorization.
//!
//! The app reads step count, walking/running distance and active energy
//! from the platform health store. [`HealthStore`] is the boundary to that
//! store; [`HealthBridge`] implements the two commands the UI layer calls
//! (check and request authorization) plus the startup sequence that asks
//! for access and reads today's steps.

use std::fmt;
use std::future::Future;

use thiserror::Error;
use tracing::{debug, info, warn};

/// Health data types the app reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthDataKind {
    StepCount,
    DistanceWalkingRunning,
    ActiveEnergyBurned,
}

impl HealthDataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StepCount => "step_count",
            Self::DistanceWalkingRunning => "distance_walking_running",
            Self::ActiveEnergyBurned => "active_energy_burned",
        }
    }
}

impl fmt::Display for HealthDataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Types requested in a single authorization prompt.
pub const READ_TYPES: [HealthDataKind; 3] = [
    HealthDataKind::StepCount,
    HealthDataKind::DistanceWalkingRunning,
    HealthDataKind::ActiveEnergyBurned,
];

/// Per-type authorization as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthAuthorizationStatus {
    #[default]
    NotDetermined,
    SharingDenied,
    SharingAuthorized,
}

/// Health store failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HealthError {
    #[error("Health data is not available on this device")]
    Unavailable,

    #[error("Health authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Health query failed: {0}")]
    QueryFailed(String),
}

/// Platform health store.
pub trait HealthStore: Send + Sync {
    /// Whether the device has a health store at all.
    fn is_health_data_available(&self) -> bool;

    fn authorization_status(&self, kind: HealthDataKind) -> HealthAuthorizationStatus;

    /// Prompt for read access. Resolves to whether the prompt completed.
    fn request_authorization(
        &self,
        read: &[HealthDataKind],
    ) -> impl Future<Output = Result<bool, HealthError>> + Send;

    /// Cumulative steps since local midnight, `None` when there is no data.
    fn today_step_count(&self) -> impl Future<Output = Result<Option<f64>, HealthError>> + Send;
}

/// Health commands exposed to the UI layer.
pub struct HealthBridge<S: HealthStore> {
    store: S,
}

impl<S: HealthStore> HealthBridge<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// True only when step count reading is authorized.
    pub fn check_authorization(&self) -> bool {
        if !self.store.is_health_data_available() {
            debug!("Health authorization check: store unavailable");
            return false;
        }

        let status = self.store.authorization_status(HealthDataKind::StepCount);
        debug!(?status, "Health authorization check");
        status == HealthAuthorizationStatus::SharingAuthorized
    }

    /// Prompt for [`READ_TYPES`]. False when unavailable or the prompt errors.
    pub async fn request_authorization(&self) -> bool {
        match self.authorize().await {
            Ok(granted) => granted,
            Err(e) => {
                warn!(error = %e, "Health authorization request failed");
                false
            }
        }
    }

    /// Startup sequence: request access, then read today's steps.
    ///
    /// Returns the step count when access was granted and data exists.
    pub async fn initialize(&self) -> Result<Option<f64>, HealthError> {
        if !self.authorize().await? {
            info!("Health authorization denied");
            return Ok(None);
        }

        info!("Health authorization successful");
        let steps = self.store.today_step_count().await?;
        match steps {
            Some(steps) => info!(steps, "Total steps today"),
            None => debug!("No step count data available"),
        }
        Ok(steps)
    }

    async fn authorize(&self) -> Result<bool, HealthError> {
        if !self.store.is_health_data_available() {
            return Err(HealthError::Unavailable);
        }
        self.store.request_authorization(&READ_TYPES).await
    }
}
