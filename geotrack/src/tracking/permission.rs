//! Location authorization state tracking.
//!
//! The [`PermissionTracker`] holds the last authorization state reported by
//! the OS. It never polls: the state only moves when an authorization-change
//! callback arrives, and the controller reads it before every start attempt.

use std::fmt;
use std::str::FromStr;

/// Location authorization as reported by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
    /// The user has not been asked yet.
    #[default]
    Undetermined,
    /// Updates allowed while the app is in use (and while a background
    /// session it started keeps running).
    WhenInUse,
    /// Updates allowed at any time.
    Always,
    /// The user refused or revoked access.
    Denied,
    /// Access is blocked by device policy (parental controls, MDM).
    Restricted,
}

impl PermissionState {
    /// Returns true if tracking may run under this state.
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::WhenInUse | Self::Always)
    }

    /// Returns true if the state blocks tracking until an external grant.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Denied | Self::Restricted)
    }

    /// Returns the config/CLI spelling of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undetermined => "undetermined",
            Self::WhenInUse => "when_in_use",
            Self::Always => "always",
            Self::Denied => "denied",
            Self::Restricted => "restricted",
        }
    }
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "undetermined" | "not_determined" => Ok(Self::Undetermined),
            "when_in_use" | "wheninuse" => Ok(Self::WhenInUse),
            "always" => Ok(Self::Always),
            "denied" => Ok(Self::Denied),
            "restricted" => Ok(Self::Restricted),
            other => Err(format!(
                "unknown permission state '{}' (expected undetermined, when_in_use, always, denied, restricted)",
                other
            )),
        }
    }
}

/// How an authorization callback moved the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionChange {
    /// Same state as before.
    Unchanged,
    /// Moved from a non-authorized state to `WhenInUse`/`Always`.
    Granted,
    /// Moved from an authorized state to anything that is not authorized.
    Revoked,
    /// Any other move (`Always` <-> `WhenInUse`, `Undetermined` -> `Denied`).
    Updated,
}

/// Last known authorization state plus prompt bookkeeping.
#[derive(Debug, Default)]
pub struct PermissionTracker {
    state: PermissionState,
    request_pending: bool,
    requests_issued: u32,
}

impl PermissionTracker {
    /// Create a tracker seeded with the state the OS reports at startup.
    pub fn new(initial: PermissionState) -> Self {
        Self {
            state: initial,
            request_pending: false,
            requests_issued: 0,
        }
    }

    /// Current authorization state.
    pub fn current_state(&self) -> PermissionState {
        self.state
    }

    /// Apply an OS authorization callback and classify the move.
    ///
    /// Any answer other than `Undetermined` resolves an outstanding prompt.
    pub fn on_authorization_changed(&mut self, new_state: PermissionState) -> PermissionChange {
        if new_state != PermissionState::Undetermined {
            self.request_pending = false;
        }

        let old = std::mem::replace(&mut self.state, new_state);
        if old == new_state {
            PermissionChange::Unchanged
        } else if !old.is_authorized() && new_state.is_authorized() {
            PermissionChange::Granted
        } else if old.is_authorized() && !new_state.is_authorized() {
            PermissionChange::Revoked
        } else {
            PermissionChange::Updated
        }
    }

    /// Returns true when no prompt is outstanding.
    pub fn should_request(&self) -> bool {
        !self.request_pending
    }

    /// Record that an authorization prompt was issued.
    pub fn mark_requested(&mut self) {
        self.request_pending = true;
        self.requests_issued += 1;
    }

    /// Whether a prompt is waiting for an answer.
    pub fn request_pending(&self) -> bool {
        self.request_pending
    }

    /// Number of prompts issued since creation.
    pub fn requests_issued(&self) -> u32 {
        self.requests_issued
    }
}
