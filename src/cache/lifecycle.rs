//! Cache generation lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one cache generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    /// Nothing installed yet, or the last install failed.
    Idle,
    /// Precache fetches in flight.
    Installing,
    /// All precache assets stored; waiting to take over.
    Installed,
    /// Deleting stale generations.
    Activating,
    /// Serving intercepted requests.
    Active,
    /// Superseded by another generation.
    Redundant,
}

impl CacheState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: CacheState) -> bool {
        use CacheState::*;

        matches!(
            (self, target),
            (Idle, Installing) |
            // Install either completes or falls back so it can be retried
            (Installing, Installed) | (Installing, Idle) |
            (Installed, Activating) | (Installed, Redundant) |
            (Activating, Active) |
            (Active, Redundant)
        )
    }

    /// Whether this generation intercepts fetches.
    pub fn is_serving(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Redundant => "redundant",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle notifications broadcast to the page side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A generation finished installing and can take over.
    Installed { version: String },
    /// A generation's install failed; the previous one stays in charge.
    InstallFailed { version: String },
    /// A generation activated and claimed all clients.
    ControllerChanged { version: String },
}
