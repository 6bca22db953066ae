use std::fmt;

use serde::{Deserialize, Serialize};

/// State of a component or one of its units.
///
/// On the wire the states are spelled uppercase; a value the runtime does not
/// recognize deserializes as [`UnitState::Failed`], so consumers never observe
/// an unknown state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UnitState {
    /// Asked to start, no check-in observed yet.
    Starting,
    /// Checking in within the expected period.
    Healthy,
    /// One or more check-ins missed, below the failure threshold.
    Degraded,
    /// Asked to stop, not yet confirmed stopped.
    Stopping,
    /// Not running.
    Stopped,
    /// Start failed or the failure threshold was reached.
    #[serde(other)]
    Failed,
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitState::Starting => write!(f, "Starting"),
            UnitState::Healthy => write!(f, "Healthy"),
            UnitState::Degraded => write!(f, "Degraded"),
            UnitState::Failed => write!(f, "Failed"),
            UnitState::Stopping => write!(f, "Stopping"),
            UnitState::Stopped => write!(f, "Stopped"),
        }
    }
}
