//! # Communicator seam between the supervisor and the managed service.
//!
//! The runtime does not implement the check-in wire protocol; the caller
//! provides a [`Communicator`] that owns it. The runtime only consumes the
//! inbound stream of [`CheckinObserved`] payloads and pushes
//! [`CheckinExpected`] snapshots back whenever the expected side changes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::component::UnitKey;
use crate::state::UnitState;

/// Observed state of one unit, as carried by a check-in payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedUnit {
    /// Unit identity.
    pub key: UnitKey,
    /// State the service reports for the unit.
    pub state: UnitState,
    /// Message the service reports for the unit.
    #[serde(default)]
    pub message: String,
    /// Configuration revision the service has applied.
    #[serde(default)]
    pub config_revision: u64,
}

/// A check-in from the managed service: a liveness assertion plus the
/// observed state of every unit it runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckinObserved {
    /// Observed unit states.
    #[serde(default)]
    pub units: Vec<ObservedUnit>,
}

/// Expected state of one unit, as sent to the managed service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedUnit {
    /// Unit identity.
    pub key: UnitKey,
    /// State the unit should reach.
    pub state: UnitState,
    /// Configuration revision to apply.
    pub config_revision: u64,
    /// Unit configuration.
    pub config: serde_json::Value,
}

/// The expected-state snapshot pushed to the managed service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinExpected {
    /// State the component should reach.
    pub state: UnitState,
    /// Expected unit states.
    pub units: Vec<ExpectedUnit>,
}

/// Transport between the supervisor and the managed service.
///
/// Implementations own the wire protocol. All methods take `&self`: the
/// supervisor loop awaits [`Communicator::checkin_observed`] concurrently with
/// its other event sources and calls [`Communicator::checkin_expected`]
/// synchronously after state mutations.
#[async_trait]
pub trait Communicator: Send + Sync {
    /// Connection details served to the managed service through the
    /// connection-info endpoint, so it can reach back for check-ins.
    fn conn_info(&self) -> Vec<u8>;

    /// Waits for the next check-in from the managed service.
    ///
    /// Returns `None` once the transport is closed and no further check-ins
    /// can arrive.
    async fn checkin_observed(&self) -> Option<CheckinObserved>;

    /// Pushes the expected-state snapshot to the managed service.
    async fn checkin_expected(&self, expected: CheckinExpected);
}
