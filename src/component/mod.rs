//! # Component model: the descriptor of a managed service.
//!
//! A [`Component`] identifies an out-of-process piece of functionality that is
//! executed as a long-running OS service. The descriptor bundles:
//!
//! - an [`InputSpec`] naming the service and its binary, with the nested
//!   [`ServiceSpec`] block (check-in port, operation commands, timeouts);
//! - the [`Unit`]s the service is expected to run, keyed by [`UnitKey`];
//! - optionally a [`ShipperSpec`], which the service runtime refuses.
//!
//! The descriptor is immutable input: the runtime never mutates a component,
//! it only reconciles its own observed state against new revisions.

mod spec;

pub use spec::{CommandSpec, LogSpec, OperationsSpec, ServiceSpec, TimeoutsSpec};

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Descriptor of a component managed by the service runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Input specification; required by the service runtime.
    pub input: Option<InputSpec>,
    /// Shipper specification; components bearing one are refused.
    pub shipper: Option<ShipperSpec>,
    /// Units the managed service is expected to run.
    pub units: Vec<Unit>,
}

impl Component {
    /// Creates a component from an input specification, with no units.
    pub fn new(input: InputSpec) -> Self {
        Self {
            input: Some(input),
            shipper: None,
            units: Vec::new(),
        }
    }

    /// Replaces the unit list.
    pub fn with_units(mut self, units: Vec<Unit>) -> Self {
        self.units = units;
        self
    }

    /// Attaches a shipper specification.
    pub fn with_shipper(mut self, shipper: ShipperSpec) -> Self {
        self.shipper = Some(shipper);
        self
    }
}

/// Input specification of a component: name, binary and service block.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    /// Human-readable service name, used in state messages and logs.
    pub name: String,
    /// Path to the service binary the operation commands are run against.
    pub binary_path: PathBuf,
    /// Service block; required by the service runtime.
    pub service: Option<ServiceSpec>,
}

impl InputSpec {
    /// Creates an input specification with a service block.
    pub fn new(name: impl Into<String>, binary_path: impl Into<PathBuf>, service: ServiceSpec) -> Self {
        Self {
            name: name.into(),
            binary_path: binary_path.into(),
            service: Some(service),
        }
    }
}

/// Shipper specification marker.
///
/// Shipper components are run by a different runtime; the service runtime
/// rejects any component carrying one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipperSpec {
    /// Shipper name.
    pub name: String,
}

/// Kind of a unit within a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Data-producing unit.
    Input,
    /// Data-forwarding unit.
    Output,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Input => write!(f, "input"),
            UnitKind::Output => write!(f, "output"),
        }
    }
}

/// A unit of work the managed service runs on behalf of the component.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    /// Unique unit identifier within its kind.
    pub id: String,
    /// Unit kind.
    pub kind: UnitKind,
    /// Opaque unit configuration forwarded to the managed service.
    pub config: serde_json::Value,
}

impl Unit {
    /// Creates a unit.
    pub fn new(id: impl Into<String>, kind: UnitKind, config: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind,
            config,
        }
    }

    /// Returns the key identifying this unit in state maps.
    pub fn key(&self) -> UnitKey {
        UnitKey {
            kind: self.kind,
            id: self.id.clone(),
        }
    }
}

/// Identity of a unit: kind plus id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    /// Unit kind.
    pub kind: UnitKind,
    /// Unit identifier.
    pub id: String,
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}
