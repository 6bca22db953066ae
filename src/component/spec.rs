//! # YAML-shaped service specification.
//!
//! [`ServiceSpec`] describes how the runtime interacts with the managed OS
//! service:
//!
//! - [`ServiceSpec::cport`] the local port the connection-info endpoint binds;
//! - [`OperationsSpec`] the `check`/`install`/`uninstall` command specs;
//! - [`TimeoutsSpec::checkin`] the expected check-in period.
//!
//! Durations are spelled as integer seconds, `0` meaning "use the default".
//!
//! ## Example
//! ```rust
//! use servisor::ServiceSpec;
//!
//! let spec = ServiceSpec::from_yaml(
//!     "
//!     cport: 6788
//!     operations:
//!       check:
//!         args: [verify]
//!         timeout: 30
//!       install:
//!         args: [install, --force]
//!     timeouts:
//!       checkin: 60
//!     ",
//! )
//! .unwrap();
//!
//! assert_eq!(spec.cport, 6788);
//! assert_eq!(spec.timeouts.checkin, 60);
//! assert!(spec.operations.uninstall.is_none());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Service block of a component input specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Port the connection-info endpoint binds on `127.0.0.1`.
    pub cport: u16,
    /// Advisory log location of the managed service.
    #[serde(default)]
    pub log: Option<LogSpec>,
    /// Operation command specs.
    #[serde(default)]
    pub operations: OperationsSpec,
    /// Timeouts governing the check-in watchdog.
    #[serde(default)]
    pub timeouts: TimeoutsSpec,
}

impl ServiceSpec {
    /// Parses a service block from its YAML form.
    pub fn from_yaml(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }
}

/// Advisory log location of the managed service; unused by the runtime core.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogSpec {
    /// Glob pattern for the service's log files.
    #[serde(default)]
    pub path: Option<String>,
}

/// The operation commands of the managed service.
///
/// `install` and `uninstall` are retried indefinitely by the executing
/// capability; `check` is single-shot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OperationsSpec {
    /// Probes whether the service is installed.
    #[serde(default)]
    pub check: Option<CommandSpec>,
    /// Installs the service under the OS service manager.
    #[serde(default)]
    pub install: Option<CommandSpec>,
    /// Uninstalls the service from the OS service manager.
    #[serde(default)]
    pub uninstall: Option<CommandSpec>,
}

/// A single operation command of the service binary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Arguments passed to the service binary.
    #[serde(default)]
    pub args: Vec<String>,
    /// Seconds before a single invocation is aborted (`0` = no timeout).
    #[serde(default)]
    pub timeout: u64,
}

impl CommandSpec {
    /// Creates a command spec with no per-invocation timeout.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            timeout: 0,
        }
    }

    /// Returns the per-invocation timeout, if one is configured.
    pub fn timeout_duration(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }
}

/// Timeouts of the managed service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeoutsSpec {
    /// Seconds between expected check-ins (`0` = runtime default).
    #[serde(default)]
    pub checkin: u64,
}
