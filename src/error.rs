//! # Error types used by the service runtime.
//!
//! This module defines three error enums, one per failure domain:
//!
//! - [`SpecError`] component specifications rejected at construction.
//! - [`OperationError`] failures of the `check`/`install`/`uninstall` service commands.
//! - [`RuntimeError`] errors raised by the supervisor loop itself.
//!
//! All types provide `as_label` helpers for logs/metrics.

use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// # Component specification errors.
///
/// Raised by [`ServiceRuntime::new`](crate::ServiceRuntime::new) when the
/// component cannot be managed as an OS service.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    /// The component carries a shipper specification.
    #[error("service runtime not supported for a shipper specification")]
    ShipperUnsupported,

    /// The component has no input specification.
    #[error("service runtime requires an input specification to be defined")]
    MissingInputSpec,

    /// The input specification has no `service` block.
    #[error("input specification must have a service block defined")]
    MissingServiceSpec,
}

impl SpecError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SpecError::ShipperUnsupported => "spec_shipper_unsupported",
            SpecError::MissingInputSpec => "spec_missing_input",
            SpecError::MissingServiceSpec => "spec_missing_service",
        }
    }
}

/// # Service operation errors.
///
/// Raised while executing one of the `check`/`install`/`uninstall` commands of
/// the managed service. The supervisor recovers from every variant by
/// recording a `Failed` state and continuing; only [`OperationError::Canceled`]
/// reflects an external cancellation rather than a command failure.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum OperationError {
    /// The requested operation has no command spec defined.
    #[error("operation spec undefined")]
    SpecUndefined,

    /// A single command invocation exceeded its configured timeout.
    #[error("operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The command ran but exited unsuccessfully.
    #[error("command exited with {status}")]
    CommandFailed { status: ExitStatus },

    /// The operation was canceled before it could complete.
    #[error("operation canceled")]
    Canceled,

    /// The command could not be spawned or awaited.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OperationError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            OperationError::SpecUndefined => "op_spec_undefined",
            OperationError::Timeout { .. } => "op_timeout",
            OperationError::CommandFailed { .. } => "op_command_failed",
            OperationError::Canceled => "op_canceled",
            OperationError::Io(_) => "op_io",
        }
    }

    /// Indicates whether the failure came from cancellation rather than the command.
    pub fn is_canceled(&self) -> bool {
        matches!(self, OperationError::Canceled)
    }
}

/// # Errors produced by the supervisor loop.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The run context was canceled; the loop has exited.
    #[error("service runtime canceled")]
    Canceled,

    /// `run` was called on a runtime whose loop already consumed its channels.
    #[error("service runtime is already running")]
    AlreadyRunning,
}

impl RuntimeError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Canceled => "runtime_canceled",
            RuntimeError::AlreadyRunning => "runtime_already_running",
        }
    }
}
