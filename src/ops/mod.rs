//! # Service operations capability.
//!
//! The runtime never shells out directly; it drives a [`ServiceOps`]
//! capability to invoke the `check`, `install` and `uninstall` commands of the
//! managed service. [`CommandOps`] is the default implementation over
//! `tokio::process`; tests and embedders may substitute their own.

mod exec;
mod retry;

pub use exec::CommandOps;
pub use retry::RetryPolicy;

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::component::CommandSpec;
use crate::error::OperationError;

/// Capability to invoke one operation of the managed service binary.
#[async_trait]
pub trait ServiceOps: Send + Sync {
    /// Executes `binary_path` according to `spec`.
    ///
    /// When `should_retry` is true (install, uninstall) the implementation
    /// must retry indefinitely until the command succeeds or `token` is
    /// cancelled. When false (check) it must not retry.
    async fn execute(
        &self,
        token: &CancellationToken,
        binary_path: &Path,
        spec: &CommandSpec,
        should_retry: bool,
    ) -> Result<(), OperationError>;
}
