//! # Default service command executor.
//!
//! [`CommandOps`] runs the operation commands of the managed service binary
//! with `tokio::process`, honoring the per-command timeout from the spec and
//! retrying per [`RetryPolicy`] when asked to.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::component::CommandSpec;
use crate::error::OperationError;
use crate::ops::{RetryPolicy, ServiceOps};

/// Executes service operation commands as child processes.
#[derive(Debug, Default, Clone)]
pub struct CommandOps {
    retry: RetryPolicy,
}

impl CommandOps {
    /// Creates an executor with the default retry policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor with a custom retry policy.
    pub fn with_retry(retry: RetryPolicy) -> Self {
        Self { retry }
    }
}

#[async_trait]
impl ServiceOps for CommandOps {
    async fn execute(
        &self,
        token: &CancellationToken,
        binary_path: &Path,
        spec: &CommandSpec,
        should_retry: bool,
    ) -> Result<(), OperationError> {
        let mut prev_delay = None;
        loop {
            let err = match run_command(token, binary_path, spec).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_canceled() || !should_retry => return Err(err),
                Err(err) => err,
            };

            let delay = self.retry.next(prev_delay);
            prev_delay = Some(delay);
            warn!(
                binary = %binary_path.display(),
                error = %err,
                ?delay,
                "service command failed, retrying"
            );
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = token.cancelled() => return Err(OperationError::Canceled),
            }
        }
    }
}

/// Runs one command invocation, bounded by the spec timeout and `token`.
async fn run_command(
    token: &CancellationToken,
    binary_path: &Path,
    spec: &CommandSpec,
) -> Result<(), OperationError> {
    debug!(binary = %binary_path.display(), args = ?spec.args, "running service command");

    let attempt = async {
        let status = Command::new(binary_path)
            .args(&spec.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            Err(OperationError::CommandFailed { status })
        }
    };

    let bounded = async {
        match spec.timeout_duration() {
            Some(timeout) => match time::timeout(timeout, attempt).await {
                Ok(result) => result,
                Err(_) => Err(OperationError::Timeout { timeout }),
            },
            None => attempt.await,
        }
    };

    tokio::select! {
        result = bounded => result,
        _ = token.cancelled() => Err(OperationError::Canceled),
    }
}
