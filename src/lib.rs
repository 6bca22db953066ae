//! # servisor
//!
//! **Servisor** is a supervisor runtime for components that run as
//! long-living operating-system services.
//!
//! It does not spawn the managed process itself: the service is installed
//! through its own `install` command, starts under the OS service manager,
//! and reports health by checking in over an out-of-band channel. Servisor
//! drives that lifecycle, watches liveness, reconciles desired and observed
//! unit state under concurrent updates, and emits a consistent stream of
//! observed-state snapshots.
//!
//! ## Features
//!
//! | Area              | Description                                                        | Key types / traits                    |
//! |-------------------|--------------------------------------------------------------------|---------------------------------------|
//! | **Supervision**   | Single-loop state machine per component, watchdog included.        | [`ServiceRuntime`], [`RuntimeHandle`] |
//! | **State**         | Snapshot value with change-reporting mutators and reconciliation.  | [`ComponentState`], [`UnitState`]     |
//! | **Transport**     | Check-in stream in, expected-state pushes out. Caller-provided.    | [`Communicator`]                      |
//! | **Operations**    | `check` / `install` / `uninstall` commands, with indefinite retry. | [`ServiceOps`], [`CommandOps`]        |
//! | **Conn info**     | Local endpoint handing the service its way back in.                | [`ConnInfoServer`]                    |
//! | **Errors**        | Typed errors per failure domain.                                   | [`SpecError`], [`OperationError`], [`RuntimeError`] |
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use servisor::{Component, InputSpec, ServiceRuntime, ServiceSpec};
//!
//! # use async_trait::async_trait;
//! # use servisor::{CheckinExpected, CheckinObserved, Communicator};
//! # struct GrpcComms;
//! # #[async_trait]
//! # impl Communicator for GrpcComms {
//! #     fn conn_info(&self) -> Vec<u8> { Vec::new() }
//! #     async fn checkin_observed(&self) -> Option<CheckinObserved> { None }
//! #     async fn checkin_expected(&self, _expected: CheckinExpected) {}
//! # }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = ServiceSpec::from_yaml(
//!         "
//!         cport: 6788
//!         operations:
//!           check: { args: [verify] }
//!           install: { args: [install] }
//!           uninstall: { args: [uninstall] }
//!         ",
//!     )?;
//!     let comp = Component::new(InputSpec::new(
//!         "endpoint",
//!         "/opt/endpoint/bin/endpoint",
//!         service,
//!     ));
//!
//!     let mut runtime = ServiceRuntime::new(comp)?;
//!     let handle = runtime.handle();
//!     let mut watch = runtime.watch();
//!
//!     let comms = GrpcComms; // the transport the managed service checks in over
//!     handle.start();
//!
//!     tokio::spawn(async move {
//!         while let Some(snapshot) = watch.recv().await {
//!             println!("{}: {}", snapshot.state, snapshot.message);
//!         }
//!     });
//!
//!     runtime.run(CancellationToken::new(), &comms).await?;
//!     Ok(())
//! }
//! ```
//!
//! ---

mod comms;
mod component;
mod conninfo;
mod error;
mod ops;
mod runtime;
mod state;

// ---- Public re-exports ----

pub use comms::{CheckinExpected, CheckinObserved, Communicator, ExpectedUnit, ObservedUnit};
pub use component::{
    CommandSpec, Component, InputSpec, LogSpec, OperationsSpec, ServiceSpec, ShipperSpec,
    TimeoutsSpec, Unit, UnitKey, UnitKind,
};
pub use conninfo::ConnInfoServer;
pub use error::{OperationError, RuntimeError, SpecError};
pub use ops::{CommandOps, RetryPolicy, ServiceOps};
pub use runtime::{RuntimeHandle, ServiceRuntime};
pub use state::{ComponentState, ExpectedUnitState, ObservedUnitState, UnitState};
