//! # ServiceRuntime: the supervisor loop for a service component.
//!
//! The runtime drives an out-of-process component through its
//! install/start/check-in/stop/uninstall lifecycle. It owns the check-in
//! watchdog and the user-action funnel, and it is the sole mutator of the
//! component's [`ComponentState`].
//!
//! ## Architecture
//! ```text
//! RuntimeHandle ──► action slot (start/stop/teardown, last-writer-wins)
//!               ──► update slot (component revisions, last-writer-wins)
//!                        │
//!                        ▼
//!              ServiceRuntime::run() ──► select on five sources:
//!                   ├──► cancellation      → return
//!                   ├──► action            → install/uninstall via ServiceOps,
//!                   │                        conn-info server start/stop
//!                   ├──► component update  → reconcile expected/observed
//!                   ├──► check-in          → liveness + unit merge
//!                   └──► watchdog tick     → Healthy/Degraded/Failed ladder
//!                        │
//!                        └──► observations (blocking watch channel)
//! ```
//!
//! ## Rules
//! - One branch fires per iteration; all state mutation is serialized on the
//!   loop, so no locking is needed around [`ComponentState`].
//! - An observation is emitted exactly when a state mutator reports a change.
//! - Emitting an observation **blocks** until the watch consumer drains it.
//! - The managed service starts **itself** under the OS service manager; the
//!   runtime never launches a process directly, it only runs the service's
//!   `check`/`install`/`uninstall` commands and waits for check-ins.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::comms::{CheckinObserved, Communicator};
use crate::component::{CommandSpec, Component, ServiceSpec};
use crate::conninfo::ConnInfoServer;
use crate::error::{OperationError, RuntimeError, SpecError};
use crate::ops::{CommandOps, ServiceOps};
use crate::state::{ComponentState, UnitState};

/// Consecutive missed check-ins after which the component is failed.
const MAX_CHECKIN_MISSES: u32 = 3;

/// Check-in period used when the service spec leaves `timeouts.checkin` at 0.
const DEFAULT_CHECKIN_PERIOD: Duration = Duration::from_secs(30);

/// Message used for states the runtime has no specific wording for.
const STATE_UNKNOWN_MESSAGE: &str = "Unknown";

/// User actions funneled onto the supervisor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Start,
    Stop,
    Teardown,
}

struct HandleShared {
    action_tx: watch::Sender<Option<Action>>,
    update_tx: watch::Sender<Option<Component>>,
}

/// Cloneable control surface of a [`ServiceRuntime`].
///
/// Every entry point is non-blocking and never fails: each delivery replaces
/// any still-pending one (last-writer-wins), so only the operator's most
/// recent intent reaches the loop.
#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Arc<HandleShared>,
}

impl RuntimeHandle {
    /// Asks the runtime to start the managed service.
    pub fn start(&self) {
        let _ = self.inner.action_tx.send(Some(Action::Start));
    }

    /// Asks the runtime to stop the managed service.
    pub fn stop(&self) {
        let _ = self.inner.action_tx.send(Some(Action::Stop));
    }

    /// Asks the runtime to stop and uninstall the managed service.
    pub fn teardown(&self) {
        let _ = self.inner.action_tx.send(Some(Action::Teardown));
    }

    /// Delivers a new component revision, replacing any pending one.
    pub fn update(&self, comp: Component) {
        let _ = self.inner.update_tx.send(Some(comp));
    }
}

/// Supervisor for a component executed as a long-running OS service.
pub struct ServiceRuntime {
    name: String,
    binary_path: PathBuf,
    service: ServiceSpec,
    state: ComponentState,
    ops: Arc<dyn ServiceOps>,

    handle: RuntimeHandle,
    action_rx: Option<watch::Receiver<Option<Action>>>,
    update_rx: Option<watch::Receiver<Option<Component>>>,
    observed_tx: mpsc::Sender<ComponentState>,
    observed_rx: Option<mpsc::Receiver<ComponentState>>,
}

impl ServiceRuntime {
    /// Creates a runtime for the component.
    ///
    /// Rejects shipper components, components without an input spec and input
    /// specs without a `service` block.
    pub fn new(comp: Component) -> Result<Self, SpecError> {
        if comp.shipper.is_some() {
            return Err(SpecError::ShipperUnsupported);
        }
        let Some(input) = comp.input.clone() else {
            return Err(SpecError::MissingInputSpec);
        };
        let Some(service) = input.service else {
            return Err(SpecError::MissingServiceSpec);
        };

        let (action_tx, action_rx) = watch::channel(None);
        let (update_tx, update_rx) = watch::channel(None);
        let (observed_tx, observed_rx) = mpsc::channel(1);

        let mut state = ComponentState::new(&comp);
        state.comp_state(UnitState::Stopped, format!("Stopped: {} service", input.name));

        Ok(Self {
            name: input.name,
            binary_path: input.binary_path,
            service,
            state,
            ops: Arc::new(CommandOps::new()),
            handle: RuntimeHandle {
                inner: Arc::new(HandleShared { action_tx, update_tx }),
            },
            action_rx: Some(action_rx),
            update_rx: Some(update_rx),
            observed_tx,
            observed_rx: Some(observed_rx),
        })
    }

    /// Replaces the service operations capability.
    pub fn with_ops(mut self, ops: Arc<dyn ServiceOps>) -> Self {
        self.ops = ops;
        self
    }

    /// Returns the control surface for this runtime.
    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    /// Returns the stream of observed-state snapshots.
    ///
    /// A snapshot is sent anytime the state of a unit or of the whole
    /// component changes. The stream must be drained promptly: emission
    /// blocks the supervisor loop. Calling `watch` again replaces the
    /// previous subscriber.
    pub fn watch(&mut self) -> mpsc::Receiver<ComponentState> {
        match self.observed_rx.take() {
            Some(rx) => rx,
            None => {
                let (tx, rx) = mpsc::channel(1);
                self.observed_tx = tx;
                rx
            }
        }
    }

    /// Returns the current observed state.
    pub fn state(&self) -> &ComponentState {
        &self.state
    }

    /// Drives the supervisor loop until `token` is cancelled.
    ///
    /// The communicator is injected per call and never stored. Returns
    /// [`RuntimeError::Canceled`] once the cancellation takes effect, or
    /// [`RuntimeError::AlreadyRunning`] if the loop was already consumed.
    pub async fn run<C: Communicator>(
        &mut self,
        token: CancellationToken,
        comm: &C,
    ) -> Result<(), RuntimeError> {
        let mut action_rx = self.action_rx.take().ok_or(RuntimeError::AlreadyRunning)?;
        let mut update_rx = self.update_rx.take().ok_or(RuntimeError::AlreadyRunning)?;

        let mut cis: Option<ConnInfoServer> = None;
        let mut last_checkin: Option<Instant> = None;
        let mut missed_checkins: u32 = 0;
        let mut checkin_deadline: Option<Instant> = None;
        let mut comm_open = true;

        let result = loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(service = %self.name, "context is done, exiting");
                    break Err(RuntimeError::Canceled);
                }

                changed = action_rx.changed() => {
                    if changed.is_err() {
                        continue;
                    }
                    let action = *action_rx.borrow_and_update();
                    let Some(action) = action else { continue };
                    match action {
                        Action::Start => {
                            last_checkin = None;
                            missed_checkins = 0;
                            checkin_deadline = None;
                            stop_conn_info(&mut cis).await;

                            match ConnInfoServer::bind(self.service.cport, comm.conn_info()).await {
                                Ok(server) => {
                                    cis = Some(server);
                                    match self.start_service(&token).await {
                                        Ok(()) => {
                                            checkin_deadline =
                                                Some(Instant::now() + self.checkin_period());
                                        }
                                        Err(err) => {
                                            stop_conn_info(&mut cis).await;
                                            let msg = format!(
                                                "failed to start {} service: {err}",
                                                self.name
                                            );
                                            self.force_comp_state(UnitState::Failed, msg).await;
                                        }
                                    }
                                }
                                Err(err) => {
                                    let msg = format!(
                                        "failed to start connection info server for {} service: {err}",
                                        self.name
                                    );
                                    self.force_comp_state(UnitState::Failed, msg).await;
                                }
                            }
                        }
                        Action::Stop | Action::Teardown => {
                            debug!(service = %self.name, "stopping check-in watchdog");
                            checkin_deadline = None;
                            debug!(service = %self.name, "stopping connection info server");
                            stop_conn_info(&mut cis).await;
                            self.stop_service(
                                &token,
                                comm,
                                last_checkin.is_some(),
                                action == Action::Teardown,
                            )
                            .await;
                        }
                    }
                }

                changed = update_rx.changed() => {
                    if changed.is_err() {
                        continue;
                    }
                    let comp = update_rx.borrow_and_update().clone();
                    if let Some(comp) = comp {
                        self.process_new_comp(&comp, comm).await;
                    }
                }

                checkin = comm.checkin_observed(), if comm_open => {
                    match checkin {
                        Some(checkin) => {
                            self.process_checkin(&checkin, comm, &mut last_checkin).await;
                        }
                        None => comm_open = false,
                    }
                }

                _ = time::sleep_until(checkin_deadline.unwrap_or_else(Instant::now)),
                    if checkin_deadline.is_some() =>
                {
                    self.check_status(self.checkin_period(), &last_checkin, &mut missed_checkins)
                        .await;
                    checkin_deadline = Some(Instant::now() + self.checkin_period());
                }
            }
        };

        stop_conn_info(&mut cis).await;
        result
    }

    /// Starts the managed service: `check`, falling back to `install`.
    ///
    /// The service then starts on its own under the OS service manager and is
    /// expected to check in.
    async fn start_service(&mut self, token: &CancellationToken) -> Result<(), OperationError> {
        let name = self.name.clone();
        self.force_comp_state(UnitState::Starting, format!("Starting: {name} service runtime"))
            .await;

        info!(service = %name, "checking if service is installed");
        match self.check(token).await {
            Ok(()) => Ok(()),
            Err(err) => {
                info!(service = %name, error = %err, "check failed, installing service");
                self.install(token).await
            }
        }
    }

    /// Runs the stop protocol and forces the component to `Stopped`.
    ///
    /// On teardown the managed service is nudged into a graceful stop when it
    /// has checked in (waiting up to one check-in period for a first check-in
    /// if necessary), then uninstalled. Uninstall errors are logged, never
    /// propagated: teardown always drives toward `Stopped`.
    async fn stop_service<C: Communicator>(
        &mut self,
        token: &CancellationToken,
        comm: &C,
        mut checked_in: bool,
        teardown: bool,
    ) {
        let name = self.name.clone();
        info!(service = %name, teardown, "stopping service runtime");

        if teardown {
            if self.state.is_running() {
                if !checked_in {
                    let timeout = self.checkin_period();
                    info!(service = %name, ?timeout, "service never checked in, awaiting check-in");
                    checked_in = await_checkin(token, comm, timeout).await;
                }

                if checked_in {
                    info!(service = %name, "service checked in, sending stopping state");
                    self.state.force_expected_state(UnitState::Stopping);
                    comm.checkin_expected(self.state.to_checkin_expected()).await;
                } else {
                    info!(service = %name, "service never checked in, proceeding to uninstall");
                }
            }

            info!(service = %name, "uninstalling service");
            if let Err(err) = self.uninstall(token).await {
                error!(service = %name, error = %err, "service uninstall failed");
            }
        }

        self.force_comp_state(UnitState::Stopped, format!("Stopped: {name} service runtime"))
            .await;
    }

    /// Merges a new component revision into the state.
    async fn process_new_comp<C: Communicator>(&mut self, comp: &Component, comm: &C) {
        debug!(service = %self.name, "observed component update");
        let send_expected = self.state.sync_expected(comp);
        let changed = self.state.sync_units(comp);
        if send_expected || self.state.unsettled() {
            comm.checkin_expected(self.state.to_checkin_expected()).await;
        }
        if changed {
            self.send_observed().await;
        }
    }

    /// Merges a check-in from the managed service into the state.
    async fn process_checkin<C: Communicator>(
        &mut self,
        checkin: &CheckinObserved,
        comm: &C,
        last_checkin: &mut Option<Instant>,
    ) {
        debug!(service = %self.name, units = checkin.units.len(), "observed check-in");
        let mut send_expected = false;
        let mut changed = false;

        if self.state.state == UnitState::Starting {
            // First observation after start.
            changed = self.state.comp_state(
                UnitState::Healthy,
                format!("Healthy: communicating with {} service", self.name),
            );
        }

        if !self.state.is_running() {
            return;
        }

        if last_checkin.is_none() {
            send_expected = true;
        }
        *last_checkin = Some(Instant::now());

        if self.state.sync_checkin(checkin) {
            changed = true;
        }
        if self.state.unsettled() {
            send_expected = true;
        }
        if send_expected {
            comm.checkin_expected(self.state.to_checkin_expected()).await;
        }
        if changed {
            self.send_observed().await;
        }
        if self.state.cleanup_stopped() {
            self.send_observed().await;
        }
    }

    /// Advances the missed-check-in ladder; called on every watchdog tick.
    async fn check_status(
        &mut self,
        checkin_period: Duration,
        last_checkin: &Option<Instant>,
        missed_checkins: &mut u32,
    ) {
        if !self.state.is_running() {
            return;
        }

        let missed_now = match last_checkin {
            None => true,
            Some(at) => Instant::now().duration_since(*at) > checkin_period,
        };
        if missed_now {
            *missed_checkins += 1;
        } else {
            *missed_checkins = 0;
        }

        if *missed_checkins == 0 {
            self.comp_state_for_misses(UnitState::Healthy, *missed_checkins).await;
        } else if *missed_checkins < MAX_CHECKIN_MISSES {
            self.comp_state_for_misses(UnitState::Degraded, *missed_checkins).await;
        } else {
            let msg = format!(
                "Failed: {} service missed {MAX_CHECKIN_MISSES} check-ins",
                self.name
            );
            self.force_comp_state(UnitState::Failed, msg).await;
        }
    }

    fn checkin_period(&self) -> Duration {
        match self.service.timeouts.checkin {
            0 => DEFAULT_CHECKIN_PERIOD,
            secs => Duration::from_secs(secs),
        }
    }

    async fn comp_state_for_misses(&mut self, state: UnitState, missed: u32) {
        let msg = match state {
            UnitState::Healthy => format!("Healthy: communicating with {} service", self.name),
            UnitState::Degraded if missed == 1 => {
                format!("Degraded: {} service missed 1 check-in", self.name)
            }
            UnitState::Degraded => format!("Degraded: {} missed {missed} check-ins", self.name),
            _ => STATE_UNKNOWN_MESSAGE.to_string(),
        };
        if self.state.comp_state(state, msg) {
            self.send_observed().await;
        }
    }

    async fn force_comp_state(&mut self, state: UnitState, msg: String) {
        if self.state.force_state(state, msg) {
            self.send_observed().await;
        }
    }

    async fn send_observed(&self) {
        let _ = self.observed_tx.send(self.state.clone()).await;
    }

    /// Runs the service `check` command, single-shot.
    async fn check(&self, token: &CancellationToken) -> Result<(), OperationError> {
        let Some(spec) = self.service.operations.check.clone() else {
            error!(service = %self.name, "missing check spec");
            return Err(OperationError::SpecUndefined);
        };
        debug!(service = %self.name, "checking if the service is installed");
        self.execute(token, &spec, false).await
    }

    /// Runs the service `install` command, retried indefinitely.
    async fn install(&self, token: &CancellationToken) -> Result<(), OperationError> {
        let Some(spec) = self.service.operations.install.clone() else {
            error!(service = %self.name, "missing install spec");
            return Err(OperationError::SpecUndefined);
        };
        debug!(service = %self.name, "installing service");
        self.execute(token, &spec, true).await
    }

    /// Runs the service `uninstall` command, retried indefinitely.
    async fn uninstall(&self, token: &CancellationToken) -> Result<(), OperationError> {
        let Some(spec) = self.service.operations.uninstall.clone() else {
            error!(service = %self.name, "missing uninstall spec");
            return Err(OperationError::SpecUndefined);
        };
        debug!(service = %self.name, "uninstalling service");
        self.execute(token, &spec, true).await
    }

    async fn execute(
        &self,
        token: &CancellationToken,
        spec: &CommandSpec,
        should_retry: bool,
    ) -> Result<(), OperationError> {
        self.ops
            .execute(token, &self.binary_path, spec, should_retry)
            .await
    }
}

/// Waits up to `timeout` for a check-in, serving cancellation.
async fn await_checkin<C: Communicator>(
    token: &CancellationToken,
    comm: &C,
    timeout: Duration,
) -> bool {
    tokio::select! {
        _ = token.cancelled() => {
            debug!("await check-in cancelled");
            false
        }
        _ = time::sleep(timeout) => {
            debug!("await check-in timed out");
            false
        }
        checkin = comm.checkin_observed() => checkin.is_some(),
    }
}

/// Stops and releases the connection-info server, if one is running.
async fn stop_conn_info(cis: &mut Option<ConnInfoServer>) {
    if let Some(mut server) = cis.take() {
        server.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comms::{CheckinExpected, ObservedUnit};
    use crate::component::{InputSpec, Unit, UnitKey, UnitKind};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Mutex;
    use tokio::task::JoinHandle;

    struct MockComm {
        observed_tx: mpsc::Sender<CheckinObserved>,
        observed_rx: tokio::sync::Mutex<mpsc::Receiver<CheckinObserved>>,
        expected: Mutex<Vec<CheckinExpected>>,
    }

    impl MockComm {
        fn new() -> Arc<Self> {
            let (observed_tx, observed_rx) = mpsc::channel(8);
            Arc::new(Self {
                observed_tx,
                observed_rx: tokio::sync::Mutex::new(observed_rx),
                expected: Mutex::new(Vec::new()),
            })
        }

        async fn send_checkin(&self, checkin: CheckinObserved) {
            let _ = self.observed_tx.send(checkin).await;
        }

        fn expected(&self) -> Vec<CheckinExpected> {
            self.expected.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Communicator for MockComm {
        fn conn_info(&self) -> Vec<u8> {
            b"mock-conn-info".to_vec()
        }

        async fn checkin_observed(&self) -> Option<CheckinObserved> {
            self.observed_rx.lock().await.recv().await
        }

        async fn checkin_expected(&self, expected: CheckinExpected) {
            self.expected.lock().unwrap().push(expected);
        }
    }

    struct MockOps {
        fail: Mutex<HashSet<String>>,
        calls: Mutex<Vec<(String, bool)>>,
    }

    impl MockOps {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fail: Mutex::new(HashSet::new()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn fail_op(&self, op: &str) {
            self.fail.lock().unwrap().insert(op.to_string());
        }

        fn calls(&self) -> Vec<(String, bool)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ServiceOps for MockOps {
        async fn execute(
            &self,
            _token: &CancellationToken,
            _binary_path: &Path,
            spec: &CommandSpec,
            should_retry: bool,
        ) -> Result<(), OperationError> {
            let op = spec.args.first().cloned().unwrap_or_default();
            self.calls.lock().unwrap().push((op.clone(), should_retry));
            if self.fail.lock().unwrap().contains(&op) {
                Err(OperationError::Io(std::io::Error::other("mock failure")))
            } else {
                Ok(())
            }
        }
    }

    fn endpoint_component() -> Component {
        let service = ServiceSpec::from_yaml(
            "
            cport: 0
            operations:
              check:
                args: [check]
              install:
                args: [install]
              uninstall:
                args: [uninstall]
            ",
        )
        .unwrap();
        Component::new(InputSpec::new("endpoint", "/opt/endpoint/bin/endpoint", service))
            .with_units(vec![Unit::new("monitor", UnitKind::Input, json!({"interval": 5}))])
    }

    fn monitor_checkin(state: UnitState) -> CheckinObserved {
        CheckinObserved {
            units: vec![ObservedUnit {
                key: UnitKey {
                    kind: UnitKind::Input,
                    id: "monitor".to_string(),
                },
                state,
                message: state.to_string(),
                config_revision: 1,
            }],
        }
    }

    struct Fixture {
        handle: RuntimeHandle,
        watch: mpsc::Receiver<ComponentState>,
        comm: Arc<MockComm>,
        ops: Arc<MockOps>,
        token: CancellationToken,
        join: JoinHandle<Result<(), RuntimeError>>,
    }

    impl Fixture {
        fn spawn(comp: Component) -> Self {
            let ops = MockOps::new();
            let comm = MockComm::new();
            let token = CancellationToken::new();

            let mut runtime = ServiceRuntime::new(comp)
                .unwrap()
                .with_ops(ops.clone() as Arc<dyn ServiceOps>);
            let handle = runtime.handle();
            let watch = runtime.watch();

            let run_token = token.clone();
            let run_comm = comm.clone();
            let join = tokio::spawn(async move { runtime.run(run_token, &*run_comm).await });

            Self {
                handle,
                watch,
                comm,
                ops,
                token,
                join,
            }
        }

        async fn next_observed(&mut self) -> ComponentState {
            self.watch.recv().await.expect("watch channel closed")
        }

        async fn shutdown(self) {
            self.token.cancel();
            let result = self.join.await.expect("runtime task panicked");
            assert_eq!(result, Err(RuntimeError::Canceled));
        }
    }

    #[test]
    fn test_rejects_shipper_component() {
        let comp = endpoint_component().with_shipper(crate::component::ShipperSpec {
            name: "shipper".to_string(),
        });
        assert_eq!(ServiceRuntime::new(comp).err(), Some(SpecError::ShipperUnsupported));
    }

    #[test]
    fn test_rejects_missing_input_spec() {
        let mut comp = endpoint_component();
        comp.input = None;
        assert_eq!(ServiceRuntime::new(comp).err(), Some(SpecError::MissingInputSpec));
    }

    #[test]
    fn test_rejects_missing_service_block() {
        let mut comp = endpoint_component();
        if let Some(input) = comp.input.as_mut() {
            input.service = None;
        }
        assert_eq!(ServiceRuntime::new(comp).err(), Some(SpecError::MissingServiceSpec));
    }

    #[test]
    fn test_initial_state_is_stopped() {
        let runtime = ServiceRuntime::new(endpoint_component()).unwrap();
        assert_eq!(runtime.state().state, UnitState::Stopped);
        assert_eq!(runtime.state().message, "Stopped: endpoint service");
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let comm = MockComm::new();
        let mut runtime = ServiceRuntime::new(endpoint_component()).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let first = runtime.run(token.clone(), &*comm).await;
        assert_eq!(first, Err(RuntimeError::Canceled));
        let second = runtime.run(token, &*comm).await;
        assert_eq!(second, Err(RuntimeError::AlreadyRunning));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_to_healthy_on_first_checkin() {
        let mut fx = Fixture::spawn(endpoint_component());

        fx.handle.start();
        let observed = fx.next_observed().await;
        assert_eq!(observed.state, UnitState::Starting);
        assert_eq!(observed.message, "Starting: endpoint service runtime");

        fx.comm.send_checkin(monitor_checkin(UnitState::Healthy)).await;
        let observed = fx.next_observed().await;
        assert_eq!(observed.state, UnitState::Healthy);
        assert_eq!(observed.message, "Healthy: communicating with endpoint service");

        // First check-in always pushes the expected snapshot back.
        assert!(!fx.comm.expected().is_empty());
        assert_eq!(fx.ops.calls(), vec![("check".to_string(), false)]);

        fx.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_check_falls_back_to_install() {
        let comp = endpoint_component();
        let mut fx = Fixture::spawn(comp);
        fx.ops.fail_op("check");

        fx.handle.start();
        let observed = fx.next_observed().await;
        assert_eq!(observed.state, UnitState::Starting);

        fx.comm.send_checkin(monitor_checkin(UnitState::Healthy)).await;
        let observed = fx.next_observed().await;
        assert_eq!(observed.state, UnitState::Healthy);

        assert_eq!(
            fx.ops.calls(),
            vec![("check".to_string(), false), ("install".to_string(), true)]
        );

        fx.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_install_forces_failed() {
        let mut fx = Fixture::spawn(endpoint_component());
        fx.ops.fail_op("check");
        fx.ops.fail_op("install");

        fx.handle.start();
        let observed = fx.next_observed().await;
        assert_eq!(observed.state, UnitState::Starting);

        let observed = fx.next_observed().await;
        assert_eq!(observed.state, UnitState::Failed);
        assert!(observed.message.starts_with("failed to start endpoint service"));

        fx.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_degradation_ladder_to_failure() {
        let mut fx = Fixture::spawn(endpoint_component());

        fx.handle.start();
        assert_eq!(fx.next_observed().await.state, UnitState::Starting);
        fx.comm.send_checkin(monitor_checkin(UnitState::Healthy)).await;
        assert_eq!(fx.next_observed().await.state, UnitState::Healthy);

        // No further check-ins: each watchdog tick climbs the ladder.
        let observed = fx.next_observed().await;
        assert_eq!(observed.state, UnitState::Degraded);
        assert_eq!(observed.message, "Degraded: endpoint service missed 1 check-in");

        let observed = fx.next_observed().await;
        assert_eq!(observed.state, UnitState::Degraded);
        assert_eq!(observed.message, "Degraded: endpoint missed 2 check-ins");

        let observed = fx.next_observed().await;
        assert_eq!(observed.state, UnitState::Failed);
        assert_eq!(observed.message, "Failed: endpoint service missed 3 check-ins");

        fx.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkins_keep_component_healthy() {
        let mut fx = Fixture::spawn(endpoint_component());

        fx.handle.start();
        assert_eq!(fx.next_observed().await.state, UnitState::Starting);
        fx.comm.send_checkin(monitor_checkin(UnitState::Healthy)).await;
        assert_eq!(fx.next_observed().await.state, UnitState::Healthy);

        // A check-in right before the tick resets the miss counter; after one
        // silent period the component only degrades once.
        fx.comm.send_checkin(monitor_checkin(UnitState::Healthy)).await;
        let observed = fx.next_observed().await;
        assert_eq!(observed.state, UnitState::Degraded);
        assert_eq!(observed.message, "Degraded: endpoint service missed 1 check-in");

        fx.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_writer_wins_on_actions() {
        let ops = MockOps::new();
        let comm = MockComm::new();
        let token = CancellationToken::new();

        let mut runtime = ServiceRuntime::new(endpoint_component())
            .unwrap()
            .with_ops(ops.clone() as Arc<dyn ServiceOps>);
        let handle = runtime.handle();
        let mut watch = runtime.watch();

        // Both actions are enqueued before the loop observes either: the
        // pending start is replaced and only the stop is seen.
        handle.start();
        handle.stop();

        let run_comm = comm.clone();
        let run_token = token.clone();
        let join = tokio::spawn(async move { runtime.run(run_token, &*run_comm).await });

        let observed = watch.recv().await.unwrap();
        assert_eq!(observed.state, UnitState::Stopped);
        assert_eq!(observed.message, "Stopped: endpoint service runtime");
        assert!(ops.calls().is_empty());

        token.cancel();
        let _ = join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_start_reruns_check() {
        let mut fx = Fixture::spawn(endpoint_component());

        fx.handle.start();
        assert_eq!(fx.next_observed().await.state, UnitState::Starting);

        // Second start while already starting: conn-info server is recreated
        // and check re-run; the state does not change again.
        fx.handle.start();
        tokio::task::yield_now().await;

        fx.comm.send_checkin(monitor_checkin(UnitState::Healthy)).await;
        assert_eq!(fx.next_observed().await.state, UnitState::Healthy);
        assert_eq!(
            fx.ops.calls(),
            vec![("check".to_string(), false), ("check".to_string(), false)]
        );

        fx.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_after_checkin_sends_stopping() {
        let mut fx = Fixture::spawn(endpoint_component());

        fx.handle.start();
        assert_eq!(fx.next_observed().await.state, UnitState::Starting);
        fx.comm.send_checkin(monitor_checkin(UnitState::Healthy)).await;
        assert_eq!(fx.next_observed().await.state, UnitState::Healthy);

        fx.handle.teardown();
        let observed = fx.next_observed().await;
        assert_eq!(observed.state, UnitState::Stopped);
        assert_eq!(observed.message, "Stopped: endpoint service runtime");

        let expected = fx.comm.expected();
        assert_eq!(expected.last().unwrap().state, UnitState::Stopping);
        assert!(fx.ops.calls().contains(&("uninstall".to_string(), true)));

        fx.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_without_checkin_uninstalls_anyway() {
        let mut fx = Fixture::spawn(endpoint_component());

        fx.handle.start();
        assert_eq!(fx.next_observed().await.state, UnitState::Starting);

        // No check-in ever arrives; after waiting one check-in period the
        // teardown proceeds straight to uninstall.
        fx.handle.teardown();
        let observed = fx.next_observed().await;
        assert_eq!(observed.state, UnitState::Stopped);
        assert_eq!(observed.message, "Stopped: endpoint service runtime");

        assert!(fx.comm.expected().iter().all(|e| e.state != UnitState::Stopping));
        assert!(fx.ops.calls().contains(&("uninstall".to_string(), true)));

        fx.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_reaches_stopped_despite_uninstall_failure() {
        let mut fx = Fixture::spawn(endpoint_component());
        fx.ops.fail_op("uninstall");

        fx.handle.start();
        assert_eq!(fx.next_observed().await.state, UnitState::Starting);
        fx.comm.send_checkin(monitor_checkin(UnitState::Healthy)).await;
        assert_eq!(fx.next_observed().await.state, UnitState::Healthy);

        fx.handle.teardown();
        let observed = fx.next_observed().await;
        assert_eq!(observed.state, UnitState::Stopped);

        fx.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_is_idempotent() {
        let mut fx = Fixture::spawn(endpoint_component());

        let revised = endpoint_component().with_units(vec![
            Unit::new("monitor", UnitKind::Input, json!({"interval": 5})),
            Unit::new("poller", UnitKind::Input, json!({"interval": 60})),
        ]);

        fx.handle.update(revised.clone());
        let observed = fx.next_observed().await;
        assert_eq!(observed.units.len(), 2);
        let first_push = fx.comm.expected();
        assert!(!first_push.is_empty());

        // The same revision again changes nothing observable: no new
        // observation, and any expected snapshot re-sent is identical.
        fx.handle.update(revised);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(fx.watch.try_recv().is_err());
        let pushes = fx.comm.expected();
        assert_eq!(pushes.last(), first_push.last());

        fx.shutdown().await;
    }
}
