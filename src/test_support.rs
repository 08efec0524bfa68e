//! Test support utilities shared across unit and integration tests.

use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::future::ready;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::backend::{
    Backend, BackendFuture, DEFAULT_NETWORK, FirewallRule, Instance, InstanceRef, InstanceSpec,
    InstanceStatus, OperationHandle, OperationScope, OperationStatus, ProjectInfo, ProviderError,
    ProviderErrorKind, ZoneInfo,
};
use crate::reroll::{SleepFuture, Sleeper};
use crate::remote::{CommandOutput, CommandRunner, RemoteError};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<Result<CommandOutput, RemoteError>>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_exit_code(0);
    }

    /// Pushes a specific exit code.
    pub fn push_exit_code(&self, code: i32) {
        self.push_failure_output(code, "");
    }

    /// Pushes an exit code together with captured standard error.
    pub fn push_failure_output(&self, code: i32, stderr: &str) {
        lock(&self.responses).push_back(Ok(CommandOutput {
            code: Some(code),
            stderr: stderr.to_owned(),
        }));
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        lock(&self.responses).push_back(Ok(CommandOutput {
            code: None,
            stderr: String::new(),
        }));
    }

    /// Pushes a launch failure.
    pub fn push_spawn_failure(&self, message: &str) {
        lock(&self.responses).push_back(Err(RemoteError::Spawn {
            program: String::from("scripted"),
            message: message.to_owned(),
        }));
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| {
                Err(RemoteError::Spawn {
                    program: program.to_owned(),
                    message: String::from("no scripted response available"),
                })
            })
    }
}

/// Sleeper that records requested durations and returns immediately.
#[derive(Clone, Debug, Default)]
pub struct RecordingSleeper {
    naps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Creates a sleeper with no recorded naps.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every requested duration in order.
    #[must_use]
    pub fn naps(&self) -> Vec<Duration> {
        lock(&self.naps).clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        lock(&self.naps).push(duration);
        Box::pin(ready(()))
    }
}

/// Provider call kinds that can be made to fail.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FakeOp {
    /// [`Backend::get_instance`].
    GetInstance,
    /// [`Backend::list_instances`].
    ListInstances,
    /// [`Backend::insert_instance`].
    InsertInstance,
    /// [`Backend::delete_instance`].
    DeleteInstance,
    /// [`Backend::start_instance`].
    StartInstance,
    /// [`Backend::stop_instance`].
    StopInstance,
    /// [`Backend::delete_disk`].
    DeleteDisk,
    /// [`Backend::image_from_family`].
    ImageFromFamily,
    /// [`Backend::insert_firewall`].
    InsertFirewall,
    /// [`Backend::delete_firewall`].
    DeleteFirewall,
    /// [`Backend::list_zones`].
    ListZones,
    /// [`Backend::search_projects`].
    SearchProjects,
}

/// Call recorded by [`FakeBackend`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BackendCall {
    /// Instance read.
    GetInstance {
        /// Instance name.
        name: String,
    },
    /// Aggregated instance listing.
    ListInstances,
    /// Instance insert.
    InsertInstance {
        /// Full insert payload.
        spec: InstanceSpec,
    },
    /// Instance delete.
    DeleteInstance {
        /// Instance name.
        name: String,
    },
    /// Instance start.
    StartInstance {
        /// Instance name.
        name: String,
    },
    /// Instance stop.
    StopInstance {
        /// Instance name.
        name: String,
    },
    /// Disk delete.
    DeleteDisk {
        /// Disk name.
        name: String,
    },
    /// Image family lookup.
    ImageFromFamily {
        /// Image family.
        family: String,
    },
    /// Firewall insert.
    InsertFirewall {
        /// Full rule payload.
        rule: FirewallRule,
    },
    /// Firewall delete.
    DeleteFirewall {
        /// Rule name.
        name: String,
    },
    /// Operation wait.
    WaitOperation {
        /// Operation name.
        name: String,
    },
    /// Zone listing.
    ListZones,
    /// Project search.
    SearchProjects,
}

impl BackendCall {
    /// Returns `true` for calls that change provider state.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::InsertInstance { .. }
                | Self::DeleteInstance { .. }
                | Self::StartInstance { .. }
                | Self::StopInstance { .. }
                | Self::DeleteDisk { .. }
                | Self::InsertFirewall { .. }
                | Self::DeleteFirewall { .. }
        )
    }
}

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<BackendCall>,
    snapshots: VecDeque<Instance>,
    current: Option<Instance>,
    instances: Vec<Instance>,
    zones: Vec<ZoneInfo>,
    projects: Vec<ProjectInfo>,
    failures: Vec<(FakeOp, Option<String>, ProviderError)>,
    operation_failures: HashMap<FakeOp, ProviderError>,
    pending_operations: HashMap<String, (u32, Result<(), ProviderError>)>,
    pending_rounds: u32,
    next_operation: u64,
}

/// In-memory [`Backend`] that records every call.
///
/// Instance reads pop scripted snapshots in FIFO order and keep returning the
/// last one once the queue is drained. Mutations succeed unless a failure was
/// registered with [`FakeBackend::fail`] (call rejected) or
/// [`FakeBackend::fail_operation`] (operation finishes with an error).
#[derive(Clone, Debug, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    /// Creates a backend with no instances.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend whose instance reads return `instance`.
    #[must_use]
    pub fn with_instance(instance: Instance) -> Self {
        let backend = Self::new();
        backend.state().current = Some(instance);
        backend
    }

    /// Queues an instance snapshot for the next read.
    pub fn push_instance(&self, instance: Instance) {
        self.state().snapshots.push_back(instance);
    }

    /// Sets the result of the aggregated listing.
    pub fn set_instances(&self, instances: Vec<Instance>) {
        self.state().instances = instances;
    }

    /// Sets the result of the zone listing.
    pub fn set_zones(&self, zones: Vec<ZoneInfo>) {
        self.state().zones = zones;
    }

    /// Sets the result of the project search.
    pub fn set_projects(&self, projects: Vec<ProjectInfo>) {
        self.state().projects = projects;
    }

    /// Makes `op` calls fail; `target` narrows the failure to one resource name.
    pub fn fail(&self, op: FakeOp, target: Option<&str>, error: ProviderError) {
        self.state()
            .failures
            .push((op, target.map(str::to_owned), error));
    }

    /// Makes operations issued by `op` finish with `error`.
    pub fn fail_operation(&self, op: FakeOp, error: ProviderError) {
        self.state().operation_failures.insert(op, error);
    }

    /// Number of pending rounds every wait reports before completing.
    pub fn set_pending_rounds(&self, rounds: u32) {
        self.state().pending_rounds = rounds;
    }

    /// Returns every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state().calls.clone()
    }

    /// Returns only the state-changing calls.
    #[must_use]
    pub fn mutations(&self) -> Vec<BackendCall> {
        self.calls()
            .into_iter()
            .filter(BackendCall::is_mutation)
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        lock(&self.state)
    }

    fn check(&self, op: FakeOp, target: &str, call: BackendCall) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.calls.push(call);
        let failure = state
            .failures
            .iter()
            .find(|(failed_op, failed_target, _)| {
                *failed_op == op && failed_target.as_deref().is_none_or(|name| name == target)
            })
            .map(|(_, _, error)| error.clone());
        failure.map_or(Ok(()), Err)
    }

    fn issue(
        &self,
        op: FakeOp,
        target: &str,
        call: BackendCall,
        project: &str,
        scope: OperationScope,
    ) -> Result<OperationHandle, ProviderError> {
        self.check(op, target, call)?;
        let mut state = self.state();
        state.next_operation = state.next_operation.saturating_add(1);
        let name = format!("operation-{}", state.next_operation);
        let outcome = state
            .operation_failures
            .get(&op)
            .cloned()
            .map_or(Ok(()), Err);
        let rounds = state.pending_rounds;
        state.pending_operations.insert(name.clone(), (rounds, outcome));
        Ok(OperationHandle {
            name,
            project: project.to_owned(),
            scope,
        })
    }

    fn read_instance(&self, instance: &InstanceRef) -> Result<Instance, ProviderError> {
        let mut state = self.state();
        if let Some(next) = state.snapshots.pop_front() {
            state.current = Some(next);
        }
        state.current.clone().ok_or_else(|| {
            ProviderError::new(
                ProviderErrorKind::NotFound,
                format!("instance {} not found", instance.name),
            )
        })
    }
}

impl Backend for FakeBackend {
    fn get_instance<'a>(
        &'a self,
        _project: &'a str,
        instance: &'a InstanceRef,
    ) -> BackendFuture<'a, Instance> {
        let result = self
            .check(
                FakeOp::GetInstance,
                &instance.name,
                BackendCall::GetInstance {
                    name: instance.name.clone(),
                },
            )
            .and_then(|()| self.read_instance(instance));
        Box::pin(ready(result))
    }

    fn list_instances<'a>(&'a self, _project: &'a str) -> BackendFuture<'a, Vec<Instance>> {
        let result = self
            .check(FakeOp::ListInstances, "", BackendCall::ListInstances)
            .map(|()| self.state().instances.clone());
        Box::pin(ready(result))
    }

    fn insert_instance<'a>(
        &'a self,
        project: &'a str,
        spec: &'a InstanceSpec,
    ) -> BackendFuture<'a, OperationHandle> {
        let result = self.issue(
            FakeOp::InsertInstance,
            &spec.name,
            BackendCall::InsertInstance { spec: spec.clone() },
            project,
            OperationScope::Zone(spec.zone.clone()),
        );
        Box::pin(ready(result))
    }

    fn delete_instance<'a>(
        &'a self,
        project: &'a str,
        instance: &'a InstanceRef,
    ) -> BackendFuture<'a, OperationHandle> {
        let result = self.issue(
            FakeOp::DeleteInstance,
            &instance.name,
            BackendCall::DeleteInstance {
                name: instance.name.clone(),
            },
            project,
            OperationScope::Zone(instance.zone.clone()),
        );
        Box::pin(ready(result))
    }

    fn start_instance<'a>(
        &'a self,
        project: &'a str,
        instance: &'a InstanceRef,
    ) -> BackendFuture<'a, OperationHandle> {
        let result = self.issue(
            FakeOp::StartInstance,
            &instance.name,
            BackendCall::StartInstance {
                name: instance.name.clone(),
            },
            project,
            OperationScope::Zone(instance.zone.clone()),
        );
        Box::pin(ready(result))
    }

    fn stop_instance<'a>(
        &'a self,
        project: &'a str,
        instance: &'a InstanceRef,
    ) -> BackendFuture<'a, OperationHandle> {
        let result = self.issue(
            FakeOp::StopInstance,
            &instance.name,
            BackendCall::StopInstance {
                name: instance.name.clone(),
            },
            project,
            OperationScope::Zone(instance.zone.clone()),
        );
        Box::pin(ready(result))
    }

    fn delete_disk<'a>(
        &'a self,
        project: &'a str,
        zone: &'a str,
        disk: &'a str,
    ) -> BackendFuture<'a, OperationHandle> {
        let result = self.issue(
            FakeOp::DeleteDisk,
            disk,
            BackendCall::DeleteDisk {
                name: disk.to_owned(),
            },
            project,
            OperationScope::Zone(zone.to_owned()),
        );
        Box::pin(ready(result))
    }

    fn image_from_family<'a>(
        &'a self,
        image_project: &'a str,
        family: &'a str,
    ) -> BackendFuture<'a, String> {
        let result = self
            .check(
                FakeOp::ImageFromFamily,
                family,
                BackendCall::ImageFromFamily {
                    family: family.to_owned(),
                },
            )
            .map(|()| format!("projects/{image_project}/global/images/{family}-fake"));
        Box::pin(ready(result))
    }

    fn insert_firewall<'a>(
        &'a self,
        project: &'a str,
        rule: &'a FirewallRule,
    ) -> BackendFuture<'a, OperationHandle> {
        let result = self.issue(
            FakeOp::InsertFirewall,
            &rule.name,
            BackendCall::InsertFirewall { rule: rule.clone() },
            project,
            OperationScope::Global,
        );
        Box::pin(ready(result))
    }

    fn delete_firewall<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> BackendFuture<'a, OperationHandle> {
        let result = self.issue(
            FakeOp::DeleteFirewall,
            name,
            BackendCall::DeleteFirewall {
                name: name.to_owned(),
            },
            project,
            OperationScope::Global,
        );
        Box::pin(ready(result))
    }

    fn wait_operation<'a>(
        &'a self,
        handle: &'a OperationHandle,
    ) -> BackendFuture<'a, OperationStatus> {
        let mut state = self.state();
        state.calls.push(BackendCall::WaitOperation {
            name: handle.name.clone(),
        });
        let status = match state.pending_operations.remove(&handle.name) {
            Some((rounds, outcome)) if rounds > 0 => {
                state
                    .pending_operations
                    .insert(handle.name.clone(), (rounds - 1, outcome));
                OperationStatus::Pending
            }
            Some((_, outcome)) => OperationStatus::Done(outcome),
            None => OperationStatus::Done(Ok(())),
        };
        drop(state);
        Box::pin(ready(Ok(status)))
    }

    fn list_zones<'a>(&'a self, _project: &'a str) -> BackendFuture<'a, Vec<ZoneInfo>> {
        let result = self
            .check(FakeOp::ListZones, "", BackendCall::ListZones)
            .map(|()| self.state().zones.clone());
        Box::pin(ready(result))
    }

    fn search_projects(&self) -> BackendFuture<'_, Vec<ProjectInfo>> {
        let result = self
            .check(FakeOp::SearchProjects, "", BackendCall::SearchProjects)
            .map(|()| self.state().projects.clone());
        Box::pin(ready(result))
    }
}

/// Builds an instance snapshot with sensible defaults for tests.
#[must_use]
pub fn instance(name: &str, status: InstanceStatus, cpu_platform: &str) -> Instance {
    Instance {
        name: name.to_owned(),
        zone: String::from("us-west1-b"),
        status,
        cpu_platform: cpu_platform.to_owned(),
        network: String::from(DEFAULT_NETWORK),
        internal_ip: Some(String::from("10.138.0.2")),
        external_ip: Some(String::from("203.0.113.10")),
        disks: vec![name.to_owned()],
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
