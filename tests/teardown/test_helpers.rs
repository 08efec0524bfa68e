//! Shared fixtures for teardown BDD scenarios.

use gcevm::backend::{InstanceRef, InstanceStatus, ProviderError, ProviderErrorKind};
use gcevm::test_support::{FakeBackend, instance};
use gcevm::{Report, Session, TeardownReport};
use rstest::fixture;

#[derive(Clone, Debug)]
pub enum TeardownOutcome {
    Finished(TeardownReport),
    Failure(String),
}

#[derive(Clone, Debug)]
pub struct TeardownContext {
    pub backend: FakeBackend,
    pub session: Option<Session>,
    pub report: Report,
    pub outcome: Option<TeardownOutcome>,
}

#[fixture]
pub fn teardown_context() -> TeardownContext {
    TeardownContext {
        backend: FakeBackend::new(),
        session: None,
        report: Report::new(),
        outcome: None,
    }
}

pub fn select(project: &str, name: &str) -> Session {
    Session::new(project).with_instance(InstanceRef::new(name, "us-west1-b"))
}

pub fn backend_with_disks(name: &str, disks: &str) -> FakeBackend {
    let mut snapshot = instance(name, InstanceStatus::Running, "AMD Rome");
    snapshot.disks = disks
        .split(',')
        .map(str::trim)
        .filter(|disk| !disk.is_empty())
        .map(str::to_owned)
        .collect();
    FakeBackend::with_instance(snapshot)
}

pub fn not_found(what: &str) -> ProviderError {
    ProviderError::new(ProviderErrorKind::NotFound, format!("{what} was not found"))
}
