//! Shared fixtures for reroll BDD scenarios.

use gcevm::backend::{InstanceRef, InstanceStatus};
use gcevm::reroll::RerollPolicy;
use gcevm::test_support::{FakeBackend, RecordingSleeper, instance};
use gcevm::{RerollSummary, Session};
use rstest::fixture;

#[derive(Clone, Debug)]
pub enum RerollOutcome {
    Success(RerollSummary),
    Failure(String),
}

#[derive(Clone, Debug)]
pub struct RerollContext {
    pub backend: FakeBackend,
    pub sleeper: RecordingSleeper,
    pub session: Option<Session>,
    pub policy: RerollPolicy,
    pub outcome: Option<RerollOutcome>,
}

#[fixture]
pub fn reroll_context() -> RerollContext {
    RerollContext {
        backend: FakeBackend::new(),
        sleeper: RecordingSleeper::new(),
        session: None,
        policy: RerollPolicy::default(),
        outcome: None,
    }
}

pub fn select(project: &str, name: &str) -> Session {
    Session::new(project).with_instance(InstanceRef::new(name, "us-west1-b"))
}

/// Each attempt reads the instance twice: once before starting it and once
/// when polling for the platform.
pub fn queue_attempt(backend: &FakeBackend, name: &str, platform: &str) {
    let snapshot = instance(name, InstanceStatus::Running, platform);
    backend.push_instance(snapshot.clone());
    backend.push_instance(snapshot);
}
