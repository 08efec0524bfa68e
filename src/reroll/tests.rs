//! Unit tests for the CPU reroll state machine.

use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::backend::{InstanceRef, InstanceStatus, ProviderErrorKind, UNKNOWN_CPU_PLATFORM};
use crate::test_support::{BackendCall, FakeBackend, FakeOp, RecordingSleeper, instance};

#[fixture]
fn session() -> Session {
    Session::new("proj").with_instance(InstanceRef::new("vm", "us-west1-b"))
}

fn running(cpu: &str) -> crate::backend::Instance {
    instance("vm", InstanceStatus::Running, cpu)
}

fn position(calls: &[BackendCall], wanted: impl Fn(&BackendCall) -> bool) -> Option<usize> {
    calls.iter().position(wanted)
}

#[rstest]
#[case("amd64xyz", true)]
#[case("AMD EPYC 7B12", true)]
#[case("AMD Rome", true)]
#[case("ARM Processor", false)]
#[case("Intel Broadwell", false)]
#[case(UNKNOWN_CPU_PLATFORM, false)]
#[case("", false)]
fn acceptance_is_case_insensitive_substring(#[case] platform: &str, #[case] expected: bool) {
    assert_eq!(accepts_platform(platform, TARGET_PLATFORM), expected);
    assert_eq!(RerollPolicy::default().accepts(platform), expected);
}

#[rstest]
#[tokio::test]
async fn stopped_instance_gets_exactly_one_start_before_first_poll(session: Session) {
    let backend = FakeBackend::new();
    backend.push_instance(instance("vm", InstanceStatus::Terminated, UNKNOWN_CPU_PLATFORM));
    backend.push_instance(running("AMD Rome"));
    let sleeper = RecordingSleeper::new();

    let summary = CpuReroller::new(&backend, sleeper.clone())
        .run(&session)
        .await
        .unwrap_or_else(|err| panic!("reroll should succeed: {err}"));

    assert_eq!(summary.platform, "AMD Rome");
    assert_eq!(summary.attempts, 1);
    let calls = backend.calls();
    let starts = calls
        .iter()
        .filter(|call| matches!(call, BackendCall::StartInstance { .. }))
        .count();
    assert_eq!(starts, 1, "exactly one start expected: {calls:?}");

    let start = position(&calls, |call| matches!(call, BackendCall::StartInstance { .. }))
        .unwrap_or_else(|| panic!("start missing: {calls:?}"));
    let first_poll = calls
        .iter()
        .enumerate()
        .filter(|(_, call)| matches!(call, BackendCall::GetInstance { .. }))
        .map(|(index, _)| index)
        .nth(1)
        .unwrap_or_else(|| panic!("poll missing: {calls:?}"));
    assert!(start < first_poll, "start must precede the first poll: {calls:?}");
    assert!(sleeper.naps().is_empty(), "accepted on first poll without sleeping");
}

#[rstest]
#[tokio::test]
async fn running_instance_is_not_started(session: Session) {
    let backend = FakeBackend::with_instance(running("AMD EPYC 7B12"));

    let summary = CpuReroller::new(&backend, RecordingSleeper::new())
        .run(&session)
        .await
        .unwrap_or_else(|err| panic!("reroll should succeed: {err}"));

    assert_eq!(summary.platform, "AMD EPYC 7B12");
    assert!(backend.mutations().is_empty(), "no mutation expected");
}

#[rstest]
#[tokio::test]
async fn placeholder_keeps_polling_until_budget_is_spent(session: Session) {
    let backend = FakeBackend::new();
    // attempt 1: entry read + 60 polls that never publish a platform
    for _ in 0..=MAX_POLLS {
        backend.push_instance(running(UNKNOWN_CPU_PLATFORM));
    }
    // attempt 2: entry read + first poll
    backend.push_instance(running("AMD Milan"));
    let sleeper = RecordingSleeper::new();

    let summary = CpuReroller::new(&backend, sleeper.clone())
        .run(&session)
        .await
        .unwrap_or_else(|err| panic!("reroll should succeed: {err}"));

    assert_eq!(summary.attempts, 2);
    let first = summary
        .history
        .first()
        .unwrap_or_else(|| panic!("history should not be empty"));
    assert_eq!(first.outcome, PollOutcome::TimedOut);
    assert_eq!(first.decision, Decision::Reset);

    // 59 pauses between the 60 polls, then one reset pause
    let naps = sleeper.naps();
    assert_eq!(naps.len(), 60);
    assert!(naps.iter().all(|nap| *nap >= Duration::from_secs(2)));

    let reads = backend
        .calls()
        .iter()
        .filter(|call| matches!(call, BackendCall::GetInstance { .. }))
        .count();
    assert_eq!(reads, 1 + 60 + 2, "entry + 60 polls, then entry + 1 poll");
}

#[rstest]
#[tokio::test]
async fn instability_ends_the_poll_early_and_resets(session: Session) {
    let backend = FakeBackend::new();
    backend.push_instance(running(UNKNOWN_CPU_PLATFORM));
    backend.push_instance(instance(
        "vm",
        InstanceStatus::Other(String::from("STOPPING")),
        UNKNOWN_CPU_PLATFORM,
    ));
    backend.push_instance(instance("vm", InstanceStatus::Stopped, UNKNOWN_CPU_PLATFORM));
    backend.push_instance(running("AMD Rome"));
    let sleeper = RecordingSleeper::new();

    let summary = CpuReroller::new(&backend, sleeper.clone())
        .run(&session)
        .await
        .unwrap_or_else(|err| panic!("reroll should succeed: {err}"));

    assert_eq!(summary.attempts, 2);
    assert!(matches!(
        summary.history.first().map(|record| &record.outcome),
        Some(PollOutcome::Unstable(InstanceStatus::Other(_)))
    ));
    let mutations = backend.mutations();
    assert_eq!(
        mutations,
        vec![
            BackendCall::StopInstance {
                name: String::from("vm")
            },
            BackendCall::StartInstance {
                name: String::from("vm")
            },
        ]
    );
    assert_eq!(sleeper.naps(), vec![RESET_PAUSE]);
}

#[rstest]
#[tokio::test]
async fn rejected_platform_cycles_until_accepted(session: Session) {
    let backend = FakeBackend::new();
    backend.push_instance(running("Intel Broadwell"));
    backend.push_instance(running("Intel Broadwell"));
    backend.push_instance(running("ARM Processor"));
    backend.push_instance(running("ARM Processor"));
    backend.push_instance(running("AMD Rome"));

    let summary = CpuReroller::new(&backend, RecordingSleeper::new())
        .run(&session)
        .await
        .unwrap_or_else(|err| panic!("reroll should succeed: {err}"));

    assert_eq!(summary.attempts, 3);
    let decisions: Vec<_> = summary
        .history
        .iter()
        .map(|record| (record.attempt, record.decision))
        .collect();
    assert_eq!(
        decisions,
        vec![
            (1, Decision::Reset),
            (2, Decision::Reset),
            (3, Decision::Accept)
        ]
    );
    let stops = backend
        .mutations()
        .iter()
        .filter(|call| matches!(call, BackendCall::StopInstance { .. }))
        .count();
    assert_eq!(stops, 2);
}

#[rstest]
#[tokio::test]
async fn custom_policy_changes_target_and_timings(session: Session) {
    let backend = FakeBackend::new();
    backend.push_instance(running("AMD Rome"));
    backend.push_instance(running("AMD Rome"));
    backend.push_instance(running("Intel Ice Lake"));
    backend.push_instance(running("Intel Ice Lake"));
    let sleeper = RecordingSleeper::new();
    let policy = RerollPolicy {
        poll_interval: Duration::from_secs(5),
        max_polls: 3,
        reset_pause: Duration::from_secs(1),
        target: String::from("intel"),
    };

    let summary = CpuReroller::new(&backend, sleeper.clone())
        .with_policy(policy)
        .run(&session)
        .await
        .unwrap_or_else(|err| panic!("reroll should succeed: {err}"));

    assert_eq!(summary.platform, "Intel Ice Lake");
    assert_eq!(summary.attempts, 2);
    assert_eq!(sleeper.naps(), vec![Duration::from_secs(1)]);
}

#[rstest]
#[tokio::test]
async fn stop_failure_aborts_with_attempt_context(session: Session) {
    let backend = FakeBackend::with_instance(running("Intel Cascade Lake"));
    backend.fail(
        FakeOp::StopInstance,
        None,
        ProviderError::new(ProviderErrorKind::Other, "quota exceeded"),
    );

    let err = CpuReroller::new(&backend, RecordingSleeper::new())
        .run(&session)
        .await
        .expect_err("stop failure should end the reroll");

    assert!(
        matches!(
            err,
            RerollError::Provider {
                attempt: 1,
                step: RerollStep::Stopping,
                ..
            }
        ),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn missing_instance_selection_is_reported() {
    let backend = FakeBackend::new();
    let err = CpuReroller::new(&backend, RecordingSleeper::new())
        .run(&Session::new("proj"))
        .await
        .expect_err("no instance selected");

    assert!(matches!(err, RerollError::Session(SessionError::NoInstance { .. })));
    assert!(backend.calls().is_empty());
}
