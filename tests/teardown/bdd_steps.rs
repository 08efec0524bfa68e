//! BDD step definitions for teardown behaviour.

use gcevm::backend::{ProviderError, ProviderErrorKind};
use gcevm::test_support::{BackendCall, FakeOp};
use gcevm::{TeardownOrchestrator, TeardownStatus};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{
    TeardownContext, TeardownOutcome, backend_with_disks, not_found, select,
};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a selected instance \"{name}\" in project \"{project}\" with disks \"{disks}\"")]
fn selected_instance_with_disks(
    mut teardown_context: TeardownContext,
    name: String,
    project: String,
    disks: String,
) -> TeardownContext {
    teardown_context.backend = backend_with_disks(name.trim(), &disks);
    teardown_context.session = Some(select(project.trim(), name.trim()));
    teardown_context
}

#[given("a selected instance \"{name}\" in project \"{project}\" that no longer exists")]
fn selected_instance_already_gone(
    mut teardown_context: TeardownContext,
    name: String,
    project: String,
) -> TeardownContext {
    teardown_context
        .backend
        .fail(FakeOp::DeleteInstance, None, not_found("instance"));
    teardown_context.session = Some(select(project.trim(), name.trim()));
    teardown_context
}

#[given("every managed firewall rule is already gone")]
fn firewall_rules_already_gone(teardown_context: TeardownContext) -> TeardownContext {
    teardown_context
        .backend
        .fail(FakeOp::DeleteFirewall, None, not_found("firewall rule"));
    teardown_context
}

#[given("deleting the instance is rejected with \"{message}\"")]
fn instance_delete_rejected(teardown_context: TeardownContext, message: String) -> TeardownContext {
    teardown_context.backend.fail(
        FakeOp::DeleteInstance,
        None,
        ProviderError::new(ProviderErrorKind::Other, message),
    );
    teardown_context
}

#[when("I confirm teardown with \"{confirmation}\"")]
fn confirm_teardown(
    mut teardown_context: TeardownContext,
    confirmation: String,
) -> TeardownContext {
    let Some(mut session) = teardown_context.session.take() else {
        panic!("test setup requires a selected instance");
    };
    let runtime = tokio::runtime::Runtime::new()
        .unwrap_or_else(|err| panic!("tokio runtime should start: {err}"));
    let backend = teardown_context.backend.clone();
    let mut report = teardown_context.report.clone();
    let result = runtime.block_on(
        TeardownOrchestrator::new(&backend).run(&mut session, &confirmation, &mut report),
    );
    teardown_context.outcome = Some(match result {
        Ok(finished) => TeardownOutcome::Finished(finished),
        Err(err) => TeardownOutcome::Failure(err.to_string()),
    });
    teardown_context.session = Some(session);
    teardown_context.report = report;
    teardown_context
}

fn expect_status(
    teardown_context: &TeardownContext,
    expected: TeardownStatus,
) -> Result<(), StepError> {
    let Some(outcome) = teardown_context.outcome.as_ref() else {
        return Err(StepError::Assertion(String::from("missing outcome")));
    };
    match outcome {
        TeardownOutcome::Finished(result) if result.status == expected => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected {expected:?}, got: {other:?}"
        ))),
    }
}

#[then("teardown is declined")]
fn teardown_declined(teardown_context: &TeardownContext) -> Result<(), StepError> {
    expect_status(teardown_context, TeardownStatus::Declined)?;
    if teardown_context.report.mentions("type DELETE to confirm") {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected a cancellation notice, got {:?}",
            teardown_context.report.entries()
        )))
    }
}

#[then("teardown is aborted")]
fn teardown_aborted(teardown_context: &TeardownContext) -> Result<(), StepError> {
    expect_status(teardown_context, TeardownStatus::Aborted)
}

#[then("teardown succeeds")]
fn teardown_succeeds(teardown_context: &TeardownContext) -> Result<(), StepError> {
    expect_status(teardown_context, TeardownStatus::Completed)?;
    match teardown_context.outcome.as_ref() {
        Some(TeardownOutcome::Finished(result)) if result.is_success() => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected every step to succeed, got: {other:?}"
        ))),
    }
}

#[then("no provider call was made")]
fn no_provider_call(teardown_context: &TeardownContext) -> Result<(), StepError> {
    let calls = teardown_context.backend.calls();
    if calls.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("unexpected calls: {calls:?}")))
    }
}

#[then("no disk or firewall rule was deleted")]
fn nothing_after_instance(teardown_context: &TeardownContext) -> Result<(), StepError> {
    let calls = teardown_context.backend.calls();
    let stray = calls.iter().any(|call| {
        matches!(
            call,
            BackendCall::DeleteDisk { .. } | BackendCall::DeleteFirewall { .. }
        )
    });
    if stray {
        Err(StepError::Assertion(format!(
            "expected the sequence to stop after the instance, got: {calls:?}"
        )))
    } else {
        Ok(())
    }
}

#[then("the warnings mention \"{text}\"")]
fn warnings_mention(teardown_context: &TeardownContext, text: String) -> Result<(), StepError> {
    let found = teardown_context
        .report
        .warnings()
        .any(|warning| warning.message.contains(text.as_str()));
    if found {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "no warning mentions {text}: {:?}",
            teardown_context.report.entries()
        )))
    }
}

#[then("the instance is still selected")]
fn instance_still_selected(teardown_context: &TeardownContext) -> Result<(), StepError> {
    match teardown_context.session.as_ref() {
        Some(session) if session.instance().is_some() => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected the instance to stay selected, got: {other:?}"
        ))),
    }
}

#[then("the instance is no longer selected")]
fn instance_cleared(teardown_context: &TeardownContext) -> Result<(), StepError> {
    match teardown_context.session.as_ref() {
        Some(session) if session.instance().is_none() => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected the selection to be cleared, got: {other:?}"
        ))),
    }
}
