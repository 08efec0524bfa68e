//! BDD step definitions for reroll behaviour.

use gcevm::CpuReroller;
use gcevm::backend::{ProviderError, ProviderErrorKind};
use gcevm::test_support::{BackendCall, FakeOp};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{RerollContext, RerollOutcome, queue_attempt, select};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a running instance \"{name}\" in project \"{project}\"")]
fn running_instance(
    mut reroll_context: RerollContext,
    name: String,
    project: String,
) -> RerollContext {
    reroll_context.session = Some(select(project.trim(), name.trim()));
    reroll_context
}

#[given("the provider reports CPU platforms \"{platforms}\"")]
fn provider_reports_platforms(reroll_context: RerollContext, platforms: String) -> RerollContext {
    let Some(session) = reroll_context.session.as_ref() else {
        panic!("test setup requires a selected instance");
    };
    let Some(target) = session.instance() else {
        panic!("test setup requires a selected instance");
    };
    for platform in platforms.split(',').map(str::trim) {
        queue_attempt(&reroll_context.backend, &target.name, platform);
    }
    reroll_context
}

#[given("the reroll targets \"{target}\"")]
fn reroll_targets(mut reroll_context: RerollContext, target: String) -> RerollContext {
    reroll_context.policy.target = target;
    reroll_context
}

#[given("stopping the instance is rejected with \"{message}\"")]
fn stop_rejected(reroll_context: RerollContext, message: String) -> RerollContext {
    reroll_context.backend.fail(
        FakeOp::StopInstance,
        None,
        ProviderError::new(ProviderErrorKind::Other, message),
    );
    reroll_context
}

#[when("I reroll the CPU")]
fn reroll_cpu(mut reroll_context: RerollContext) -> RerollContext {
    let session = reroll_context
        .session
        .clone()
        .unwrap_or_else(|| panic!("test setup requires a selected instance"));
    let runtime = tokio::runtime::Runtime::new()
        .unwrap_or_else(|err| panic!("tokio runtime should start: {err}"));
    let reroller = CpuReroller::new(&reroll_context.backend, reroll_context.sleeper.clone())
        .with_policy(reroll_context.policy.clone());
    let result = runtime.block_on(reroller.run(&session));
    reroll_context.outcome = Some(match result {
        Ok(summary) => RerollOutcome::Success(summary),
        Err(err) => RerollOutcome::Failure(err.to_string()),
    });
    reroll_context
}

#[then("the reroll accepts \"{platform}\" on attempt {attempt:u64}")]
fn reroll_accepts(
    reroll_context: &RerollContext,
    platform: String,
    attempt: u64,
) -> Result<(), StepError> {
    let Some(outcome) = reroll_context.outcome.as_ref() else {
        return Err(StepError::Assertion(String::from("missing outcome")));
    };
    let RerollOutcome::Success(summary) = outcome else {
        return Err(StepError::Assertion(format!(
            "expected success, got: {outcome:?}"
        )));
    };
    if summary.platform == platform && summary.attempts == attempt {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {platform} on attempt {attempt}, got {summary:?}"
        )))
    }
}

#[then("the instance was stopped {stops:u32} times")]
fn instance_stopped(reroll_context: &RerollContext, stops: u32) -> Result<(), StepError> {
    let expected =
        usize::try_from(stops).map_err(|err| StepError::Assertion(err.to_string()))?;
    let calls = reroll_context.backend.calls();
    let actual = calls
        .iter()
        .filter(|call| matches!(call, BackendCall::StopInstance { .. }))
        .count();
    if actual == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected} stops, got {actual}: {calls:?}"
        )))
    }
}

#[then("the reroll fails while \"{step}\"")]
fn reroll_fails_while(reroll_context: &RerollContext, step: String) -> Result<(), StepError> {
    let Some(outcome) = reroll_context.outcome.as_ref() else {
        return Err(StepError::Assertion(String::from("missing outcome")));
    };
    let RerollOutcome::Failure(message) = outcome else {
        return Err(StepError::Assertion(String::from(
            "expected reroll to fail, got success",
        )));
    };
    if message.contains(&format!("while {step}")) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected failure while {step}, got: {message}"
        )))
    }
}

#[then("the failure mentions \"{text}\"")]
fn failure_mentions(reroll_context: &RerollContext, text: String) -> Result<(), StepError> {
    match reroll_context.outcome.as_ref() {
        Some(RerollOutcome::Failure(message)) if message.contains(text.as_str()) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a failure mentioning {text}, got: {other:?}"
        ))),
    }
}
