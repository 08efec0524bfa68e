//! CPU platform reroll loop.
//!
//! Compute Engine places a restarted instance on whichever host has capacity,
//! so stopping and starting an instance can change the CPU platform it
//! reports. [`CpuReroller`] drives that cycle as an explicit state machine:
//!
//! ```text
//! Starting -> PollingCpu -> Accepted
//!                 |
//!                 v
//!          RejectedResetting -> Starting
//! ```
//!
//! Only the CPU poll is bounded; the outer cycle runs until the platform is
//! accepted or the process is interrupted.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{
    Backend, Instance, InstanceRef, InstanceStatus, ProviderError, UNKNOWN_CPU_PLATFORM,
};
use crate::session::{Session, SessionError};
use crate::waiter::OperationWaiter;

/// Substring that marks an acceptable CPU platform.
pub const TARGET_PLATFORM: &str = "AMD";

/// Delay between two CPU platform polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Maximum number of CPU platform polls per attempt.
pub const MAX_POLLS: u32 = 60;

/// Pause after stopping the instance and before the next attempt.
pub const RESET_PAUSE: Duration = Duration::from_secs(2);

const PROGRESS_EVERY: u32 = 5;

/// Future returned by [`Sleeper::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Source of delays for the reroll loop.
pub trait Sleeper {
    /// Suspends the caller for `duration`.
    fn sleep(&self, duration: Duration) -> SleepFuture<'_>;
}

/// Sleeper backed by the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Tunables of the reroll loop.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RerollPolicy {
    /// Delay between CPU polls.
    pub poll_interval: Duration,
    /// Maximum CPU polls per attempt.
    pub max_polls: u32,
    /// Pause after a stop before starting again.
    pub reset_pause: Duration,
    /// Case-insensitive substring the platform must contain.
    pub target: String,
}

impl Default for RerollPolicy {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            max_polls: MAX_POLLS,
            reset_pause: RESET_PAUSE,
            target: String::from(TARGET_PLATFORM),
        }
    }
}

impl RerollPolicy {
    /// Returns `true` when `platform` satisfies this policy.
    #[must_use]
    pub fn accepts(&self, platform: &str) -> bool {
        accepts_platform(platform, &self.target)
    }
}

/// Case-insensitive substring match of `target` in `platform`.
///
/// The [`UNKNOWN_CPU_PLATFORM`] placeholder never matches.
#[must_use]
pub fn accepts_platform(platform: &str, target: &str) -> bool {
    if platform == UNKNOWN_CPU_PLATFORM || target.is_empty() {
        return false;
    }
    platform
        .to_uppercase()
        .contains(target.to_uppercase().as_str())
}

/// States of the reroll machine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RerollState {
    /// Ensure the instance is running.
    Starting,
    /// Wait for the provider to publish the CPU platform.
    PollingCpu,
    /// Terminal: the platform matched.
    Accepted {
        /// Winning platform.
        platform: String,
    },
    /// Stop the instance and try again.
    RejectedResetting,
}

/// How a CPU poll ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PollOutcome {
    /// The provider published a platform.
    Detected(String),
    /// The poll budget ran out without a platform.
    TimedOut,
    /// The instance left `RUNNING` while polling.
    Unstable(InstanceStatus),
}

impl fmt::Display for PollOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detected(platform) => f.write_str(platform),
            Self::TimedOut => write!(f, "{UNKNOWN_CPU_PLATFORM} (timed out)"),
            Self::Unstable(status) => write!(f, "instance became {status}"),
        }
    }
}

/// Decision taken at the end of an attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    /// Keep the instance as it is.
    Accept,
    /// Stop the instance and try again.
    Reset,
}

/// Outcome of one completed attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttemptRecord {
    /// One-based attempt number.
    pub attempt: u64,
    /// Poll outcome observed during the attempt.
    pub outcome: PollOutcome,
    /// Decision taken.
    pub decision: Decision,
}

/// Progress of one reroll invocation. Never persisted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RerollAttempt {
    /// One-based attempt counter.
    pub number: u64,
    /// Last platform observed, if any.
    pub last_platform: Option<String>,
    /// Current machine state.
    pub state: RerollState,
}

impl RerollAttempt {
    const fn first() -> Self {
        Self {
            number: 1,
            last_platform: None,
            state: RerollState::Starting,
        }
    }
}

/// Result of a successful reroll.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RerollSummary {
    /// Accepted platform.
    pub platform: String,
    /// Number of attempts used.
    pub attempts: u64,
    /// Every attempt in order, the accepted one last.
    pub history: Vec<AttemptRecord>,
}

/// Step of the cycle during which a provider call failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RerollStep {
    /// Reading the instance before starting it.
    Reading,
    /// Starting the instance.
    Starting,
    /// Polling the CPU platform.
    Polling,
    /// Stopping the instance.
    Stopping,
}

impl fmt::Display for RerollStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reading => "reading the instance",
            Self::Starting => "starting the instance",
            Self::Polling => "polling the CPU platform",
            Self::Stopping => "stopping the instance",
        })
    }
}

/// Errors that end a reroll before acceptance.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RerollError {
    /// Raised when the session has no selected instance.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Raised when a provider call fails; the loop does not retry these.
    #[error("attempt {attempt} failed while {step}: {source}")]
    Provider {
        /// Attempt during which the call failed.
        attempt: u64,
        /// Step that issued the call.
        step: RerollStep,
        /// Provider failure.
        #[source]
        source: ProviderError,
    },
}

/// Drives the stop/start cycle until the CPU platform is accepted.
#[derive(Debug)]
pub struct CpuReroller<'a, B, S> {
    backend: &'a B,
    sleeper: S,
    policy: RerollPolicy,
}

impl<'a, B: Backend, S: Sleeper> CpuReroller<'a, B, S> {
    /// Creates a reroller with the default policy.
    #[must_use]
    pub fn new(backend: &'a B, sleeper: S) -> Self {
        Self {
            backend,
            sleeper,
            policy: RerollPolicy::default(),
        }
    }

    /// Overrides the policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RerollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Runs the loop against the session's instance.
    ///
    /// # Errors
    ///
    /// Returns [`RerollError::Session`] when no instance is selected and
    /// [`RerollError::Provider`] when a provider call fails.
    pub async fn run(&self, session: &Session) -> Result<RerollSummary, RerollError> {
        let target = session.require_instance()?;
        let project = session.project();
        info!(instance = %target, wanted = %self.policy.target, "starting CPU reroll");

        let mut attempt = RerollAttempt::first();
        let mut history = Vec::new();
        loop {
            attempt.state = match attempt.state.clone() {
                RerollState::Starting => {
                    info!(attempt = attempt.number, "attempt started");
                    self.ensure_running(project, target, attempt.number).await?;
                    RerollState::PollingCpu
                }
                RerollState::PollingCpu => {
                    let outcome = self.poll_cpu(project, target, attempt.number).await?;
                    let (decision, next) = self.decide(&outcome);
                    attempt.last_platform = match &outcome {
                        PollOutcome::Detected(platform) => Some(platform.clone()),
                        PollOutcome::TimedOut | PollOutcome::Unstable(_) => None,
                    };
                    report_decision(attempt.number, &outcome, decision);
                    history.push(AttemptRecord {
                        attempt: attempt.number,
                        outcome,
                        decision,
                    });
                    next
                }
                RerollState::Accepted { platform } => {
                    info!(attempt = attempt.number, %platform, "CPU platform accepted");
                    return Ok(RerollSummary {
                        platform,
                        attempts: attempt.number,
                        history,
                    });
                }
                RerollState::RejectedResetting => {
                    info!(
                        attempt = attempt.number,
                        rejected = attempt.last_platform.as_deref().unwrap_or("none"),
                        "resetting for another platform"
                    );
                    self.reset(project, target, attempt.number).await?;
                    attempt.number = attempt.number.saturating_add(1);
                    self.sleeper.sleep(self.policy.reset_pause).await;
                    RerollState::Starting
                }
            };
        }
    }

    fn decide(&self, outcome: &PollOutcome) -> (Decision, RerollState) {
        match outcome {
            PollOutcome::Detected(platform) if self.policy.accepts(platform) => (
                Decision::Accept,
                RerollState::Accepted {
                    platform: platform.clone(),
                },
            ),
            PollOutcome::Detected(_) | PollOutcome::TimedOut | PollOutcome::Unstable(_) => {
                (Decision::Reset, RerollState::RejectedResetting)
            }
        }
    }

    async fn ensure_running(
        &self,
        project: &str,
        target: &InstanceRef,
        attempt: u64,
    ) -> Result<(), RerollError> {
        let current = self
            .backend
            .get_instance(project, target)
            .await
            .map_err(|source| provider(attempt, RerollStep::Reading, source))?;
        if current.status.is_running() {
            return Ok(());
        }

        info!(instance = %target, status = %current.status, "starting instance");
        OperationWaiter::new(self.backend)
            .complete(self.backend.start_instance(project, target))
            .await
            .map_err(|source| provider(attempt, RerollStep::Starting, source))?;
        info!(instance = %target, "instance powered on, waiting for CPU metadata");
        Ok(())
    }

    async fn poll_cpu(
        &self,
        project: &str,
        target: &InstanceRef,
        attempt: u64,
    ) -> Result<PollOutcome, RerollError> {
        for poll in 1..=self.policy.max_polls {
            let current: Instance = self
                .backend
                .get_instance(project, target)
                .await
                .map_err(|source| provider(attempt, RerollStep::Polling, source))?;

            if !current.status.is_running() {
                warn!(
                    instance = %target,
                    status = %current.status,
                    "instance left RUNNING while polling"
                );
                return Ok(PollOutcome::Unstable(current.status));
            }

            if !current.cpu_platform.is_empty() && current.cpu_platform != UNKNOWN_CPU_PLATFORM {
                return Ok(PollOutcome::Detected(current.cpu_platform));
            }

            if poll.is_multiple_of(PROGRESS_EVERY) {
                info!(poll, max = self.policy.max_polls, "waiting for CPU metadata");
            }
            if poll < self.policy.max_polls {
                self.sleeper.sleep(self.policy.poll_interval).await;
            }
        }

        warn!(
            instance = %target,
            polls = self.policy.max_polls,
            "CPU platform not published before timeout"
        );
        Ok(PollOutcome::TimedOut)
    }

    async fn reset(
        &self,
        project: &str,
        target: &InstanceRef,
        attempt: u64,
    ) -> Result<(), RerollError> {
        info!(instance = %target, "stopping instance");
        OperationWaiter::new(self.backend)
            .complete(self.backend.stop_instance(project, target))
            .await
            .map_err(|source| provider(attempt, RerollStep::Stopping, source))
    }
}

fn report_decision(attempt: u64, outcome: &PollOutcome, decision: Decision) {
    match decision {
        Decision::Accept => info!(
            attempt,
            platform = %outcome,
            decision = "accept",
            "target CPU platform found"
        ),
        Decision::Reset => warn!(
            attempt,
            platform = %outcome,
            decision = "reset",
            "CPU platform rejected, resetting"
        ),
    }
}

fn provider(attempt: u64, step: RerollStep, source: ProviderError) -> RerollError {
    RerollError::Provider {
        attempt,
        step,
        source,
    }
}

#[cfg(test)]
mod tests;
