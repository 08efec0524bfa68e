//! Guarded removal of an instance, its disks, and the managed firewall rules.
//!
//! Every delete is idempotent: a resource that is already gone counts as
//! removed. Only a failed instance delete stops the sequence, because disks
//! attached to a live instance cannot be deleted.

use std::fmt;

use crate::backend::{Backend, InstanceRef};
use crate::firewall::{FirewallManager, ManagedRule};
use crate::report::Report;
use crate::session::{Session, SessionError};
use crate::waiter::{DeleteOutcome, OperationWaiter};

/// Exact text the operator must supply to authorise teardown.
pub const CONFIRMATION_TOKEN: &str = "DELETE";

/// Returns `true` only for the exact confirmation token.
#[must_use]
pub fn is_confirmed(confirmation: &str) -> bool {
    confirmation == CONFIRMATION_TOKEN
}

/// Resource a teardown step removed or tried to remove.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TeardownTarget {
    /// The selected instance.
    Instance(InstanceRef),
    /// A disk that was attached to the instance.
    Disk(String),
    /// One of the managed firewall rules.
    FirewallRule(ManagedRule),
}

impl fmt::Display for TeardownTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(instance) => write!(f, "instance {instance}"),
            Self::Disk(name) => write!(f, "disk {name}"),
            Self::FirewallRule(rule) => write!(f, "firewall rule {rule}"),
        }
    }
}

/// One attempted deletion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TeardownStep {
    /// What was deleted.
    pub target: TeardownTarget,
    /// How it went.
    pub outcome: DeleteOutcome,
}

/// How far teardown got.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TeardownStatus {
    /// The confirmation token did not match; nothing was touched.
    Declined,
    /// The instance delete failed; disks and rules were left alone.
    Aborted,
    /// Every step was attempted.
    Completed,
}

/// Result of a teardown run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TeardownReport {
    /// How far the run got.
    pub status: TeardownStatus,
    /// Attempted deletions in order.
    pub steps: Vec<TeardownStep>,
}

impl TeardownReport {
    const fn declined() -> Self {
        Self {
            status: TeardownStatus::Declined,
            steps: Vec::new(),
        }
    }

    /// `true` when every step was attempted and succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == TeardownStatus::Completed
            && self.steps.iter().all(|step| step.outcome.is_success())
    }

    /// `true` when the instance no longer exists.
    #[must_use]
    pub fn instance_removed(&self) -> bool {
        self.steps.iter().any(|step| {
            matches!(step.target, TeardownTarget::Instance(_)) && step.outcome.is_success()
        })
    }
}

/// Runs the teardown sequence against one backend.
#[derive(Debug)]
pub struct TeardownOrchestrator<'a, B: ?Sized> {
    backend: &'a B,
}

impl<'a, B: Backend + ?Sized> TeardownOrchestrator<'a, B> {
    /// Creates an orchestrator over `backend`.
    #[must_use]
    pub const fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Deletes the session's instance, its disks, and the managed rules.
    ///
    /// Nothing is called on the provider unless `confirmation` equals
    /// [`CONFIRMATION_TOKEN`] exactly. The session forgets its instance once
    /// the instance is gone.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoInstance`] when no instance is selected.
    pub async fn run(
        &self,
        session: &mut Session,
        confirmation: &str,
        report: &mut Report,
    ) -> Result<TeardownReport, SessionError> {
        let target = session.require_instance()?.clone();
        if !is_confirmed(confirmation) {
            report.info(format!(
                "teardown of {target} cancelled: type {CONFIRMATION_TOKEN} to confirm"
            ));
            return Ok(TeardownReport::declined());
        }

        let project = session.project().to_owned();
        let result = self.remove_all(&project, &target, report).await;
        if result.instance_removed() {
            session.clear_instance();
        }
        if result.is_success() {
            report.success("cleanup finished; check the console for leftovers");
        }
        Ok(result)
    }

    async fn remove_all(
        &self,
        project: &str,
        target: &InstanceRef,
        report: &mut Report,
    ) -> TeardownReport {
        let disks = self.attached_disks(project, target, report).await;
        let waiter = OperationWaiter::new(self.backend);
        let mut steps = Vec::new();

        report.info(format!("deleting instance {target}"));
        let instance_outcome = waiter
            .complete_delete(self.backend.delete_instance(project, target))
            .await;
        log_step(&TeardownTarget::Instance(target.clone()), &instance_outcome, report);
        let instance_ok = instance_outcome.is_success();
        steps.push(TeardownStep {
            target: TeardownTarget::Instance(target.clone()),
            outcome: instance_outcome,
        });
        if !instance_ok {
            return TeardownReport {
                status: TeardownStatus::Aborted,
                steps,
            };
        }

        for disk in disks {
            let outcome = waiter
                .complete_delete(self.backend.delete_disk(project, &target.zone, &disk))
                .await;
            let disk_target = TeardownTarget::Disk(disk);
            log_step(&disk_target, &outcome, report);
            steps.push(TeardownStep {
                target: disk_target,
                outcome,
            });
        }

        report.info("removing managed firewall rules");
        let firewall = FirewallManager::new(self.backend);
        for rule in ManagedRule::ALL {
            let outcome = firewall.remove(project, rule, report).await;
            steps.push(TeardownStep {
                target: TeardownTarget::FirewallRule(rule),
                outcome,
            });
        }

        TeardownReport {
            status: TeardownStatus::Completed,
            steps,
        }
    }

    async fn attached_disks(
        &self,
        project: &str,
        target: &InstanceRef,
        report: &mut Report,
    ) -> Vec<String> {
        match self.backend.get_instance(project, target).await {
            Ok(instance) => instance.disks,
            Err(err) => {
                report.warning(format!(
                    "could not read {target}; disk cleanup may be incomplete: {err}"
                ));
                Vec::new()
            }
        }
    }
}

fn log_step(target: &TeardownTarget, outcome: &DeleteOutcome, report: &mut Report) {
    match outcome {
        DeleteOutcome::Deleted => report.success(format!("{target} deleted")),
        DeleteOutcome::Missing => report.info(format!("{target} does not exist; skipped")),
        DeleteOutcome::Failed(err) => report.warning(format!("failed to delete {target}: {err}")),
    }
}
