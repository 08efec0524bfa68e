//! Idempotent management of the two firewall rules the tool owns.
//!
//! Rule identity is the closed [`ManagedRule`] enum; no caller-supplied name
//! ever reaches the provider's delete call.

use std::fmt;

use crate::backend::{Backend, Direction, FirewallRule, ProviderError, RuleAction};
use crate::report::Report;
use crate::waiter::{DeleteOutcome, OperationWaiter};

/// Largest number of ranges the provider accepts in a single rule.
pub const MAX_RANGES_PER_RULE: usize = 256;

/// Source range of the allow-all ingress rule.
pub const ANY_ADDRESS: &str = "0.0.0.0/0";

/// Protocol matched by both managed rules.
pub const ALL_PROTOCOLS: &str = "all";

/// The firewall rules created and removed by this tool.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ManagedRule {
    /// Allows every inbound connection.
    AllowAllIngress,
    /// Denies outbound connections to a caller-supplied range list.
    DenyCdnEgress,
}

impl ManagedRule {
    /// Every managed rule, in cleanup order.
    pub const ALL: [Self; 2] = [Self::AllowAllIngress, Self::DenyCdnEgress];

    /// Provider-side rule name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AllowAllIngress => "allow-all-ingress-custom",
            Self::DenyCdnEgress => "deny-cdn-egress-custom",
        }
    }

    /// Traffic direction.
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::AllowAllIngress => Direction::Ingress,
            Self::DenyCdnEgress => Direction::Egress,
        }
    }

    /// Rule priority; the deny rule wins over the allow rule.
    #[must_use]
    pub const fn priority(self) -> u32 {
        match self {
            Self::AllowAllIngress => 1000,
            Self::DenyCdnEgress => 900,
        }
    }

    /// Allow or deny.
    #[must_use]
    pub const fn action(self) -> RuleAction {
        match self {
            Self::AllowAllIngress => RuleAction::Allow,
            Self::DenyCdnEgress => RuleAction::Deny,
        }
    }

    /// Builds the provider payload for this rule.
    #[must_use]
    pub fn to_rule(self, network: &str, ranges: Vec<String>) -> FirewallRule {
        FirewallRule {
            name: self.name().to_owned(),
            direction: self.direction(),
            priority: self.priority(),
            network: network.to_owned(),
            ranges,
            protocol: String::from(ALL_PROTOCOLS),
            action: self.action(),
        }
    }
}

impl fmt::Display for ManagedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of a create request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CreateOutcome {
    /// The rule was inserted.
    Created,
    /// A rule with the same name was already present.
    AlreadyExists,
    /// Nothing to create (empty range list).
    Skipped,
    /// The provider rejected the request.
    Failed(ProviderError),
}

impl CreateOutcome {
    /// Returns `false` only for [`CreateOutcome::Failed`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Creates and deletes [`ManagedRule`]s on one backend.
#[derive(Debug)]
pub struct FirewallManager<'a, B: ?Sized> {
    backend: &'a B,
}

impl<'a, B: Backend + ?Sized> FirewallManager<'a, B> {
    /// Creates a manager over `backend`.
    #[must_use]
    pub const fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Creates the allow-all ingress rule on `network`.
    pub async fn allow_all_ingress(
        &self,
        project: &str,
        network: &str,
        report: &mut Report,
    ) -> CreateOutcome {
        let rule =
            ManagedRule::AllowAllIngress.to_rule(network, vec![String::from(ANY_ADDRESS)]);
        let outcome = self.create(project, &rule, report).await;
        if outcome == CreateOutcome::Created {
            report.success(format!("{} created: all inbound traffic allowed", rule.name));
        }
        outcome
    }

    /// Creates the egress deny rule for `ranges` on `network`.
    ///
    /// Only the first [`MAX_RANGES_PER_RULE`] ranges are used; the surplus is
    /// reported with a single warning. An empty list creates nothing.
    pub async fn deny_egress(
        &self,
        project: &str,
        network: &str,
        ranges: &[String],
        report: &mut Report,
    ) -> CreateOutcome {
        if ranges.is_empty() {
            report.info(format!(
                "address range list is empty; skipping {}",
                ManagedRule::DenyCdnEgress
            ));
            return CreateOutcome::Skipped;
        }
        if ranges.len() > MAX_RANGES_PER_RULE {
            report.warning(format!(
                "{} address ranges exceed the per-rule limit of {MAX_RANGES_PER_RULE}; \
                 keeping the first {MAX_RANGES_PER_RULE}",
                ranges.len()
            ));
        }
        let kept: Vec<String> = ranges.iter().take(MAX_RANGES_PER_RULE).cloned().collect();
        let count = kept.len();
        let rule = ManagedRule::DenyCdnEgress.to_rule(network, kept);
        let outcome = self.create(project, &rule, report).await;
        if outcome == CreateOutcome::Created {
            report.success(format!(
                "{} created: outbound traffic to {count} address ranges denied",
                rule.name
            ));
        }
        outcome
    }

    async fn create(
        &self,
        project: &str,
        rule: &FirewallRule,
        report: &mut Report,
    ) -> CreateOutcome {
        report.info(format!("creating firewall rule {} on {}", rule.name, rule.network));
        match OperationWaiter::new(self.backend)
            .complete(self.backend.insert_firewall(project, rule))
            .await
        {
            Ok(()) => CreateOutcome::Created,
            Err(err) if err.is_already_exists() => {
                report.warning(format!("firewall rule {} already exists", rule.name));
                CreateOutcome::AlreadyExists
            }
            Err(err) => {
                report.warning(format!("failed to create firewall rule {}: {err}", rule.name));
                CreateOutcome::Failed(err)
            }
        }
    }

    /// Deletes `rule` and reports how it went. A missing rule is a success.
    pub async fn remove(
        &self,
        project: &str,
        rule: ManagedRule,
        report: &mut Report,
    ) -> DeleteOutcome {
        let outcome = OperationWaiter::new(self.backend)
            .complete_delete(self.backend.delete_firewall(project, rule.name()))
            .await;
        match &outcome {
            DeleteOutcome::Deleted => report.success(format!("deleted firewall rule {rule}")),
            DeleteOutcome::Missing => {
                report.info(format!("firewall rule {rule} does not exist; skipped"));
            }
            DeleteOutcome::Failed(err) => {
                report.warning(format!("failed to delete firewall rule {rule}: {err}"));
            }
        }
        outcome
    }

    /// Deletes `rule`, returning `false` with a warning on failure.
    pub async fn delete(&self, project: &str, rule: ManagedRule, report: &mut Report) -> bool {
        self.remove(project, rule, report).await.is_success()
    }

    /// Deletes every managed rule, attempting all of them.
    ///
    /// Returns `true` when every deletion succeeded.
    pub async fn delete_all(&self, project: &str, report: &mut Report) -> bool {
        let mut all_ok = true;
        for rule in ManagedRule::ALL {
            all_ok &= self.delete(project, rule, report).await;
        }
        all_ok
    }
}

#[cfg(test)]
mod tests;
