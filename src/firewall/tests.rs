//! Unit tests for the firewall rule manager.

use rstest::rstest;

use super::*;
use crate::backend::{DEFAULT_NETWORK, ProviderErrorKind};
use crate::test_support::{BackendCall, FakeBackend, FakeOp};

fn ranges(count: usize) -> Vec<String> {
    (0..count)
        .map(|index| format!("10.{}.{}.0/24", index.div_euclid(256), index.rem_euclid(256)))
        .collect()
}

fn inserted_rules(backend: &FakeBackend) -> Vec<FirewallRule> {
    backend
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            BackendCall::InsertFirewall { rule } => Some(rule),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn allow_all_ingress_inserts_fixed_rule() {
    let backend = FakeBackend::new();
    let mut report = Report::new();

    let outcome = FirewallManager::new(&backend)
        .allow_all_ingress("proj", DEFAULT_NETWORK, &mut report)
        .await;

    assert_eq!(outcome, CreateOutcome::Created);
    assert_eq!(
        inserted_rules(&backend),
        vec![FirewallRule {
            name: String::from("allow-all-ingress-custom"),
            direction: Direction::Ingress,
            priority: 1000,
            network: String::from(DEFAULT_NETWORK),
            ranges: vec![String::from("0.0.0.0/0")],
            protocol: String::from("all"),
            action: RuleAction::Allow,
        }]
    );
    assert_eq!(report.warnings().count(), 0);
}

#[tokio::test]
async fn existing_rule_is_success_with_warning() {
    let backend = FakeBackend::new();
    backend.fail(
        FakeOp::InsertFirewall,
        None,
        ProviderError::new(ProviderErrorKind::AlreadyExists, "already exists"),
    );
    let mut report = Report::new();

    let outcome = FirewallManager::new(&backend)
        .allow_all_ingress("proj", DEFAULT_NETWORK, &mut report)
        .await;

    assert_eq!(outcome, CreateOutcome::AlreadyExists);
    assert!(outcome.is_success());
    assert_eq!(report.warnings().count(), 1);
}

#[tokio::test]
async fn other_create_failure_is_reported_without_retry() {
    let backend = FakeBackend::new();
    backend.fail_operation(
        FakeOp::InsertFirewall,
        ProviderError::new(ProviderErrorKind::Other, "quota exceeded"),
    );
    let mut report = Report::new();

    let outcome = FirewallManager::new(&backend)
        .allow_all_ingress("proj", DEFAULT_NETWORK, &mut report)
        .await;

    assert!(!outcome.is_success());
    assert!(report.mentions("quota exceeded"));
    assert_eq!(inserted_rules(&backend).len(), 1, "no retry expected");
}

#[rstest]
#[case::under_limit(10, 10, 0)]
#[case::at_limit(256, 256, 0)]
#[case::over_limit(300, 256, 1)]
#[tokio::test]
async fn deny_egress_caps_ranges(
    #[case] supplied: usize,
    #[case] sent: usize,
    #[case] warnings: usize,
) {
    let backend = FakeBackend::new();
    let mut report = Report::new();
    let input = ranges(supplied);

    let outcome = FirewallManager::new(&backend)
        .deny_egress("proj", DEFAULT_NETWORK, &input, &mut report)
        .await;

    assert_eq!(outcome, CreateOutcome::Created);
    let rules = inserted_rules(&backend);
    let rule = rules.first().expect("one rule inserted");
    assert_eq!(rule.name, "deny-cdn-egress-custom");
    assert_eq!(rule.direction, Direction::Egress);
    assert_eq!(rule.priority, 900);
    assert_eq!(rule.action, RuleAction::Deny);
    assert_eq!(rule.ranges.len(), sent);
    assert_eq!(rule.ranges.first(), input.first());
    assert_eq!(report.warnings().count(), warnings);
}

#[tokio::test]
async fn empty_range_list_is_skipped_without_calls() {
    let backend = FakeBackend::new();
    let mut report = Report::new();

    let outcome = FirewallManager::new(&backend)
        .deny_egress("proj", DEFAULT_NETWORK, &[], &mut report)
        .await;

    assert_eq!(outcome, CreateOutcome::Skipped);
    assert!(outcome.is_success());
    assert!(backend.calls().is_empty());
    assert_eq!(report.warnings().count(), 0);
}

#[rstest]
#[case::present(None, true)]
#[case::missing(Some(ProviderErrorKind::NotFound), true)]
#[case::rejected(Some(ProviderErrorKind::Other), false)]
#[tokio::test]
async fn delete_treats_missing_rule_as_success(
    #[case] failure: Option<ProviderErrorKind>,
    #[case] expected: bool,
) {
    let backend = FakeBackend::new();
    if let Some(kind) = failure {
        backend.fail(
            FakeOp::DeleteFirewall,
            None,
            ProviderError::new(kind, "delete failed"),
        );
    }
    let mut report = Report::new();

    let ok = FirewallManager::new(&backend)
        .delete("proj", ManagedRule::DenyCdnEgress, &mut report)
        .await;

    assert_eq!(ok, expected);
    assert_eq!(report.warnings().count(), usize::from(!expected));
}

#[tokio::test]
async fn delete_all_attempts_every_rule_and_only_those() {
    let backend = FakeBackend::new();
    backend.fail(
        FakeOp::DeleteFirewall,
        Some("allow-all-ingress-custom"),
        ProviderError::new(ProviderErrorKind::Other, "permission denied"),
    );
    let mut report = Report::new();

    let ok = FirewallManager::new(&backend)
        .delete_all("proj", &mut report)
        .await;

    assert!(!ok);
    let deleted: Vec<_> = backend
        .mutations()
        .into_iter()
        .filter_map(|call| match call {
            BackendCall::DeleteFirewall { name } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(
        deleted,
        vec![
            String::from("allow-all-ingress-custom"),
            String::from("deny-cdn-egress-custom")
        ]
    );
}
