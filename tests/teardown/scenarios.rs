//! BDD scenarios for guarded teardown.

use rstest_bdd_macros::scenario;

use super::test_helpers::{TeardownContext, teardown_context};

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Declined confirmation leaves everything in place"
)]
fn scenario_declined_confirmation(teardown_context: TeardownContext) {
    let _ = teardown_context;
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Resources that are already gone count as removed"
)]
fn scenario_missing_resources(teardown_context: TeardownContext) {
    let _ = teardown_context;
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "A failed instance delete stops the sequence"
)]
fn scenario_aborted_instance_delete(teardown_context: TeardownContext) {
    let _ = teardown_context;
}
