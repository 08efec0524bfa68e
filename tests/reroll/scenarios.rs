//! BDD scenarios for the CPU reroll loop.

use rstest_bdd_macros::scenario;

use super::test_helpers::{RerollContext, reroll_context};

#[scenario(
    path = "tests/features/reroll.feature",
    name = "Keep the first matching platform"
)]
fn scenario_first_platform_matches(reroll_context: RerollContext) {
    let _ = reroll_context;
}

#[scenario(
    path = "tests/features/reroll.feature",
    name = "Reset until the platform matches"
)]
fn scenario_reset_until_match(reroll_context: RerollContext) {
    let _ = reroll_context;
}

#[scenario(
    path = "tests/features/reroll.feature",
    name = "Reroll towards another platform family"
)]
fn scenario_custom_target(reroll_context: RerollContext) {
    let _ = reroll_context;
}

#[scenario(
    path = "tests/features/reroll.feature",
    name = "A rejected stop ends the reroll"
)]
fn scenario_stop_rejected(reroll_context: RerollContext) {
    let _ = reroll_context;
}
