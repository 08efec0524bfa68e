//! Behavioural scenarios for guarded teardown.

mod teardown;
