//! Core library for the `gcevm` free-tier Compute Engine tool.
//!
//! The crate drives a single Compute Engine instance through a backend
//! abstraction: provisioning, a stop/start loop that rerolls the CPU
//! platform, idempotent firewall management, confirmed teardown, and remote
//! script execution over a `gcloud` tunnel or plain ssh. Every component
//! reads an explicit [`Session`] and records user-facing diagnostics in a
//! [`Report`].

pub mod backend;
pub mod config;
pub mod firewall;
pub mod gce;
pub mod inputs;
pub mod provision;
pub mod remote;
pub mod report;
pub mod reroll;
pub mod session;
pub mod teardown;
pub mod test_support;
pub mod waiter;

pub use backend::{
    Backend, Instance, InstanceRef, InstanceStatus, ProviderError, ProviderErrorKind,
};
pub use config::{ConfigError, GceConfig};
pub use firewall::{CreateOutcome, FirewallManager, ManagedRule};
pub use gce::{GceBackend, GceError};
pub use inputs::{InputError, read_address_ranges};
pub use provision::{ImageChoice, ProvisionError, ProvisionSettings, Provisioner, RegionChoice};
pub use remote::{
    RemoteConfig, RemoteDispatcher, RemoteScript, ToolLocator, TransportConfig, TransportKind,
};
pub use report::{Diagnostic, Report, Severity};
pub use reroll::{CpuReroller, RerollError, RerollSummary, TokioSleeper};
pub use session::{Session, SessionError};
pub use teardown::{CONFIRMATION_TOKEN, TeardownOrchestrator, TeardownReport, TeardownStatus};
pub use waiter::{DeleteOutcome, OperationWaiter};
