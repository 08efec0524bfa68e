//! Backend abstraction over the Compute Engine and Resource Manager surface.
//!
//! Orchestrators only talk to the provider through [`Backend`], so the REST
//! client in [`crate::gce`] and the in-memory double in
//! [`crate::test_support`] are interchangeable.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// Placeholder reported when the provider has not published a CPU platform.
pub const UNKNOWN_CPU_PLATFORM: &str = "Unknown CPU Platform";

/// Network used when an instance reports no network interface.
pub const DEFAULT_NETWORK: &str = "global/networks/default";

/// Lifecycle status reported by the provider for an instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InstanceStatus {
    /// The instance is powered on.
    Running,
    /// The instance has been stopped by a stop operation.
    Stopped,
    /// The instance is powered off.
    Terminated,
    /// The provider did not report a status.
    Unknown,
    /// Any other provider value (`PROVISIONING`, `STOPPING`, ...), verbatim.
    Other(String),
}

impl InstanceStatus {
    /// Maps a provider status string onto the enum.
    #[must_use]
    pub fn from_provider(value: &str) -> Self {
        match value {
            "RUNNING" => Self::Running,
            "STOPPED" => Self::Stopped,
            "TERMINATED" => Self::Terminated,
            "" | "UNKNOWN" => Self::Unknown,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Returns the provider spelling of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::Terminated => "TERMINATED",
            Self::Unknown => "UNKNOWN",
            Self::Other(value) => value.as_str(),
        }
    }

    /// Returns `true` for [`InstanceStatus::Running`].
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name and zone identifying a single instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceRef {
    /// Instance name, unique within the zone.
    pub name: String,
    /// Zone short name (for example `us-west1-b`).
    pub zone: String,
}

impl InstanceRef {
    /// Builds a reference from a name and zone.
    #[must_use]
    pub fn new(name: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            zone: zone.into(),
        }
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.zone)
    }
}

/// Snapshot of an instance as reported by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instance {
    /// Instance name.
    pub name: String,
    /// Zone short name.
    pub zone: String,
    /// Current lifecycle status.
    pub status: InstanceStatus,
    /// CPU platform, or [`UNKNOWN_CPU_PLATFORM`] when not yet published.
    pub cpu_platform: String,
    /// Network of the first interface.
    pub network: String,
    /// Internal address of the first interface.
    pub internal_ip: Option<String>,
    /// External NAT address of the first interface, if any.
    pub external_ip: Option<String>,
    /// Names of the attached disks.
    pub disks: Vec<String>,
}

impl Instance {
    /// Returns the name/zone pair for this instance.
    #[must_use]
    pub fn reference(&self) -> InstanceRef {
        InstanceRef::new(&self.name, &self.zone)
    }
}

/// Scope an operation was issued in, which selects the wait endpoint.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OperationScope {
    /// Zonal operation (instances, disks).
    Zone(String),
    /// Global operation (firewall rules).
    Global,
}

/// Opaque reference to an asynchronous provider mutation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationHandle {
    /// Operation name assigned by the provider.
    pub name: String,
    /// Project that owns the operation.
    pub project: String,
    /// Zone or global scope.
    pub scope: OperationScope,
}

/// Result of a single wait call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OperationStatus {
    /// The provider returned before the operation finished.
    Pending,
    /// The operation finished, successfully or with a structured error.
    Done(Result<(), ProviderError>),
}

/// Direction of a firewall rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Matches inbound traffic; ranges are source ranges.
    Ingress,
    /// Matches outbound traffic; ranges are destination ranges.
    Egress,
}

impl Direction {
    /// Provider spelling of the direction.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingress => "INGRESS",
            Self::Egress => "EGRESS",
        }
    }
}

/// Whether matching traffic is allowed or denied.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RuleAction {
    /// Allow matching traffic.
    Allow,
    /// Deny matching traffic.
    Deny,
}

/// Firewall rule payload sent to the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FirewallRule {
    /// Rule name, also the idempotency key.
    pub name: String,
    /// Traffic direction.
    pub direction: Direction,
    /// Priority; lower values win.
    pub priority: u32,
    /// Network the rule applies to.
    pub network: String,
    /// Source (ingress) or destination (egress) CIDR ranges.
    pub ranges: Vec<String>,
    /// IP protocol matched by the rule (`all` for every protocol).
    pub protocol: String,
    /// Allow or deny.
    pub action: RuleAction,
}

/// Parameters for inserting a new instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSpec {
    /// Instance name.
    pub name: String,
    /// Target zone.
    pub zone: String,
    /// Machine type short name (for example `e2-micro`).
    pub machine_type: String,
    /// Self link of the boot image.
    pub source_image: String,
    /// Boot disk size in GB.
    pub disk_size_gb: u32,
    /// Disk type short name (for example `pd-standard`).
    pub disk_type: String,
    /// Network for the primary interface.
    pub network: String,
    /// Network tags applied to the instance.
    pub tags: Vec<String>,
}

/// Zone listing entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ZoneInfo {
    /// Zone short name.
    pub name: String,
    /// Region short name the zone belongs to.
    pub region: String,
    /// Provider status (`UP` or `DOWN`).
    pub status: String,
}

/// Project returned by the Resource Manager search.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProjectInfo {
    /// Project identifier.
    pub project_id: String,
    /// Human readable name.
    pub display_name: String,
    /// Lifecycle state (`ACTIVE`, `DELETE_REQUESTED`, ...).
    pub state: String,
}

impl ProjectInfo {
    /// Returns `true` when the project is usable.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == "ACTIVE"
    }
}

/// Classification hint attached to every provider failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ProviderErrorKind {
    /// The targeted resource does not exist.
    NotFound,
    /// A resource with the same name already exists.
    AlreadyExists,
    /// Any other failure.
    Other,
}

/// Structured provider failure.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{message}")]
pub struct ProviderError {
    /// Classification used by the idempotency rules.
    pub kind: ProviderErrorKind,
    /// Message returned by the provider or transport.
    pub message: String,
}

impl ProviderError {
    /// Builds an error with an explicit classification.
    #[must_use]
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns `true` for [`ProviderErrorKind::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == ProviderErrorKind::NotFound
    }

    /// Returns `true` for [`ProviderErrorKind::AlreadyExists`].
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        self.kind == ProviderErrorKind::AlreadyExists
    }
}

/// Fallback classifier for unstructured provider messages.
#[must_use]
pub fn classify_message(message: &str) -> ProviderErrorKind {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("already exists") || lowered.contains("alreadyexists") {
        return ProviderErrorKind::AlreadyExists;
    }
    if lowered.contains("not found") || lowered.contains("notfound") || lowered.contains("404") {
        return ProviderErrorKind::NotFound;
    }
    ProviderErrorKind::Other
}

/// Future returned by backend operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Provider calls consumed by the orchestrators.
///
/// Mutating calls return an [`OperationHandle`] that must be resolved with
/// [`Backend::wait_operation`] (see [`crate::waiter::OperationWaiter`]).
pub trait Backend: Sync {
    /// Reads a single instance.
    fn get_instance<'a>(
        &'a self,
        project: &'a str,
        instance: &'a InstanceRef,
    ) -> BackendFuture<'a, Instance>;

    /// Lists instances across every zone of the project.
    fn list_instances<'a>(&'a self, project: &'a str) -> BackendFuture<'a, Vec<Instance>>;

    /// Inserts a new instance.
    fn insert_instance<'a>(
        &'a self,
        project: &'a str,
        spec: &'a InstanceSpec,
    ) -> BackendFuture<'a, OperationHandle>;

    /// Deletes an instance.
    fn delete_instance<'a>(
        &'a self,
        project: &'a str,
        instance: &'a InstanceRef,
    ) -> BackendFuture<'a, OperationHandle>;

    /// Powers an instance on.
    fn start_instance<'a>(
        &'a self,
        project: &'a str,
        instance: &'a InstanceRef,
    ) -> BackendFuture<'a, OperationHandle>;

    /// Powers an instance off.
    fn stop_instance<'a>(
        &'a self,
        project: &'a str,
        instance: &'a InstanceRef,
    ) -> BackendFuture<'a, OperationHandle>;

    /// Deletes a zonal disk.
    fn delete_disk<'a>(
        &'a self,
        project: &'a str,
        zone: &'a str,
        disk: &'a str,
    ) -> BackendFuture<'a, OperationHandle>;

    /// Resolves the newest image of a family to its self link.
    fn image_from_family<'a>(
        &'a self,
        image_project: &'a str,
        family: &'a str,
    ) -> BackendFuture<'a, String>;

    /// Inserts a firewall rule.
    fn insert_firewall<'a>(
        &'a self,
        project: &'a str,
        rule: &'a FirewallRule,
    ) -> BackendFuture<'a, OperationHandle>;

    /// Deletes a firewall rule by name.
    fn delete_firewall<'a>(
        &'a self,
        project: &'a str,
        name: &'a str,
    ) -> BackendFuture<'a, OperationHandle>;

    /// Waits on an operation; may return before it is done.
    fn wait_operation<'a>(
        &'a self,
        handle: &'a OperationHandle,
    ) -> BackendFuture<'a, OperationStatus>;

    /// Lists the zones visible to the project.
    fn list_zones<'a>(&'a self, project: &'a str) -> BackendFuture<'a, Vec<ZoneInfo>>;

    /// Searches the projects visible to the caller.
    fn search_projects(&self) -> BackendFuture<'_, Vec<ProjectInfo>>;
}
