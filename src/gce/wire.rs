//! JSON shapes exchanged with the Compute Engine and Resource Manager APIs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::backend::{
    DEFAULT_NETWORK, Direction, FirewallRule, Instance, InstanceSpec, InstanceStatus,
    OperationStatus, ProjectInfo, ProviderError, RuleAction, UNKNOWN_CPU_PLATFORM, ZoneInfo,
};

use super::error::classify_operation_code;

/// Returns the segment after the last `/` of a resource URL.
pub(crate) fn last_segment(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InstanceResource {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) zone: String,
    #[serde(default)]
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) cpu_platform: Option<String>,
    #[serde(default)]
    pub(crate) network_interfaces: Vec<NetworkInterface>,
    #[serde(default)]
    pub(crate) disks: Vec<AttachedDisk>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NetworkInterface {
    #[serde(default)]
    pub(crate) network: Option<String>,
    #[serde(default, rename = "networkIP")]
    pub(crate) network_ip: Option<String>,
    #[serde(default)]
    pub(crate) access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AccessConfig {
    #[serde(default, rename = "natIP")]
    pub(crate) nat_ip: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AttachedDisk {
    #[serde(default)]
    pub(crate) source: Option<String>,
}

impl InstanceResource {
    /// Maps the API resource onto [`Instance`]; `fallback_zone` covers
    /// responses that omit the zone link.
    pub(crate) fn into_instance(self, fallback_zone: &str) -> Instance {
        let zone = if self.zone.is_empty() {
            fallback_zone.to_owned()
        } else {
            last_segment(&self.zone).to_owned()
        };
        let primary = self.network_interfaces.into_iter().next().unwrap_or_default();
        let external_ip = primary
            .access_configs
            .into_iter()
            .next()
            .and_then(|config| config.nat_ip)
            .filter(|ip| !ip.is_empty());
        Instance {
            name: self.name,
            zone,
            status: InstanceStatus::from_provider(&self.status),
            cpu_platform: self
                .cpu_platform
                .filter(|platform| !platform.is_empty())
                .unwrap_or_else(|| String::from(UNKNOWN_CPU_PLATFORM)),
            network: primary
                .network
                .unwrap_or_else(|| String::from(DEFAULT_NETWORK)),
            internal_ip: primary.network_ip,
            external_ip,
            disks: self
                .disks
                .into_iter()
                .filter_map(|disk| disk.source)
                .map(|source| last_segment(&source).to_owned())
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AggregatedInstances {
    #[serde(default)]
    pub(crate) items: BTreeMap<String, ScopedInstances>,
    #[serde(default)]
    pub(crate) next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ScopedInstances {
    #[serde(default)]
    pub(crate) instances: Vec<InstanceResource>,
}

impl AggregatedInstances {
    /// Flattens every zone bucket; the bucket key (`zones/<zone>`) backs up
    /// a missing zone link.
    pub(crate) fn into_instances(self) -> Vec<Instance> {
        self.items
            .into_iter()
            .flat_map(|(scope, bucket)| {
                let zone = last_segment(&scope).to_owned();
                bucket
                    .instances
                    .into_iter()
                    .map(move |resource| resource.into_instance(&zone))
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ImageResource {
    pub(crate) self_link: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ZoneList {
    #[serde(default)]
    pub(crate) items: Vec<ZoneResource>,
    #[serde(default)]
    pub(crate) next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ZoneResource {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) region: String,
    #[serde(default)]
    pub(crate) status: String,
}

impl From<ZoneResource> for ZoneInfo {
    fn from(value: ZoneResource) -> Self {
        Self {
            region: last_segment(&value.region).to_owned(),
            name: value.name,
            status: value.status,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProjectSearch {
    #[serde(default)]
    pub(crate) projects: Vec<ProjectResource>,
    #[serde(default)]
    pub(crate) next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProjectResource {
    pub(crate) project_id: String,
    #[serde(default)]
    pub(crate) display_name: String,
    #[serde(default)]
    pub(crate) state: String,
}

impl From<ProjectResource> for ProjectInfo {
    fn from(value: ProjectResource) -> Self {
        Self {
            project_id: value.project_id,
            display_name: value.display_name,
            state: value.state,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OperationResource {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) error: Option<OperationErrors>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OperationErrors {
    #[serde(default)]
    pub(crate) errors: Vec<OperationErrorItem>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OperationErrorItem {
    #[serde(default)]
    pub(crate) code: String,
    #[serde(default)]
    pub(crate) message: String,
}

impl OperationResource {
    /// Interprets a wait response. Only `DONE` ends the wait; the first
    /// reported error decides the classification.
    pub(crate) fn into_status(self) -> OperationStatus {
        if self.status != "DONE" {
            return OperationStatus::Pending;
        }
        let first = self
            .error
            .and_then(|errors| errors.errors.into_iter().next());
        match first {
            None => OperationStatus::Done(Ok(())),
            Some(item) => {
                let kind = classify_operation_code(&item.code, &item.message);
                let message = if item.message.is_empty() {
                    item.code
                } else {
                    format!("{}: {}", item.code, item.message)
                };
                OperationStatus::Done(Err(ProviderError::new(kind, message)))
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InstanceInsert {
    name: String,
    machine_type: String,
    disks: Vec<DiskInsert>,
    network_interfaces: Vec<InterfaceInsert>,
    tags: TagsInsert,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DiskInsert {
    boot: bool,
    auto_delete: bool,
    initialize_params: DiskParams,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DiskParams {
    source_image: String,
    disk_size_gb: String,
    disk_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InterfaceInsert {
    network: String,
    access_configs: Vec<AccessConfigInsert>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessConfigInsert {
    name: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    network_tier: &'static str,
}

#[derive(Debug, Serialize)]
struct TagsInsert {
    items: Vec<String>,
}

impl From<&InstanceSpec> for InstanceInsert {
    fn from(spec: &InstanceSpec) -> Self {
        Self {
            name: spec.name.clone(),
            machine_type: format!("zones/{}/machineTypes/{}", spec.zone, spec.machine_type),
            disks: vec![DiskInsert {
                boot: true,
                auto_delete: true,
                initialize_params: DiskParams {
                    source_image: spec.source_image.clone(),
                    disk_size_gb: spec.disk_size_gb.to_string(),
                    disk_type: format!("zones/{}/diskTypes/{}", spec.zone, spec.disk_type),
                },
            }],
            network_interfaces: vec![InterfaceInsert {
                network: spec.network.clone(),
                access_configs: vec![AccessConfigInsert {
                    name: "External NAT",
                    kind: "ONE_TO_ONE_NAT",
                    network_tier: "STANDARD",
                }],
            }],
            tags: TagsInsert {
                items: spec.tags.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FirewallInsert {
    name: String,
    network: String,
    direction: &'static str,
    priority: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed: Option<Vec<ProtocolMatch>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    denied: Option<Vec<ProtocolMatch>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    source_ranges: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    destination_ranges: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ProtocolMatch {
    #[serde(rename = "IPProtocol")]
    ip_protocol: String,
}

impl From<&FirewallRule> for FirewallInsert {
    fn from(rule: &FirewallRule) -> Self {
        let matched = Some(vec![ProtocolMatch {
            ip_protocol: rule.protocol.clone(),
        }]);
        let (allowed, denied) = match rule.action {
            RuleAction::Allow => (matched, None),
            RuleAction::Deny => (None, matched),
        };
        let (source_ranges, destination_ranges) = match rule.direction {
            Direction::Ingress => (rule.ranges.clone(), Vec::new()),
            Direction::Egress => (Vec::new(), rule.ranges.clone()),
        };
        Self {
            name: rule.name.clone(),
            network: rule.network.clone(),
            direction: rule.direction.as_str(),
            priority: rule.priority,
            allowed,
            denied,
            source_ranges,
            destination_ranges,
        }
    }
}
