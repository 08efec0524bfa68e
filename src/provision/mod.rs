//! Free-tier instance creation and the read-only listings around it.

use thiserror::Error;

use crate::backend::{
    Backend, DEFAULT_NETWORK, Instance, InstanceRef, InstanceSpec, ProjectInfo, ProviderError,
    ZoneInfo,
};
use crate::config::GceConfig;
use crate::report::Report;
use crate::waiter::OperationWaiter;

/// Network tags applied to created instances.
pub const INSTANCE_TAGS: [&str; 2] = ["http-server", "https-server"];

/// Boot image offered for new instances.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ImageChoice {
    /// Human readable name.
    pub label: &'static str,
    /// Project publishing the image family.
    pub project: &'static str,
    /// Image family; the newest image in it is used.
    pub family: &'static str,
}

/// Debian 12 (Bookworm).
pub const DEBIAN_12: ImageChoice = ImageChoice {
    label: "Debian 12 (Bookworm)",
    project: "debian-cloud",
    family: "debian-12",
};

/// Ubuntu 22.04 LTS.
pub const UBUNTU_2204: ImageChoice = ImageChoice {
    label: "Ubuntu 22.04 LTS",
    project: "ubuntu-os-cloud",
    family: "ubuntu-2204-lts",
};

/// Region eligible for the free tier.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegionChoice {
    /// Human readable name.
    pub label: &'static str,
    /// Region short name.
    pub region: &'static str,
    /// Zone used when the zone listing is unavailable.
    pub default_zone: &'static str,
}

/// Free-tier regions, recommended first.
pub const REGION_CHOICES: [RegionChoice; 3] = [
    RegionChoice {
        label: "Oregon",
        region: "us-west1",
        default_zone: "us-west1-b",
    },
    RegionChoice {
        label: "Iowa",
        region: "us-central1",
        default_zone: "us-central1-f",
    },
    RegionChoice {
        label: "South Carolina",
        region: "us-east1",
        default_zone: "us-east1-b",
    },
];

impl RegionChoice {
    /// Looks a free-tier region up by short name.
    #[must_use]
    pub fn find(region: &str) -> Option<Self> {
        REGION_CHOICES
            .into_iter()
            .find(|choice| choice.region == region)
    }
}

/// Zones of `region` whose status is `UP`, sorted by name.
#[must_use]
pub fn usable_zones(zones: &[ZoneInfo], region: &str) -> Vec<String> {
    let mut names: Vec<String> = zones
        .iter()
        .filter(|zone| zone.status == "UP" && zone.region == region)
        .map(|zone| zone.name.clone())
        .collect();
    names.sort();
    names
}

/// Instance shape used by [`Provisioner::create_instance`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionSettings {
    /// Instance name.
    pub instance_name: String,
    /// Machine type short name.
    pub machine_type: String,
    /// Boot disk size in GB.
    pub disk_size_gb: u32,
    /// Boot disk type short name.
    pub disk_type: String,
}

impl From<&GceConfig> for ProvisionSettings {
    fn from(config: &GceConfig) -> Self {
        Self {
            instance_name: config.instance_name.clone(),
            machine_type: config.machine_type.clone(),
            disk_size_gb: config.disk_size_gb,
            disk_type: config.disk_type.clone(),
        }
    }
}

/// Errors raised while creating an instance.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProvisionError {
    /// Raised when the image family cannot be resolved.
    #[error("failed to resolve image family {family}: {source}")]
    Image {
        /// Image family requested.
        family: String,
        /// Provider failure.
        #[source]
        source: ProviderError,
    },
    /// Raised when the insert call or its operation fails.
    #[error("failed to create instance {name}: {source}")]
    Insert {
        /// Instance name requested.
        name: String,
        /// Provider failure.
        #[source]
        source: ProviderError,
    },
}

/// Creates instances and answers the listings the CLI needs.
#[derive(Debug)]
pub struct Provisioner<'a, B: ?Sized> {
    backend: &'a B,
    settings: ProvisionSettings,
}

impl<'a, B: Backend + ?Sized> Provisioner<'a, B> {
    /// Creates a provisioner over `backend`.
    #[must_use]
    pub const fn new(backend: &'a B, settings: ProvisionSettings) -> Self {
        Self { backend, settings }
    }

    /// Builds the insert payload for `zone` and a resolved image link.
    #[must_use]
    pub fn instance_spec(&self, zone: &str, source_image: String) -> InstanceSpec {
        InstanceSpec {
            name: self.settings.instance_name.clone(),
            zone: zone.to_owned(),
            machine_type: self.settings.machine_type.clone(),
            source_image,
            disk_size_gb: self.settings.disk_size_gb,
            disk_type: self.settings.disk_type.clone(),
            network: String::from(DEFAULT_NETWORK),
            tags: INSTANCE_TAGS.iter().map(|tag| (*tag).to_owned()).collect(),
        }
    }

    /// Creates the instance in `zone` from the newest `image`, waits for it,
    /// and reports its external address when one is assigned.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when the image lookup or the insert fails.
    pub async fn create_instance(
        &self,
        project: &str,
        zone: &str,
        image: &ImageChoice,
        report: &mut Report,
    ) -> Result<InstanceRef, ProvisionError> {
        report.info(format!(
            "creating {} in {project}/{zone} from {}",
            self.settings.instance_name, image.label
        ));
        let source_image = self
            .backend
            .image_from_family(image.project, image.family)
            .await
            .map_err(|source| ProvisionError::Image {
                family: image.family.to_owned(),
                source,
            })?;

        let spec = self.instance_spec(zone, source_image);
        OperationWaiter::new(self.backend)
            .complete(self.backend.insert_instance(project, &spec))
            .await
            .map_err(|source| ProvisionError::Insert {
                name: spec.name.clone(),
                source,
            })?;
        report.success(format!("instance {} created", spec.name));

        let created = InstanceRef::new(spec.name, spec.zone);
        match self.backend.get_instance(project, &created).await {
            Ok(Instance {
                external_ip: Some(ip),
                ..
            }) => report.info(format!("external IP address: {ip}")),
            Ok(_) => report.info("no external IP address assigned yet"),
            Err(err) => report.warning(format!("could not read {created}: {err}")),
        }
        Ok(created)
    }

    /// Lists instances across every zone of `project`.
    ///
    /// # Errors
    ///
    /// Propagates the provider failure.
    pub async fn list_instances(&self, project: &str) -> Result<Vec<Instance>, ProviderError> {
        self.backend.list_instances(project).await
    }

    /// Usable zones of `region`.
    ///
    /// Falls back to the region's default zone, with a warning, when the
    /// listing fails or comes back empty.
    pub async fn zones_for_region(
        &self,
        project: &str,
        region: &str,
        report: &mut Report,
    ) -> Vec<String> {
        let listed = match self.backend.list_zones(project).await {
            Ok(zones) => usable_zones(&zones, region),
            Err(err) => {
                report.warning(format!("failed to list zones: {err}"));
                Vec::new()
            }
        };
        if !listed.is_empty() {
            return listed;
        }
        match RegionChoice::find(region) {
            Some(choice) => {
                report.warning(format!(
                    "no zones listed for {region}; using default zone {}",
                    choice.default_zone
                ));
                vec![choice.default_zone.to_owned()]
            }
            None => {
                report.warning(format!("no zones listed for {region}"));
                Vec::new()
            }
        }
    }

    /// Projects visible to the caller whose state is `ACTIVE`.
    ///
    /// # Errors
    ///
    /// Propagates the provider failure.
    pub async fn active_projects(&self) -> Result<Vec<ProjectInfo>, ProviderError> {
        let projects = self.backend.search_projects().await?;
        Ok(projects
            .into_iter()
            .filter(ProjectInfo::is_active)
            .collect())
    }
}
