//! Configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default Compute Engine v1 endpoint.
pub const DEFAULT_COMPUTE_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";

/// Default Resource Manager v3 endpoint.
pub const DEFAULT_RESOURCE_MANAGER_BASE_URL: &str =
    "https://cloudresourcemanager.googleapis.com/v3";

/// Name given to instances created by the tool.
pub const DEFAULT_INSTANCE_NAME: &str = "free-tier-vm";

/// Machine type eligible for the free tier.
pub const DEFAULT_MACHINE_TYPE: &str = "e2-micro";

/// Boot disk size in GB eligible for the free tier.
pub const DEFAULT_DISK_SIZE_GB: u32 = 30;

/// Boot disk type eligible for the free tier.
pub const DEFAULT_DISK_TYPE: &str = "pd-standard";

/// Compute Engine settings derived from environment variables and
/// configuration files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "GCEVM",
    discovery(
        app_name = "gcevm",
        env_var = "GCEVM_CONFIG_PATH",
        config_file_name = "gcevm.toml",
        dotfile_name = ".gcevm.toml",
        project_file_name = "gcevm.toml"
    )
)]
pub struct GceConfig {
    /// OAuth bearer token, for example from `gcloud auth print-access-token`.
    #[ortho_config(default = String::new())]
    pub access_token: String,
    /// Project used when `--project` is not given.
    pub project_id: Option<String>,
    /// Compute Engine API root.
    #[ortho_config(default = DEFAULT_COMPUTE_BASE_URL.to_owned())]
    pub compute_base_url: String,
    /// Resource Manager API root.
    #[ortho_config(default = DEFAULT_RESOURCE_MANAGER_BASE_URL.to_owned())]
    pub resource_manager_base_url: String,
    /// Name of instances created by `create`.
    #[ortho_config(default = DEFAULT_INSTANCE_NAME.to_owned())]
    pub instance_name: String,
    /// Machine type of instances created by `create`.
    #[ortho_config(default = DEFAULT_MACHINE_TYPE.to_owned())]
    pub machine_type: String,
    /// Boot disk size in GB.
    #[ortho_config(default = DEFAULT_DISK_SIZE_GB)]
    pub disk_size_gb: u32,
    /// Boot disk type.
    #[ortho_config(default = DEFAULT_DISK_TYPE.to_owned())]
    pub disk_type: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
pub(crate) struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    pub(crate) const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

/// Rejects empty or whitespace-only values with a message naming where to set them.
pub(crate) fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to gcevm.toml",
            metadata.description, metadata.env_var, metadata.toml_key
        )));
    }
    Ok(())
}

impl GceConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("gcevm")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when the disk size is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.access_token,
            &FieldMetadata::new("API access token", "GCEVM_ACCESS_TOKEN", "access_token"),
        )?;
        require_field(
            &self.compute_base_url,
            &FieldMetadata::new(
                "Compute Engine endpoint",
                "GCEVM_COMPUTE_BASE_URL",
                "compute_base_url",
            ),
        )?;
        require_field(
            &self.resource_manager_base_url,
            &FieldMetadata::new(
                "Resource Manager endpoint",
                "GCEVM_RESOURCE_MANAGER_BASE_URL",
                "resource_manager_base_url",
            ),
        )?;
        require_field(
            &self.instance_name,
            &FieldMetadata::new("instance name", "GCEVM_INSTANCE_NAME", "instance_name"),
        )?;
        require_field(
            &self.machine_type,
            &FieldMetadata::new("machine type", "GCEVM_MACHINE_TYPE", "machine_type"),
        )?;
        require_field(
            &self.disk_type,
            &FieldMetadata::new("disk type", "GCEVM_DISK_TYPE", "disk_type"),
        )?;
        if self.disk_size_gb == 0 {
            return Err(ConfigError::Invalid(String::from(
                "disk_size_gb must be at least 1 (GCEVM_DISK_SIZE_GB)",
            )));
        }
        Ok(())
    }

    /// Picks the project from the command line, falling back to configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when neither source names one.
    pub fn resolve_project(&self, cli_project: Option<&str>) -> Result<String, ConfigError> {
        let project = cli_project
            .or(self.project_id.as_deref())
            .unwrap_or_default();
        require_field(
            project,
            &FieldMetadata::new(
                "project ID (or pass --project)",
                "GCEVM_PROJECT_ID",
                "project_id",
            ),
        )?;
        Ok(project.trim().to_owned())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
