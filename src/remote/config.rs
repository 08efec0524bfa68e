//! Remote execution settings loaded via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::config::{ConfigError, FieldMetadata, require_field};

use super::script::DEFAULT_SCRIPT_BASE_URL;

/// Login used for direct ssh when neither configuration nor `USER` names one.
pub const FALLBACK_SSH_USER: &str = "root";

/// Client binaries and direct-ssh defaults.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "GCEVM_REMOTE",
    discovery(
        app_name = "gcevm",
        env_var = "GCEVM_CONFIG_PATH",
        config_file_name = "gcevm.toml",
        dotfile_name = ".gcevm.toml",
        project_file_name = "gcevm.toml"
    )
)]
pub struct RemoteConfig {
    /// Path to the `gcloud` executable.
    #[ortho_config(default = "gcloud".to_owned())]
    pub gcloud_bin: String,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `scp` executable.
    #[ortho_config(default = "scp".to_owned())]
    pub scp_bin: String,
    /// Raw base URL the provisioning scripts are downloaded from.
    #[ortho_config(default = DEFAULT_SCRIPT_BASE_URL.to_owned())]
    pub script_base_url: String,
    /// Remote login for direct ssh. Defaults to the local `USER`.
    pub ssh_user: Option<String>,
    /// Port for direct ssh. The client default applies when unset.
    pub ssh_port: Option<u16>,
    /// Private key for direct ssh. Supports `~/` expansion.
    pub ssh_identity_file: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            gcloud_bin: String::from("gcloud"),
            ssh_bin: String::from("ssh"),
            scp_bin: String::from("scp"),
            script_base_url: String::from(DEFAULT_SCRIPT_BASE_URL),
            ssh_user: None,
            ssh_port: None,
            ssh_identity_file: None,
        }
    }
}

impl RemoteConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("gcevm")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Ensures binaries and optional overrides are not blank.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.gcloud_bin,
            &FieldMetadata::new("gcloud binary", "GCEVM_REMOTE_GCLOUD_BIN", "gcloud_bin"),
        )?;
        require_field(
            &self.ssh_bin,
            &FieldMetadata::new("ssh binary", "GCEVM_REMOTE_SSH_BIN", "ssh_bin"),
        )?;
        require_field(
            &self.scp_bin,
            &FieldMetadata::new("scp binary", "GCEVM_REMOTE_SCP_BIN", "scp_bin"),
        )?;
        require_field(
            &self.script_base_url,
            &FieldMetadata::new(
                "script base URL",
                "GCEVM_REMOTE_SCRIPT_BASE_URL",
                "script_base_url",
            ),
        )?;
        if let Some(user) = self.ssh_user.as_deref() {
            require_field(
                user,
                &FieldMetadata::new("ssh user", "GCEVM_REMOTE_SSH_USER", "ssh_user"),
            )?;
        }
        if let Some(key) = self.ssh_identity_file.as_deref() {
            require_field(
                key,
                &FieldMetadata::new(
                    "ssh identity file",
                    "GCEVM_REMOTE_SSH_IDENTITY_FILE",
                    "ssh_identity_file",
                ),
            )?;
        }
        Ok(())
    }

    /// Login for direct ssh: configuration, then `USER`, then `root`.
    #[must_use]
    pub fn login_user(&self) -> String {
        self.ssh_user
            .clone()
            .or_else(|| std::env::var("USER").ok().filter(|user| !user.is_empty()))
            .unwrap_or_else(|| String::from(FALLBACK_SSH_USER))
    }
}
