//! Remote script catalogue and the shell snippets run on the instance.

use std::fmt;

use shell_escape::unix::escape;

/// Raw base URL hosting the provisioning scripts.
pub const DEFAULT_SCRIPT_BASE_URL: &str =
    "https://raw.githubusercontent.com/fatekey/gcp_free/master/scripts";

/// Remote path a local dae configuration is uploaded to before installation.
pub const DAE_REMOTE_CONFIG_PATH: &str = "/tmp/config.dae";

/// Directory dae reads its configuration from.
pub const DAE_CONFIG_DIR: &str = "/usr/local/etc/dae";

/// `mktemp` template for downloaded scripts.
const SCRIPT_TEMP_TEMPLATE: &str = "/tmp/gcevm.XXXXXX";

/// Scripts the tool knows how to install.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RemoteScript {
    /// Refresh apt sources and upgrade packages.
    Apt,
    /// Install the dae proxy.
    Dae,
    /// Block everything but ssh inbound once the traffic allowance runs out.
    NetIptables,
    /// Power the instance off once the traffic allowance runs out.
    NetShutdown,
}

impl RemoteScript {
    /// File name under the script base URL.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Apt => "apt.sh",
            Self::Dae => "dae.sh",
            Self::NetIptables => "net_iptables.sh",
            Self::NetShutdown => "net_shutdown.sh",
        }
    }

    /// One-line description shown when the script runs.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Apt => "update apt sources and upgrade packages",
            Self::Dae => "install dae",
            Self::NetIptables => "close inbound traffic except ssh when over quota",
            Self::NetShutdown => "shut down when over quota",
        }
    }

    /// Full download URL below `base_url`.
    #[must_use]
    pub fn url(self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.file_name())
    }
}

impl fmt::Display for RemoteScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Builds the remote shell command that downloads and runs `script_url`.
///
/// The script lands in a `mktemp` file whose removal is registered as an
/// `EXIT` trap before the download starts, so it is removed whether the
/// download, the script, or neither fails. The exit status of the script is
/// the exit status of the command.
#[must_use]
pub fn build_script_command(script_url: &str) -> String {
    let url = escape(script_url.into());
    [
        String::from("set -e"),
        String::from(
            "if command -v curl >/dev/null 2>&1; then DL=\"curl -fsSL\"; \
             elif command -v wget >/dev/null 2>&1; then DL=\"wget -qO-\"; \
             else echo \"error: curl or wget not found\"; exit 1; fi",
        ),
        format!("tmp=$(mktemp {SCRIPT_TEMP_TEMPLATE})"),
        String::from("trap 'rm -f \"$tmp\"' EXIT"),
        format!("$DL {url} > \"$tmp\""),
        String::from("sudo bash \"$tmp\""),
    ]
    .join("; ")
}

/// Builds the remote shell command that installs an uploaded dae config and
/// restarts the service.
#[must_use]
pub fn build_dae_apply_command() -> String {
    let target = format!("{DAE_CONFIG_DIR}/config.dae");
    [
        String::from("set -e"),
        format!("sudo mkdir -p {DAE_CONFIG_DIR}"),
        format!("sudo cp {DAE_REMOTE_CONFIG_PATH} {target}"),
        format!("sudo chmod 600 {target}"),
        String::from("sudo systemctl enable dae"),
        String::from("sudo systemctl restart dae"),
        format!("rm -f {DAE_REMOTE_CONFIG_PATH}"),
    ]
    .join("; ")
}
