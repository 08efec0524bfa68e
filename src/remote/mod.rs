//! Remote command execution over a managed `gcloud` tunnel or direct ssh.
//!
//! The dispatcher builds argument vectors for either transport, runs them
//! through a [`CommandRunner`], and reports the outcome as a boolean plus
//! diagnostics. Failures never propagate past this boundary: a missing
//! address, a missing client binary, a spawn failure, and a non-zero exit
//! all end as `false` with a warning in the [`Report`].

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use camino::Utf8Path;
use tracing::debug;

use crate::backend::Instance;
use crate::config::ConfigError;
use crate::inputs::expand_tilde;
use crate::report::Report;
use crate::session::Session;

mod config;
mod script;
mod types;

pub use config::{FALLBACK_SSH_USER, RemoteConfig};
pub use script::{
    DAE_CONFIG_DIR, DAE_REMOTE_CONFIG_PATH, DEFAULT_SCRIPT_BASE_URL, RemoteScript,
    build_dae_apply_command, build_script_command,
};
pub use types::{
    CommandOutput, CommandRunner, InheritedCommandRunner, RemoteError,
    RemoteInvocation, TransportConfig,
};

/// Transport requested on the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportKind {
    /// `gcloud compute ssh`.
    Tunnel,
    /// Plain `ssh`.
    Ssh,
}

/// Looks client binaries up on a search path.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ToolLocator {
    dirs: Vec<PathBuf>,
}

impl ToolLocator {
    /// Locator over the directories of the current `PATH`.
    #[must_use]
    pub fn from_env() -> Self {
        let dirs = env::var_os("PATH")
            .map(|path| env::split_paths(&path).collect())
            .unwrap_or_default();
        Self { dirs }
    }

    /// Locator over an explicit directory list.
    #[must_use]
    pub const fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Returns `true` when `program` resolves to a file.
    ///
    /// Names containing a `/` are checked as paths rather than searched.
    #[must_use]
    pub fn has(&self, program: &str) -> bool {
        if program.contains('/') {
            return Path::new(program).is_file();
        }
        self.dirs.iter().any(|dir| dir.join(program).is_file())
    }
}

/// Builds and runs remote commands for one configured set of clients.
#[derive(Clone, Debug)]
pub struct RemoteDispatcher<R: CommandRunner> {
    config: RemoteConfig,
    runner: R,
    locator: ToolLocator,
}

impl RemoteDispatcher<InheritedCommandRunner> {
    /// Dispatcher whose child processes share the caller's terminal.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when validation fails.
    pub fn with_terminal(config: RemoteConfig) -> Result<Self, ConfigError> {
        Self::new(config, InheritedCommandRunner)
    }
}

impl<R: CommandRunner> RemoteDispatcher<R> {
    /// Creates a dispatcher probing the current `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when validation fails.
    pub fn new(config: RemoteConfig, runner: R) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            runner,
            locator: ToolLocator::from_env(),
        })
    }

    /// Replaces the binary locator.
    #[must_use]
    pub fn with_locator(mut self, locator: ToolLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Resolves the transport for this session.
    ///
    /// An explicit request is honoured when its client exists. Without one,
    /// `gcloud` is preferred and plain `ssh` is the fallback.
    pub fn select_transport(
        &self,
        requested: Option<TransportKind>,
        report: &mut Report,
    ) -> Option<TransportConfig> {
        let has_gcloud = self.locator.has(&self.config.gcloud_bin);
        let has_ssh = self.locator.has(&self.config.ssh_bin);
        match requested {
            Some(TransportKind::Tunnel) if has_gcloud => Some(TransportConfig::ManagedTunnel),
            Some(TransportKind::Tunnel) => {
                report.warning(format!(
                    "{} not found on PATH; cannot use the gcloud tunnel",
                    self.config.gcloud_bin
                ));
                None
            }
            Some(TransportKind::Ssh) if has_ssh => Some(self.direct_transport()),
            Some(TransportKind::Ssh) => {
                report.warning(format!(
                    "{} not found on PATH; cannot connect directly",
                    self.config.ssh_bin
                ));
                None
            }
            None if has_gcloud => Some(TransportConfig::ManagedTunnel),
            None if has_ssh => Some(self.direct_transport()),
            None => {
                report.warning("neither gcloud nor ssh found on PATH; cannot run remote commands");
                None
            }
        }
    }

    fn direct_transport(&self) -> TransportConfig {
        TransportConfig::DirectSecureShell {
            user: self.config.login_user(),
            port: self.config.ssh_port,
            key_path: self.config.ssh_identity_file.clone(),
        }
    }

    /// Builds the command that runs `command` on `instance`.
    ///
    /// Returns `None` with one warning when direct ssh is selected and the
    /// instance has no external address.
    pub fn build_exec(
        &self,
        project: &str,
        instance: &Instance,
        transport: &TransportConfig,
        command: &str,
        report: &mut Report,
    ) -> Option<RemoteInvocation> {
        let invocation = match transport {
            TransportConfig::ManagedTunnel => RemoteInvocation {
                program: self.config.gcloud_bin.clone(),
                args: os_args([
                    "compute",
                    "ssh",
                    instance.name.as_str(),
                    "--project",
                    project,
                    "--zone",
                    instance.zone.as_str(),
                    "--command",
                    command,
                ]),
            },
            TransportConfig::DirectSecureShell {
                user,
                port,
                key_path,
            } => {
                let host = external_host(instance, report)?;
                let mut args = direct_options("-p", *port, key_path.as_deref());
                args.push(OsString::from(format!("{user}@{host}")));
                args.push(OsString::from(command));
                RemoteInvocation {
                    program: self.config.ssh_bin.clone(),
                    args,
                }
            }
        };
        debug!(command = %invocation, "built remote command");
        Some(invocation)
    }

    /// Builds the command that copies `local_path` to `remote_path` on
    /// `instance`.
    ///
    /// Returns `None` with one warning when direct ssh is selected and either
    /// `scp` or the external address is missing.
    pub fn build_upload(
        &self,
        project: &str,
        instance: &Instance,
        transport: &TransportConfig,
        local_path: &Utf8Path,
        remote_path: &str,
        report: &mut Report,
    ) -> Option<RemoteInvocation> {
        let invocation = match transport {
            TransportConfig::ManagedTunnel => {
                let target = format!("{}:{remote_path}", instance.name);
                RemoteInvocation {
                    program: self.config.gcloud_bin.clone(),
                    args: os_args([
                        "compute",
                        "scp",
                        local_path.as_str(),
                        target.as_str(),
                        "--project",
                        project,
                        "--zone",
                        instance.zone.as_str(),
                    ]),
                }
            }
            TransportConfig::DirectSecureShell {
                user,
                port,
                key_path,
            } => {
                if !self.locator.has(&self.config.scp_bin) {
                    report.warning(format!(
                        "{} not found on PATH; cannot upload files",
                        self.config.scp_bin
                    ));
                    return None;
                }
                let host = external_host(instance, report)?;
                let mut args = direct_options("-P", *port, key_path.as_deref());
                args.push(OsString::from(local_path.as_str()));
                args.push(OsString::from(format!("{user}@{host}:{remote_path}")));
                RemoteInvocation {
                    program: self.config.scp_bin.clone(),
                    args,
                }
            }
        };
        debug!(command = %invocation, "built upload command");
        Some(invocation)
    }

    /// Runs `invocation`; `action` names it in diagnostics.
    ///
    /// Returns `true` only for exit code zero.
    pub fn execute(
        &self,
        invocation: &RemoteInvocation,
        action: &str,
        report: &mut Report,
    ) -> bool {
        match self.runner.run(&invocation.program, &invocation.args) {
            Ok(output) if output.is_success() => {
                report.success(format!("{action} finished"));
                true
            }
            Ok(output) => {
                let detail = output.stderr.trim();
                if detail.is_empty() {
                    report.warning(format!(
                        "{action} failed with exit status {}",
                        output.status_text()
                    ));
                } else {
                    report.warning(format!(
                        "{action} failed with exit status {}: {detail}",
                        output.status_text()
                    ));
                }
                false
            }
            Err(err) => {
                report.warning(format!("{action} failed: {err}"));
                false
            }
        }
    }

    /// Downloads and runs `script` on `instance` as root.
    pub fn run_script(
        &self,
        session: &Session,
        instance: &Instance,
        script: RemoteScript,
        report: &mut Report,
    ) -> bool {
        let Some(transport) = session_transport(session, report) else {
            return false;
        };
        let url = script.url(&self.config.script_base_url);
        let command = build_script_command(&url);
        let Some(invocation) =
            self.build_exec(session.project(), instance, transport, &command, report)
        else {
            return false;
        };
        report.info(format!(
            "running {script} ({}) on {} via {}",
            script.description(),
            instance.name,
            transport.label()
        ));
        self.execute(&invocation, &format!("remote script {script}"), report)
    }

    /// Uploads a local dae configuration and restarts dae with it.
    pub fn deploy_dae_config(
        &self,
        session: &Session,
        instance: &Instance,
        local_config: &Utf8Path,
        report: &mut Report,
    ) -> bool {
        if !local_config.is_file() {
            report.warning(format!("local config file not found: {local_config}"));
            return false;
        }
        let Some(transport) = session_transport(session, report) else {
            return false;
        };
        let Some(upload) = self.build_upload(
            session.project(),
            instance,
            transport,
            local_config,
            DAE_REMOTE_CONFIG_PATH,
            report,
        ) else {
            return false;
        };
        report.info(format!("uploading {local_config} to {DAE_REMOTE_CONFIG_PATH}"));
        if !self.execute(&upload, "config upload", report) {
            return false;
        }

        let Some(apply) = self.build_exec(
            session.project(),
            instance,
            transport,
            &build_dae_apply_command(),
            report,
        ) else {
            return false;
        };
        report.info("applying config and restarting dae");
        self.execute(&apply, "dae config apply", report)
    }
}

fn session_transport<'a>(session: &'a Session, report: &mut Report) -> Option<&'a TransportConfig> {
    match session.require_transport() {
        Ok(transport) => Some(transport),
        Err(err) => {
            report.warning(err.to_string());
            None
        }
    }
}

fn external_host<'a>(instance: &'a Instance, report: &mut Report) -> Option<&'a str> {
    let host = instance
        .external_ip
        .as_deref()
        .map(str::trim)
        .filter(|host| !host.is_empty() && *host != "-");
    if host.is_none() {
        report.warning(format!(
            "instance {} has no external IP; direct ssh is unavailable",
            instance.name
        ));
    }
    host
}

fn direct_options(port_flag: &str, port: Option<u16>, key_path: Option<&str>) -> Vec<OsString> {
    let mut args = Vec::new();
    if let Some(value) = port {
        args.push(OsString::from(port_flag));
        args.push(OsString::from(value.to_string()));
    }
    if let Some(key) = key_path {
        args.push(OsString::from("-i"));
        args.push(OsString::from(expand_tilde(key)));
    }
    args
}

fn os_args<const N: usize>(args: [&str; N]) -> Vec<OsString> {
    args.into_iter().map(OsString::from).collect()
}
