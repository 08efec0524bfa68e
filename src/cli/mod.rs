//! Command-line interface definitions for the `gcevm` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI for the `gcevm` binary.
#[derive(Debug, Parser)]
#[command(
    name = "gcevm",
    about = "Create, tune, and tear down a free-tier Compute Engine VM",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Project to operate on. Falls back to `GCEVM_PROJECT_ID` or
    /// `project_id` in gcevm.toml.
    #[arg(long, global = true, value_name = "PROJECT")]
    pub(crate) project: Option<String>,
    /// Subcommand to run.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands of `gcevm`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// List the active projects visible to the access token.
    #[command(name = "projects")]
    Projects,
    /// List the usable zones of a region.
    #[command(name = "zones")]
    Zones(ZonesCommand),
    /// List instances across every zone of the project.
    #[command(name = "list")]
    List,
    /// Create the free-tier instance.
    #[command(name = "create")]
    Create(CreateCommand),
    /// Stop and start the instance until it lands on an AMD CPU.
    #[command(name = "reroll")]
    Reroll(InstanceArgs),
    /// Manage the tool's firewall rules.
    #[command(name = "firewall", subcommand)]
    Firewall(FirewallCommand),
    /// Download and run a provisioning script on the instance.
    #[command(name = "script")]
    Script(ScriptCommand),
    /// Upload a local dae configuration and restart dae.
    #[command(name = "deploy-dae")]
    DeployDae(DeployDaeCommand),
    /// Delete the instance, its disks, and the managed firewall rules.
    #[command(name = "delete")]
    Delete(DeleteCommand),
}

/// Arguments for `gcevm zones`.
#[derive(Debug, Args)]
pub(crate) struct ZonesCommand {
    /// Region whose zones are listed.
    #[arg(long, value_name = "REGION", default_value = "us-west1")]
    pub(crate) region: String,
}

/// Boot images offered by `gcevm create`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum ImageArg {
    /// Debian 12 (Bookworm).
    #[value(name = "debian-12")]
    Debian12,
    /// Ubuntu 22.04 LTS.
    #[value(name = "ubuntu-2204")]
    Ubuntu2204,
}

/// Arguments for `gcevm create`.
#[derive(Debug, Args)]
pub(crate) struct CreateCommand {
    /// Zone for the new instance. Defaults to the first usable zone of
    /// `--region`.
    #[arg(long, value_name = "ZONE")]
    pub(crate) zone: Option<String>,
    /// Region searched when `--zone` is omitted.
    #[arg(long, value_name = "REGION", default_value = "us-west1")]
    pub(crate) region: String,
    /// Boot image family.
    #[arg(long, value_enum, default_value_t = ImageArg::Debian12)]
    pub(crate) image: ImageArg,
}

/// Selects the instance a command acts on.
#[derive(Debug, Args)]
pub(crate) struct InstanceArgs {
    /// Instance name. Defaults to the configured instance name.
    #[arg(long, value_name = "NAME")]
    pub(crate) instance: Option<String>,
    /// Zone of the instance.
    #[arg(long, value_name = "ZONE")]
    pub(crate) zone: String,
}

/// Transports for remote commands.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum TransportArg {
    /// `gcloud compute ssh` / `gcloud compute scp`.
    Tunnel,
    /// Plain `ssh` / `scp` to the external address.
    Ssh,
}

/// Transport selection and direct-ssh overrides.
#[derive(Debug, Args)]
pub(crate) struct TransportArgs {
    /// Transport to use. Defaults to gcloud when installed, else ssh.
    #[arg(long, value_enum)]
    pub(crate) transport: Option<TransportArg>,
    /// Remote login for direct ssh.
    #[arg(long, value_name = "USER")]
    pub(crate) ssh_user: Option<String>,
    /// Port for direct ssh.
    #[arg(long, value_name = "PORT")]
    pub(crate) ssh_port: Option<u16>,
    /// Private key for direct ssh.
    #[arg(long, value_name = "PATH")]
    pub(crate) ssh_key: Option<String>,
}

/// Subcommands of `gcevm firewall`.
#[derive(Debug, Subcommand)]
pub(crate) enum FirewallCommand {
    /// Allow all inbound traffic.
    #[command(name = "allow-ingress")]
    AllowIngress(NetworkArgs),
    /// Deny outbound traffic to the ranges listed in a file.
    #[command(name = "deny-egress")]
    DenyEgress(DenyEgressCommand),
    /// Remove both managed rules.
    #[command(name = "remove")]
    Remove,
}

/// Picks the network from an instance when one is named.
#[derive(Debug, Args)]
pub(crate) struct NetworkArgs {
    /// Instance whose network receives the rule.
    #[arg(long, value_name = "NAME", requires = "zone")]
    pub(crate) instance: Option<String>,
    /// Zone of `--instance`.
    #[arg(long, value_name = "ZONE", requires = "instance")]
    pub(crate) zone: Option<String>,
}

/// Arguments for `gcevm firewall deny-egress`.
#[derive(Debug, Args)]
pub(crate) struct DenyEgressCommand {
    /// File with one CIDR range per line.
    #[arg(long, value_name = "FILE")]
    pub(crate) ranges: String,
    /// Network selection.
    #[command(flatten)]
    pub(crate) network: NetworkArgs,
}

/// Provisioning scripts runnable with `gcevm script`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum ScriptArg {
    /// Update apt sources and upgrade packages.
    Apt,
    /// Install the dae proxy.
    Dae,
    /// Close inbound traffic except ssh once over quota.
    NetIptables,
    /// Shut the instance down once over quota.
    NetShutdown,
}

/// Arguments for `gcevm script`.
#[derive(Debug, Args)]
pub(crate) struct ScriptCommand {
    /// Script to run.
    #[arg(value_enum)]
    pub(crate) script: ScriptArg,
    /// Target instance.
    #[command(flatten)]
    pub(crate) target: InstanceArgs,
    /// Transport options.
    #[command(flatten)]
    pub(crate) transport: TransportArgs,
}

/// Arguments for `gcevm deploy-dae`.
#[derive(Debug, Args)]
pub(crate) struct DeployDaeCommand {
    /// Local dae configuration file.
    #[arg(long, value_name = "FILE", default_value = "config.dae")]
    pub(crate) config: String,
    /// Target instance.
    #[command(flatten)]
    pub(crate) target: InstanceArgs,
    /// Transport options.
    #[command(flatten)]
    pub(crate) transport: TransportArgs,
}

/// Arguments for `gcevm delete`.
#[derive(Debug, Args)]
pub(crate) struct DeleteCommand {
    /// Must be exactly `DELETE` for anything to be removed.
    #[arg(long, value_name = "TOKEN", default_value = "")]
    pub(crate) confirm: String,
    /// Target instance.
    #[command(flatten)]
    pub(crate) target: InstanceArgs,
}
