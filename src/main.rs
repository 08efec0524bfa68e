//! Binary entry point for the gcevm CLI.

use std::error::Error as StdError;
use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use gcevm::backend::DEFAULT_NETWORK;
use gcevm::inputs::expand_tilde;
use gcevm::provision::{DEBIAN_12, UBUNTU_2204};
use gcevm::{
    Backend, ConfigError, CpuReroller, FirewallManager, GceBackend, GceConfig, GceError,
    ImageChoice, Instance, InstanceRef, InputError, ProvisionError, ProvisionSettings,
    Provisioner, ProviderError, RemoteConfig, RemoteDispatcher, RemoteScript, Report, RerollError,
    Session, SessionError, TeardownOrchestrator, TokioSleeper, TransportKind,
    read_address_ranges,
};

mod cli;
#[cfg(test)]
mod test_helpers;

use cli::{
    Cli, Command, CreateCommand, DeleteCommand, DeployDaeCommand, FirewallCommand, ImageArg,
    InstanceArgs, NetworkArgs, ScriptArg, ScriptCommand, TransportArg, TransportArgs,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("backend error: {0}")]
    Backend(#[from] GceError),
    #[error("provider call failed: {0}")]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error("reroll failed: {0}")]
    Reroll(#[from] RerollError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
}

/// Runs one subcommand; `Ok(false)` means the component reported failure.
async fn dispatch(cli: Cli) -> Result<bool, CliError> {
    let config = GceConfig::load_without_cli_args()?;
    config.validate()?;
    let backend = GceBackend::new(&config)?;
    let Cli {
        project: requested,
        command,
    } = cli;
    let resolve_project = || config.resolve_project(requested.as_deref());
    let mut report = Report::new();
    match command {
        Command::Projects => list_projects(&backend, &config).await,
        Command::Zones(args) => {
            let project = resolve_project()?;
            let zones = Provisioner::new(&backend, ProvisionSettings::from(&config))
                .zones_for_region(&project, &args.region, &mut report)
                .await;
            let mut stdout = io::stdout();
            for zone in &zones {
                writeln!(stdout, "{zone}")?;
            }
            Ok(!zones.is_empty())
        }
        Command::List => {
            let project = resolve_project()?;
            let instances = Provisioner::new(&backend, ProvisionSettings::from(&config))
                .list_instances(&project)
                .await?;
            write_instances(io::stdout(), &instances)?;
            Ok(true)
        }
        Command::Create(args) => {
            create(&backend, &config, &resolve_project()?, &args, &mut report).await
        }
        Command::Reroll(target) => {
            let project = resolve_project()?;
            let session = Session::new(&project).with_instance(instance_ref(&config, &target));
            let summary = CpuReroller::new(&backend, TokioSleeper)
                .run(&session)
                .await?;
            writeln!(
                io::stdout(),
                "{} after {} attempt(s)",
                summary.platform,
                summary.attempts
            )?;
            Ok(true)
        }
        Command::Firewall(action) => {
            firewall(&backend, &resolve_project()?, &action, &mut report).await
        }
        Command::Script(args) => {
            run_script(&backend, &config, &resolve_project()?, &args, &mut report).await
        }
        Command::DeployDae(args) => {
            deploy_dae(&backend, &config, &resolve_project()?, &args, &mut report).await
        }
        Command::Delete(args) => {
            delete(&backend, &config, &resolve_project()?, &args, &mut report).await
        }
    }
}

async fn list_projects(backend: &GceBackend, config: &GceConfig) -> Result<bool, CliError> {
    let projects = Provisioner::new(backend, ProvisionSettings::from(config))
        .active_projects()
        .await?;
    let mut stdout = io::stdout();
    for project in &projects {
        writeln!(stdout, "{}\t{}", project.project_id, project.display_name)?;
    }
    Ok(true)
}

async fn create(
    backend: &GceBackend,
    config: &GceConfig,
    project: &str,
    args: &CreateCommand,
    report: &mut Report,
) -> Result<bool, CliError> {
    let provisioner = Provisioner::new(backend, ProvisionSettings::from(config));
    let zone = match &args.zone {
        Some(zone) => zone.clone(),
        None => {
            let zones = provisioner
                .zones_for_region(project, &args.region, report)
                .await;
            let Some(first) = zones.into_iter().next() else {
                return Ok(false);
            };
            first
        }
    };
    let created = provisioner
        .create_instance(project, &zone, &image_choice(args.image), report)
        .await?;
    writeln!(io::stdout(), "{created}")?;
    Ok(true)
}

async fn firewall(
    backend: &GceBackend,
    project: &str,
    command: &FirewallCommand,
    report: &mut Report,
) -> Result<bool, CliError> {
    let manager = FirewallManager::new(backend);
    match command {
        FirewallCommand::AllowIngress(args) => {
            let network = resolve_network(backend, project, args, report).await;
            Ok(manager
                .allow_all_ingress(project, &network, report)
                .await
                .is_success())
        }
        FirewallCommand::DenyEgress(args) => {
            let ranges = read_address_ranges(&args.ranges)?;
            let network = resolve_network(backend, project, &args.network, report).await;
            Ok(manager
                .deny_egress(project, &network, &ranges, report)
                .await
                .is_success())
        }
        FirewallCommand::Remove => Ok(manager.delete_all(project, report).await),
    }
}

/// Network of the named instance, or the default network.
async fn resolve_network(
    backend: &GceBackend,
    project: &str,
    args: &NetworkArgs,
    report: &mut Report,
) -> String {
    let (Some(name), Some(zone)) = (&args.instance, &args.zone) else {
        return String::from(DEFAULT_NETWORK);
    };
    let target = InstanceRef::new(name, zone);
    match backend.get_instance(project, &target).await {
        Ok(instance) => instance.network,
        Err(err) => {
            report.warning(format!(
                "could not read {target}; using {DEFAULT_NETWORK}: {err}"
            ));
            String::from(DEFAULT_NETWORK)
        }
    }
}

async fn run_script(
    backend: &GceBackend,
    config: &GceConfig,
    project: &str,
    args: &ScriptCommand,
    report: &mut Report,
) -> Result<bool, CliError> {
    let Some((dispatcher, session)) =
        remote_session(config, project, &args.target, &args.transport, report)?
    else {
        return Ok(false);
    };
    let instance = fetch_target(backend, &session).await?;
    Ok(dispatcher.run_script(&session, &instance, remote_script(args.script), report))
}

async fn deploy_dae(
    backend: &GceBackend,
    config: &GceConfig,
    project: &str,
    args: &DeployDaeCommand,
    report: &mut Report,
) -> Result<bool, CliError> {
    let Some((dispatcher, session)) =
        remote_session(config, project, &args.target, &args.transport, report)?
    else {
        return Ok(false);
    };
    let instance = fetch_target(backend, &session).await?;
    let local = Utf8PathBuf::from(expand_tilde(&args.config));
    Ok(dispatcher.deploy_dae_config(&session, &instance, &local, report))
}

async fn delete(
    backend: &GceBackend,
    config: &GceConfig,
    project: &str,
    args: &DeleteCommand,
    report: &mut Report,
) -> Result<bool, CliError> {
    let mut session = Session::new(project).with_instance(instance_ref(config, &args.target));
    let outcome = TeardownOrchestrator::new(backend)
        .run(&mut session, &args.confirm, report)
        .await?;
    Ok(outcome.is_success())
}

type TerminalDispatcher = RemoteDispatcher<gcevm::remote::InheritedCommandRunner>;

/// Loads remote settings, applies the command-line overrides, and picks a
/// transport. `None` means no usable client was found.
fn remote_session(
    config: &GceConfig,
    project: &str,
    target: &InstanceArgs,
    transport: &TransportArgs,
    report: &mut Report,
) -> Result<Option<(TerminalDispatcher, Session)>, CliError> {
    let remote = apply_transport_overrides(RemoteConfig::load_without_cli_args()?, transport);
    let dispatcher = RemoteDispatcher::with_terminal(remote)?;
    let Some(selected) =
        dispatcher.select_transport(transport.transport.map(transport_kind), report)
    else {
        return Ok(None);
    };
    let session = Session::new(project)
        .with_instance(instance_ref(config, target))
        .with_transport(selected);
    Ok(Some((dispatcher, session)))
}

async fn fetch_target(backend: &GceBackend, session: &Session) -> Result<Instance, CliError> {
    let target = session.require_instance()?;
    Ok(backend.get_instance(session.project(), target).await?)
}

fn apply_transport_overrides(mut remote: RemoteConfig, args: &TransportArgs) -> RemoteConfig {
    if let Some(user) = &args.ssh_user {
        remote.ssh_user = Some(user.clone());
    }
    if let Some(port) = args.ssh_port {
        remote.ssh_port = Some(port);
    }
    if let Some(key) = &args.ssh_key {
        remote.ssh_identity_file = Some(key.clone());
    }
    remote
}

fn instance_ref(config: &GceConfig, args: &InstanceArgs) -> InstanceRef {
    let name = args
        .instance
        .clone()
        .unwrap_or_else(|| config.instance_name.clone());
    InstanceRef::new(name, &args.zone)
}

const fn image_choice(image: ImageArg) -> ImageChoice {
    match image {
        ImageArg::Debian12 => DEBIAN_12,
        ImageArg::Ubuntu2204 => UBUNTU_2204,
    }
}

const fn remote_script(script: ScriptArg) -> RemoteScript {
    match script {
        ScriptArg::Apt => RemoteScript::Apt,
        ScriptArg::Dae => RemoteScript::Dae,
        ScriptArg::NetIptables => RemoteScript::NetIptables,
        ScriptArg::NetShutdown => RemoteScript::NetShutdown,
    }
}

const fn transport_kind(transport: TransportArg) -> TransportKind {
    match transport {
        TransportArg::Tunnel => TransportKind::Tunnel,
        TransportArg::Ssh => TransportKind::Ssh,
    }
}

fn write_instances(mut target: impl Write, instances: &[Instance]) -> io::Result<()> {
    if instances.is_empty() {
        return writeln!(target, "no instances found");
    }
    for instance in instances {
        writeln!(
            target,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            instance.name,
            instance.zone,
            instance.status,
            instance.cpu_platform,
            network_name(&instance.network),
            instance.internal_ip.as_deref().unwrap_or("-"),
            instance.external_ip.as_deref().unwrap_or("-")
        )?;
    }
    Ok(())
}

/// Short network name from a full or relative network link.
fn network_name(network: &str) -> &str {
    network.rsplit('/').next().unwrap_or(network)
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

/// Writes `err` followed by its source chain.
fn write_error(mut target: impl Write, err: &CliError) {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = cause.source();
    }
    writeln!(target, "error: {rendered}").ok();
}
