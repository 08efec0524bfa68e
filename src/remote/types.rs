//! Process execution seam and transport selection types.

use std::ffi::OsString;
use std::fmt;
use std::process::{Command, Stdio};

use thiserror::Error;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard error. Empty when the output was not captured.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Human readable exit status, `unknown` when the process was killed.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// Errors surfaced at the process boundary.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RemoteError {
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments and reports its exit status.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError>;
}

/// Runner that hands the terminal to the child process.
///
/// Remote installers prompt and print progress, so the CLI lets them talk to
/// the operator directly; only the exit code comes back.
#[derive(Clone, Copy, Debug, Default)]
pub struct InheritedCommandRunner;

impl CommandRunner for InheritedCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|err| spawn_error(program, &err))?;

        Ok(CommandOutput {
            code: status.code(),
            stderr: String::new(),
        })
    }
}

fn spawn_error(program: &str, err: &std::io::Error) -> RemoteError {
    RemoteError::Spawn {
        program: program.to_owned(),
        message: err.to_string(),
    }
}

/// How remote commands reach the instance. Selected once per session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransportConfig {
    /// `gcloud compute ssh` / `gcloud compute scp`, which handle keys and
    /// identity-aware tunnelling themselves.
    ManagedTunnel,
    /// Plain `ssh` / `scp` against the instance's external address.
    DirectSecureShell {
        /// Remote login name.
        user: String,
        /// Port override; the client default applies when absent.
        port: Option<u16>,
        /// Private key path; the client default keys apply when absent.
        key_path: Option<String>,
    },
}

impl TransportConfig {
    /// Short label used in diagnostics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ManagedTunnel => "gcloud tunnel",
            Self::DirectSecureShell { .. } => "direct ssh",
        }
    }
}

/// Fully built command line, ready for a [`CommandRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteInvocation {
    /// Program to launch.
    pub program: String,
    /// Arguments, passed without a local shell.
    pub args: Vec<OsString>,
}

impl fmt::Display for RemoteInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}
