//! Explicit session context passed into every orchestration call.

use thiserror::Error;

use crate::backend::InstanceRef;
use crate::remote::TransportConfig;

/// Errors raised when a session lacks a required selection.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SessionError {
    /// Raised when an instance-scoped action runs without a selected instance.
    #[error("no instance selected for project {project}")]
    NoInstance {
        /// Project of the session.
        project: String,
    },
    /// Raised when a remote action runs without a selected transport.
    #[error("no remote transport selected")]
    NoTransport,
}

/// Project, current instance, and current transport of one operator session.
///
/// Components read the session; teardown also forgets the instance it
/// removed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Session {
    project: String,
    instance: Option<InstanceRef>,
    transport: Option<TransportConfig>,
}

impl Session {
    /// Starts a session for `project` with nothing selected.
    #[must_use]
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            instance: None,
            transport: None,
        }
    }

    /// Returns the project identifier.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Selects the instance targeted by subsequent actions.
    #[must_use]
    pub fn with_instance(mut self, instance: InstanceRef) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Selects the transport used for remote actions.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Returns the selected instance, if any.
    #[must_use]
    pub const fn instance(&self) -> Option<&InstanceRef> {
        self.instance.as_ref()
    }

    /// Returns the selected instance or an error naming the project.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoInstance`] when nothing is selected.
    pub fn require_instance(&self) -> Result<&InstanceRef, SessionError> {
        self.instance.as_ref().ok_or_else(|| SessionError::NoInstance {
            project: self.project.clone(),
        })
    }

    /// Returns the selected transport or an error.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoTransport`] when nothing is selected.
    pub fn require_transport(&self) -> Result<&TransportConfig, SessionError> {
        self.transport.as_ref().ok_or(SessionError::NoTransport)
    }

    /// Forgets the selected instance, typically after teardown.
    pub fn clear_instance(&mut self) {
        self.instance = None;
    }
}
