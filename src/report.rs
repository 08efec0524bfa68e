//! Operator-facing diagnostics collected by the orchestrators.
//!
//! Components never abort the session on failure. Instead they return a
//! success indicator and push human-readable lines into a [`Report`]. Every
//! line is also emitted through `tracing` at the matching level so the binary
//! does not need to re-print it.

use std::fmt;

use tracing::{info, warn};

/// Severity of a single diagnostic line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    /// Progress information.
    Info,
    /// A step completed.
    Success,
    /// A step failed or was skipped in a way the operator should notice.
    Warning,
}

impl Severity {
    const fn label(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "ok",
            Self::Warning => "warn",
        }
    }
}

/// One line of a [`Report`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Diagnostic {
    /// Severity of the line.
    pub severity: Severity,
    /// Rendered message.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity.label(), self.message)
    }
}

/// Ordered collection of diagnostics.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Report {
    entries: Vec<Diagnostic>,
}

impl Report {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an informational line.
    pub fn info(&mut self, message: impl Into<String>) {
        let text = message.into();
        info!("{text}");
        self.push(Severity::Info, text);
    }

    /// Records a success line.
    pub fn success(&mut self, message: impl Into<String>) {
        let text = message.into();
        info!(outcome = "success", "{text}");
        self.push(Severity::Success, text);
    }

    /// Records a warning line.
    pub fn warning(&mut self, message: impl Into<String>) {
        let text = message.into();
        warn!("{text}");
        self.push(Severity::Warning, text);
    }

    /// Returns every recorded line in order.
    #[must_use]
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Iterates over warning lines only.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|entry| entry.severity == Severity::Warning)
    }

    /// Returns `true` when any line contains `needle`.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.entries.iter().any(|entry| entry.message.contains(needle))
    }

    fn push(&mut self, severity: Severity, message: String) {
        self.entries.push(Diagnostic { severity, message });
    }
}
