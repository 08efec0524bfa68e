//! Error types for the Compute Engine REST client.

use serde::Deserialize;
use thiserror::Error;

use crate::backend::{ProviderError, ProviderErrorKind, classify_message};

/// Errors raised by the REST client before they are folded into
/// [`ProviderError`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum GceError {
    /// Raised when the client configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the request never produced a response.
    #[error("{context}: request failed: {message}")]
    Http {
        /// Call being made.
        context: String,
        /// Transport error text.
        message: String,
    },
    /// Raised when the API answered with a non-success status.
    #[error("{context}: HTTP {status}: {message}")]
    Status {
        /// Call being made.
        context: String,
        /// HTTP status code.
        status: u16,
        /// First `reason` of the error payload, when present.
        reason: Option<String>,
        /// Error message from the payload, or the raw body.
        message: String,
    },
    /// Raised when a success body does not match the expected shape.
    #[error("{context}: unexpected response: {message}")]
    Decode {
        /// Call being made.
        context: String,
        /// Parser error text.
        message: String,
    },
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorItem {
    #[serde(default)]
    reason: String,
}

impl GceError {
    /// Builds a [`GceError::Status`] from a failed response body.
    ///
    /// Bodies that are not the standard error envelope are kept verbatim.
    #[must_use]
    pub fn from_status(context: &str, status: u16, body: &str) -> Self {
        let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
        let reason = envelope
            .error
            .errors
            .into_iter()
            .map(|item| item.reason)
            .find(|reason| !reason.is_empty());
        let message = if envelope.error.message.is_empty() {
            body.trim().to_owned()
        } else {
            envelope.error.message
        };
        Self::Status {
            context: context.to_owned(),
            status,
            reason,
            message,
        }
    }

    /// Classification used by the idempotent paths.
    ///
    /// Status codes and reasons win; the message classifier only runs when
    /// neither is conclusive.
    #[must_use]
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::Status {
                status, reason, message, ..
            } => match (*status, reason.as_deref()) {
                (404, _) | (_, Some("notFound")) => ProviderErrorKind::NotFound,
                (409, _) | (_, Some("alreadyExists")) => ProviderErrorKind::AlreadyExists,
                _ => classify_message(message),
            },
            Self::Config(_) | Self::Http { .. } | Self::Decode { .. } => ProviderErrorKind::Other,
        }
    }
}

impl From<GceError> for ProviderError {
    fn from(value: GceError) -> Self {
        Self::new(value.kind(), value.to_string())
    }
}

/// Classifies an error code reported inside a finished operation.
#[must_use]
pub fn classify_operation_code(code: &str, message: &str) -> ProviderErrorKind {
    match code {
        "RESOURCE_NOT_FOUND" => ProviderErrorKind::NotFound,
        "RESOURCE_ALREADY_EXISTS" => ProviderErrorKind::AlreadyExists,
        _ => classify_message(message),
    }
}
