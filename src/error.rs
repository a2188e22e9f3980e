//! Error types
//!
//! Typed failures for the resource ID parser, the ARM API collaborator and
//! the provider registration reconciler. The binary wraps these in
//! `anyhow::Error` with context.

use std::fmt;
use thiserror::Error;

/// An ARM resource ID string that does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed resource ID '{id}': {reason}")]
pub struct MalformedResourceId {
    /// The offending input, verbatim
    pub id: String,
    /// What was wrong with it
    pub reason: String,
}

impl MalformedResourceId {
    pub(crate) fn new(id: &str, reason: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by the ARM control-plane collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Connection failure, timeout, throttling or a 5xx response. Safe to retry.
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// The credentials lack the rights for the call (401/403).
    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// Any other non-success response.
    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The configured endpoint is not a usable URL.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl ApiError {
    /// Classify an HTTP status code and (already sanitized) body.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Authorization(format!("HTTP {status}: {message}")),
            408 | 429 | 500..=599 => Self::TransientNetwork(format!("HTTP {status}: {message}")),
            _ => Self::Rejected { status, message },
        }
    }

    /// Whether the reconciler may retry this error locally.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        // connect, timeout, body and redirect failures all happen before a
        // usable response exists
        Self::TransientNetwork(err.to_string())
    }
}

/// Why a registration run stopped with providers still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncompleteCause {
    /// The caller-supplied deadline elapsed.
    DeadlineElapsed,
    /// A call kept failing transiently until the retry cap.
    RetriesExhausted,
}

impl fmt::Display for IncompleteCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeadlineElapsed => write!(f, "deadline elapsed"),
            Self::RetriesExhausted => write!(f, "retries exhausted"),
        }
    }
}

/// Outcome of a failed reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// The caller may not register (or list) resource providers.
    #[error("Not authorized to register resource provider{}: {message}", fmt_namespace(.namespace))]
    Authorization {
        namespace: Option<String>,
        message: String,
    },

    /// A non-retryable API failure other than authorization.
    #[error("Resource provider call{} failed: {source}", fmt_namespace(.namespace))]
    Api {
        namespace: Option<String>,
        source: ApiError,
    },

    /// Some required providers never reached `Registered`.
    #[error("Resource provider registration incomplete ({cause}), still pending: {}", .pending.join(", "))]
    Incomplete {
        pending: Vec<String>,
        cause: IncompleteCause,
    },

    /// The caller cancelled the run.
    #[error("Resource provider registration cancelled, still pending: {}", .pending.join(", "))]
    Cancelled { pending: Vec<String> },
}

impl ReconcileError {
    /// Map a fatal API error, attributing it to a namespace when known.
    pub fn from_api(namespace: Option<&str>, err: ApiError) -> Self {
        let namespace = namespace.map(str::to_string);
        match err {
            ApiError::Authorization(message) => Self::Authorization { namespace, message },
            source => Self::Api { namespace, source },
        }
    }

    /// Providers left unregistered, when the error carries them.
    pub fn pending(&self) -> &[String] {
        match self {
            Self::Incomplete { pending, .. } | Self::Cancelled { pending } => pending,
            _ => &[],
        }
    }
}

fn fmt_namespace(namespace: &Option<String>) -> String {
    match namespace {
        Some(ns) => format!(" '{ns}'"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(ApiError::from_status(401, ""), ApiError::Authorization(_)));
        assert!(matches!(ApiError::from_status(403, ""), ApiError::Authorization(_)));
        assert!(ApiError::from_status(429, "").is_transient());
        assert!(ApiError::from_status(500, "").is_transient());
        assert!(ApiError::from_status(503, "").is_transient());
        assert!(ApiError::from_status(408, "").is_transient());
        assert_eq!(
            ApiError::from_status(404, "nope"),
            ApiError::Rejected {
                status: 404,
                message: "nope".to_string()
            }
        );
    }

    #[test]
    fn incomplete_message_lists_pending() {
        let err = ReconcileError::Incomplete {
            pending: vec!["Microsoft.Storage".into(), "Microsoft.Network".into()],
            cause: IncompleteCause::DeadlineElapsed,
        };
        let msg = err.to_string();
        assert!(msg.contains("deadline elapsed"));
        assert!(msg.contains("Microsoft.Storage, Microsoft.Network"));
        assert_eq!(err.pending().len(), 2);
    }

    #[test]
    fn from_api_separates_authorization() {
        let err = ReconcileError::from_api(None, ApiError::Authorization("HTTP 401".into()));
        assert!(matches!(err, ReconcileError::Authorization { namespace: None, .. }));

        let err = ReconcileError::from_api(
            Some("Microsoft.Storage"),
            ApiError::Rejected {
                status: 404,
                message: "unknown namespace".into(),
            },
        );
        assert!(err.to_string().contains("'Microsoft.Storage'"));
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn authorization_message_names_namespace() {
        let err = ReconcileError::Authorization {
            namespace: Some("Microsoft.Network".into()),
            message: "HTTP 403".into(),
        };
        assert!(err.to_string().contains("'Microsoft.Network'"));
        assert!(err.pending().is_empty());
    }
}
