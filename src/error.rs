//! Error types for the MicroK8s operator

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Local file could not be read or written
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        /// File or directory the operation targeted
        path: PathBuf,
        /// The underlying I/O error
        source: std::io::Error,
    },

    /// The service manager (snapd) rejected or failed a request
    #[error("service manager error: {0}")]
    ServiceManager(String),

    /// An asynchronous service manager operation did not finish in time
    #[error("timed out after {timeout:?} waiting for {operation}")]
    OperationTimeout {
        /// Human readable description of the operation
        operation: String,
        /// Deadline that was exceeded
        timeout: Duration,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Template rendering error
    #[error("template error: {0}")]
    Template(String),

    /// Invalid operator configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an I/O error for the given path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a service manager error with the given message
    pub fn service_manager(msg: impl Into<String>) -> Self {
        Self::ServiceManager(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// A Kubernetes not-found error for `what`
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::Kube(api_status(404, "NotFound", what.into()))
    }

    /// True when the Kubernetes API reported the object as missing (404)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// True when an optimistic-concurrency write lost the race (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(e)) if e.code == 409)
    }

    /// Whether a later reconciliation can reasonably be expected to succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Kube(kube::Error::Api(e)) => e.code == 409 || e.code == 429 || e.code >= 500,
            Self::Kube(_) => true,
            Self::ServiceManager(_) | Self::OperationTimeout { .. } => true,
            Self::Io { .. } | Self::Serialization(_) | Self::Template(_) | Self::Config(_) => {
                false
            }
        }
    }
}

fn api_status(code: u16, reason: &str, message: String) -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    })
}

#[cfg(test)]
pub(crate) fn api_error(code: u16) -> kube::Error {
    let reason = match code {
        404 => "NotFound",
        409 => "Conflict",
        _ => "InternalError",
    };
    api_status(code, reason, format!("api error {}", code))
}
