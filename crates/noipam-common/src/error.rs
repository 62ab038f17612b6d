//! Error taxonomy for the noipam driver.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`NoipamError`].
pub type NoipamResult<T> = Result<T, NoipamError>;

/// Broad classes of failure surfaced to the container runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad or unsupported option value. Never retried.
    Configuration,
    /// A resource is already claimed or in use.
    Conflict,
    /// Unknown network or endpoint.
    NotFound,
    /// A host link or namespace operation failed.
    Backend,
    /// The persistent store failed.
    Store,
}

/// Errors raised by driver operations.
#[derive(Error, Diagnostic, Debug)]
pub enum NoipamError {
    /// Invalid network configuration.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(noipam::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// Invalid network or endpoint identifier.
    #[error("Invalid id: {id:?}")]
    #[diagnostic(
        code(noipam::invalid_id),
        help("Ids must be alphanumeric with hyphens and underscores, 1-64 characters")
    )]
    InvalidId {
        /// The rejected id.
        id: String,
    },

    /// A resource is already claimed.
    #[error("Conflict: {message}")]
    #[diagnostic(code(noipam::conflict))]
    Conflict {
        /// The error message.
        message: String,
    },

    /// Network not found.
    #[error("Network not found: {id}")]
    #[diagnostic(code(noipam::network::not_found))]
    NetworkNotFound {
        /// The network ID that was not found.
        id: String,
    },

    /// Endpoint not found.
    #[error("Endpoint not found: {id} (network {network})")]
    #[diagnostic(code(noipam::endpoint::not_found))]
    EndpointNotFound {
        /// The network the endpoint was looked up in.
        network: String,
        /// The endpoint ID that was not found.
        id: String,
    },

    /// Host link operation failed.
    #[error("Link operation '{operation}' failed: {message}")]
    #[diagnostic(
        code(noipam::backend),
        help("Link operations require CAP_NET_ADMIN on the host network namespace")
    )]
    Backend {
        /// The operation that failed.
        operation: String,
        /// The error message.
        message: String,
    },

    /// Persistent store failure.
    #[error("Store error for {key}: {message}")]
    #[diagnostic(code(noipam::store))]
    Store {
        /// The store key involved.
        key: String,
        /// The error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(noipam::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(noipam::serialization))]
    Serialization(String),

    /// Feature not supported on this platform.
    #[error("Feature not supported: {feature}")]
    #[diagnostic(code(noipam::unsupported), help("The macvlan driver requires Linux"))]
    Unsupported {
        /// The unsupported feature.
        feature: String,
    },
}

impl NoipamError {
    /// Shorthand for a [`NoipamError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Shorthand for a [`NoipamError::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Shorthand for a [`NoipamError::Backend`].
    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`NoipamError::Store`].
    pub fn store(key: impl ToString, message: impl ToString) -> Self {
        Self::Store {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    /// The taxonomy class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } | Self::InvalidId { .. } => ErrorKind::Configuration,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NetworkNotFound { .. } | Self::EndpointNotFound { .. } => ErrorKind::NotFound,
            Self::Backend { .. } | Self::Io(_) | Self::Unsupported { .. } => ErrorKind::Backend,
            Self::Store { .. } | Self::Serialization(_) => ErrorKind::Store,
        }
    }
}

impl From<serde_json::Error> for NoipamError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
