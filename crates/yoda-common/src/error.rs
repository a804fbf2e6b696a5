//! Error types for the coordination core
//!
//! This module defines the error kinds surfaced by the ARB engine and the
//! batch jobs. Batch jobs absorb per-item errors and only fail whole on
//! lock or enumeration errors; policy hooks turn errors into denials.

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for coordination core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the coordination core
#[derive(Debug, Error)]
pub enum Error {
    // Job errors
    #[error("job lock is held by another instance: {}", path.display())]
    LockContention { path: PathBuf },

    #[error("malformed flag on {path}: {value:?}")]
    MalformedFlag { path: String, value: String },

    #[error("job cancelled")]
    Cancelled,

    // Host errors
    #[error("host microservice {service} failed: {message}")]
    Microservice { service: String, message: String },

    #[error("catalog enumeration failed: {0}")]
    CatalogEnumeration(String),

    #[error("not found: {0}")]
    NotFound(String),

    // Placement errors
    #[error("no resource can absorb a write requested on {requested}: {required} bytes free required")]
    NoCapacity { requested: String, required: u64 },

    #[error("cache error: {0}")]
    Cache(String),

    // Internal errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a microservice error
    pub fn microservice(service: impl Into<String>, message: impl ToString) -> Self {
        Self::Microservice {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Create a catalog enumeration error
    pub fn enumeration(msg: impl ToString) -> Self {
        Self::CatalogEnumeration(msg.to_string())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if a later run may succeed where this one failed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Microservice { .. }
                | Self::CatalogEnumeration(_)
                | Self::LockContention { .. }
                | Self::Io(_)
        )
    }

    /// Check if this error ends a batch run rather than a single item
    #[must_use]
    pub const fn is_fatal_for_job(&self) -> bool {
        matches!(
            self,
            Self::LockContention { .. }
                | Self::CatalogEnumeration(_)
                | Self::Cancelled
                | Self::Configuration(_)
                | Self::Io(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
