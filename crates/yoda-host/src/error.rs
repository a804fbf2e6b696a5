//! Error types for host calls

use yoda_meta_store::MetaStoreError;

/// Error type for host catalog and microservice calls
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("{service} failed: {message}")]
    Microservice { service: String, message: String },
    #[error("host unavailable: {0}")]
    Unavailable(String),
    #[error("rule {rule} failed: {message}")]
    Rule { rule: String, message: String },
    #[error("invalid rule payload: {0}")]
    Payload(String),
    #[error("catalog store error: {0}")]
    Store(#[from] MetaStoreError),
}

impl HostError {
    pub fn microservice(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Microservice {
            service: service.into(),
            message: message.into(),
        }
    }
}

pub type HostResult<T> = Result<T, HostError>;

impl From<HostError> for yoda_common::Error {
    fn from(e: HostError) -> Self {
        match e {
            HostError::NotFound(what) => Self::NotFound(what),
            HostError::Microservice { service, message } => Self::Microservice { service, message },
            HostError::Rule { rule, message } => Self::Microservice {
                service: rule,
                message,
            },
            HostError::Payload(message) => Self::Serialization(message),
            other => Self::microservice("catalog", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_core_error() {
        let err: yoda_common::Error = HostError::microservice("msiDataObjRepl", "boom").into();
        assert!(matches!(err, yoda_common::Error::Microservice { ref service, .. } if service == "msiDataObjRepl"));

        let err: yoda_common::Error = HostError::Unavailable("down".into()).into();
        assert_eq!(
            err.to_string(),
            "host microservice catalog failed: host unavailable: down"
        );
    }
}
