use crate::models::{SessionId, SubjectId};

/// Failures reported by the capture backend or the reading source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("subject {0} is not known to the reading source")]
    SubjectNotFound(SubjectId),
}

impl SourceError {
    /// Whether retrying the same call later may succeed. The poller retries
    /// every failure regardless; this only picks the log message.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Network(_))
    }
}

/// Errors returned synchronously by the session registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("subject {0} already has an active measurement session")]
    Conflict(SubjectId),
    #[error("session {0} is not active")]
    NotActive(SessionId),
    #[error("failed to start measurement: device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("failed to start measurement: network error: {0}")]
    Network(String),
    #[error("session registry is shut down")]
    ShuttingDown,
}

impl From<SourceError> for RegistryError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Network(message) => RegistryError::Network(message),
            SourceError::DeviceUnavailable(message) => RegistryError::DeviceUnavailable(message),
            SourceError::SubjectNotFound(subject_id) => {
                RegistryError::DeviceUnavailable(format!("subject {subject_id} not found"))
            }
        }
    }
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
