use crate::core::person::Person;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Person '{0}' not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// The primary record was written but its expiration marker was not.
    #[error("Person '{}' saved but expiration marker failed: {reason}", .person.id)]
    ExpirationMarker { person: Box<Person>, reason: String },
}

impl EngineError {
    /// Whether re-issuing the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_) | Self::Lock(_) | Self::Timeout(_) | Self::Storage(_)
        )
    }

    /// Stable machine-readable code, shared with the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Lock(_) => "lock_unavailable",
            Self::Timeout(_) => "timeout",
            Self::Storage(_) => "storage_error",
            Self::Internal(_) => "internal_error",
            Self::ExpirationMarker { .. } => "partial_write",
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("malformed stored payload: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
