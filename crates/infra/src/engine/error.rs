use thiserror::Error;

use posledger_auth::AuthzError;
use posledger_core::DomainError;

use crate::ledger_store::StoreError;

/// Failure of an engine operation.
///
/// Everything but `Conflict` is final for the request; `Conflict` only
/// escapes when the retry budget is spent, and is then reported as
/// `TransientStore`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Role or branch does not satisfy the access policy.
    #[error("{0}")]
    Authorization(String),

    #[error("validation failed on `{field}`: {message}")]
    Validation { field: String, message: String },

    /// The record's state forbids the change (settled, cancelled, over-payment).
    #[error("{0}")]
    StateConflict(String),

    /// Absent, or outside the caller's visible scope.
    #[error("{0} not found")]
    NotFound(String),

    /// Optimistic concurrency failure; the whole operation may be retried.
    #[error("concurrent modification: {0}")]
    Conflict(String),

    #[error("ledger store unavailable: {0}")]
    TransientStore(String),
}

impl EngineError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Stable machine-readable code, used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Authorization(_) => "forbidden",
            EngineError::Validation { .. } => "validation_error",
            EngineError::StateConflict(_) => "state_conflict",
            EngineError::NotFound(_) => "not_found",
            EngineError::Conflict(_) | EngineError::TransientStore(_) => "store_unavailable",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Conflict(_))
    }
}

impl From<AuthzError> for EngineError {
    fn from(value: AuthzError) -> Self {
        EngineError::Authorization(value.to_string())
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation { field, message } => EngineError::Validation { field, message },
            DomainError::StateConflict(msg) => EngineError::StateConflict(msg),
            DomainError::InvalidId(msg) => EngineError::validation("id", msg),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => EngineError::Conflict(msg),
            StoreError::UniqueViolation { field, message } => {
                EngineError::validation(field, message)
            }
            StoreError::InvalidReference { field, message } => {
                EngineError::validation(field, message)
            }
            StoreError::Corrupt(msg) | StoreError::Unavailable(msg) => {
                EngineError::TransientStore(msg)
            }
        }
    }
}
