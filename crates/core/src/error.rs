//! Domain error taxonomy.
//!
//! Every error the event log, write models, and command engine can return is a
//! variant here. Each carries a stable `code` (e.g. `COMMAND-LabelPolicy03`)
//! alongside its structured context so callers can both match on the kind and
//! log/display the human message. Command handlers return the first error
//! encountered; errors are not accumulated.

use thiserror::Error;

/// Result type used across the domain layer.
pub type IamResult<T> = Result<T, IamError>;

/// Stable, coded domain error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IamError {
    /// Syntactic validation failure on command input.
    #[error("[{code}] invalid argument: {message}")]
    InvalidArgument { code: String, message: String },

    /// Authorization failure: subject lacks the permission for this action.
    #[error("[{code}] permission denied: {message}")]
    PermissionDenied { code: String, message: String },

    /// The feature required for this command is disabled for the instance/org.
    #[error("[{code}] feature disabled: {message}")]
    FeatureDisabled { code: String, message: String },

    /// A resource or rate quota was exceeded.
    #[error("[{code}] quota exceeded: {message}")]
    QuotaExceeded { code: String, message: String },

    /// Precondition: the aggregate or sub-entity is not in `ACTIVE` state.
    #[error("[{code}] not found: {message}")]
    NotFound { code: String, message: String },

    /// Precondition: an `ACTIVE` aggregate or unique key is already held.
    #[error("[{code}] already exists: {message}")]
    AlreadyExists { code: String, message: String },

    /// Generic "not in a legal state for this command".
    #[error("[{code}] precondition failed: {message}")]
    PreconditionFailed { code: String, message: String },

    /// Optimistic concurrency mismatch.
    #[error("[{code}] concurrency conflict: expected version {expected}, actual {actual}")]
    Concurrency {
        code: String,
        expected: u64,
        actual: u64,
    },

    /// Event-store level constraint violation (malformed event, bad side effect).
    #[error("[{code}] validation failed: {message}")]
    Validation { code: String, message: String },

    /// A unique-constraint `Add` conflicted with an existing live constraint.
    #[error("[{code}] unique constraint violation: {message}")]
    UniqueConstraintViolation { code: String, message: String },

    /// Underlying store I/O failure, surfaced as-is for the caller to retry.
    #[error("store error: {0}")]
    Store(String),
}

impl IamError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            code: "COMMAND-InvalidArgument".to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_argument_coded(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            code: "COMMAND-PermissionDenied".to_string(),
            message: message.into(),
        }
    }

    pub fn feature_disabled(message: impl Into<String>) -> Self {
        Self::FeatureDisabled {
            code: "COMMAND-FeatureDisabled".to_string(),
            message: message.into(),
        }
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::QuotaExceeded {
            code: "COMMAND-QuotaExceeded".to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            code: "COMMAND-NotFound".to_string(),
            message: message.into(),
        }
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            code: "COMMAND-AlreadyExists".to_string(),
            message: message.into(),
        }
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            code: "COMMAND-PreconditionFailed".to_string(),
            message: message.into(),
        }
    }

    pub fn concurrency(expected: u64, actual: u64) -> Self {
        Self::Concurrency {
            code: "EVENTSTORE-Concurrency".to_string(),
            expected,
            actual,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            code: "EVENTSTORE-Validation".to_string(),
            message: message.into(),
        }
    }

    pub fn unique_constraint_violation(message: impl Into<String>) -> Self {
        Self::UniqueConstraintViolation {
            code: "EVENTSTORE-UniqueConstraint".to_string(),
            message: message.into(),
        }
    }

    /// `true` for errors that are safe for the caller to retry unchanged
    /// (only `Concurrency`; store errors are retried by the transport layer
    /// with backoff, not blindly by the caller).
    pub fn is_retryable_by_caller(&self) -> bool {
        matches!(self, IamError::Concurrency { .. })
    }
}
