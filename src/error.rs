//! Error types for the match lifecycle service
//!
//! Every core command returns a typed [`MatchError`] so callers can map the
//! failure class onto their own transport. Plumbing layers (configuration,
//! service shell, binaries) use `anyhow` on top of this.

use crate::types::EntityKind;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, MatchError>;

/// Failure class of a [`MatchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Integrity,
    Storage,
    Configuration,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Storage => "storage",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", label)
    }
}

/// Custom error types for specific match lifecycle scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// Malformed command input
    #[error("Invalid command: {reason}")]
    Validation { reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    /// The action lost a race or targets state that already moved on
    #[error("Conflict: {reason}")]
    Conflict { reason: String },

    /// Settlement or referential preconditions were violated
    #[error("Integrity violation: {reason}")]
    Integrity { reason: String },

    #[error("Storage failure: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal service error: {message}")]
    Internal { message: String },
}

impl MatchError {
    pub fn validation(reason: impl Into<String>) -> Self {
        MatchError::Validation {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        MatchError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        MatchError::Conflict {
            reason: reason.into(),
        }
    }

    pub fn integrity(reason: impl Into<String>) -> Self {
        MatchError::Integrity {
            reason: reason.into(),
        }
    }

    /// Failure class, for mapping onto transport status codes
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatchError::Validation { .. } => ErrorKind::Validation,
            MatchError::NotFound { .. } => ErrorKind::NotFound,
            MatchError::Conflict { .. } => ErrorKind::Conflict,
            MatchError::Integrity { .. } => ErrorKind::Integrity,
            MatchError::Storage { .. } => ErrorKind::Storage,
            MatchError::Configuration { .. } => ErrorKind::Configuration,
            MatchError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the caller made the mistake (as opposed to the service)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Conflict
        )
    }
}
