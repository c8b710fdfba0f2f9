//! Domain error model.
//!
//! Every failure that crosses a crate boundary ends up as a [`DomainError`],
//! which carries both a machine-readable [`ErrorKind`] and a human message so
//! callers can decide between retrying, correcting input, or stopping.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// The kind of record a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Profile,
    School,
    Student,
    Class,
    Subject,
    Transaction,
    Reward,
    QuickReward,
    RewardRequest,
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            EntityKind::Profile => "profile",
            EntityKind::School => "school",
            EntityKind::Student => "student",
            EntityKind::Class => "class",
            EntityKind::Subject => "subject",
            EntityKind::Transaction => "transaction",
            EntityKind::Reward => "reward",
            EntityKind::QuickReward => "quick reward",
            EntityKind::RewardRequest => "reward request",
        };
        f.write_str(s)
    }
}

/// Coarse error classification, stable across layers and transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    PermissionDenied,
    NotFound,
    InvalidArgument,
    AlreadyExists,
    InvalidRequestState,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::InvalidRequestState => "invalid_request_state",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Domain-level error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// No identity could be resolved for the caller.
    #[error("unauthenticated")]
    Unauthenticated,

    /// The resolved identity lacks the capability for this operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A tenant-scoped operation was attempted without a resolved school.
    #[error("no school context")]
    NoTenantContext,

    #[error("{0} not found")]
    NotFound(EntityKind),

    /// Missing or malformed input (validated before any external call).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A reward request was asked to leave a state it is not in.
    #[error("invalid request state: {0}")]
    InvalidRequestState(String),

    /// Unexpected store or provider failure; the only retryable kind.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn invalid_request_state(msg: impl Into<String>) -> Self {
        Self::InvalidRequestState(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn not_found(kind: EntityKind) -> Self {
        Self::NotFound(kind)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Unauthenticated => ErrorKind::Unauthenticated,
            DomainError::PermissionDenied(_) | DomainError::NoTenantContext => {
                ErrorKind::PermissionDenied
            }
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            DomainError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            DomainError::InvalidRequestState(_) => ErrorKind::InvalidRequestState,
            DomainError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the same call may succeed if repeated unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_internal_errors_are_retryable() {
        assert!(DomainError::internal("store down").is_retryable());
        assert!(!DomainError::NotFound(EntityKind::Student).is_retryable());
        assert!(!DomainError::invalid_argument("x").is_retryable());
        assert!(!DomainError::permission_denied("x").is_retryable());
    }

    #[test]
    fn missing_tenant_is_a_permission_failure() {
        assert_eq!(DomainError::NoTenantContext.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn not_found_names_the_entity() {
        assert_eq!(
            DomainError::NotFound(EntityKind::RewardRequest).to_string(),
            "reward request not found"
        );
    }
}
