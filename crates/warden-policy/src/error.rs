use std::fmt;
use thiserror::Error;
use warden_core::PolicyId;

use crate::condition::ConditionFacet;

/// Errors raised on the policy mutation path and at the repository boundary.
///
/// Evaluation never returns these: a policy that cannot be decoded simply
/// does not match.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy not found: {0}")]
    NotFound(PolicyId),

    #[error("policy {0} is a system policy and cannot be modified or deleted")]
    SystemPolicyProtected(PolicyId),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PolicyError {
    pub fn kind(&self) -> PolicyErrorKind {
        match self {
            PolicyError::NotFound(_) => PolicyErrorKind::NotFound,
            PolicyError::SystemPolicyProtected(_) => PolicyErrorKind::SystemPolicyProtected,
            PolicyError::Validation(_) => PolicyErrorKind::Validation,
            PolicyError::Storage(_) => PolicyErrorKind::Storage,
            PolicyError::Serialization(_) => PolicyErrorKind::Serialization,
            PolicyError::Internal(_) => PolicyErrorKind::Internal,
        }
    }

    /// True for failures caused by the caller (4xx class). These are never
    /// retried.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            PolicyErrorKind::NotFound
                | PolicyErrorKind::SystemPolicyProtected
                | PolicyErrorKind::Validation
        )
    }
}

impl From<serde_json::Error> for PolicyError {
    fn from(e: serde_json::Error) -> Self {
        PolicyError::Serialization(e.to_string())
    }
}

/// Discriminator for PolicyError variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyErrorKind {
    NotFound,
    SystemPolicyProtected,
    Validation,
    Storage,
    Serialization,
    Internal,
}

impl fmt::Display for PolicyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyErrorKind::NotFound => write!(f, "NotFound"),
            PolicyErrorKind::SystemPolicyProtected => write!(f, "SystemPolicyProtected"),
            PolicyErrorKind::Validation => write!(f, "Validation"),
            PolicyErrorKind::Storage => write!(f, "Storage"),
            PolicyErrorKind::Serialization => write!(f, "Serialization"),
            PolicyErrorKind::Internal => write!(f, "Internal"),
        }
    }
}

pub type PolicyResult<T> = Result<T, PolicyError>;

/// A stored condition blob that does not fit its schema.
///
/// Internal to the engine: recovered locally by treating the owning policy
/// as non-matching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("undecodable {facet} condition: {message}")]
pub struct ConditionDecodeError {
    pub facet: ConditionFacet,
    pub message: String,
}

impl ConditionDecodeError {
    pub fn new(facet: ConditionFacet, message: impl Into<String>) -> Self {
        Self {
            facet,
            message: message.into(),
        }
    }
}
