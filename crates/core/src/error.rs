//! Domain error model.

use thiserror::Error;

/// Result type used by the pure campaign/dispatch model.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic failures of the campaign model. Storage and transport
/// failures are reported by the infrastructure layer instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Operator or callback input was rejected (blank name, unknown status).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Counters or timestamps ended up in a state the model never produces.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier did not parse as a UUID.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A lifecycle operation was requested from the wrong campaign status.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Caller-side mistakes, as opposed to broken invariants.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::InvariantViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_detail() {
        assert_eq!(
            DomainError::conflict("cannot start a completed campaign").to_string(),
            "conflict: cannot start a completed campaign"
        );
        assert_eq!(
            DomainError::validation("name is required").to_string(),
            "validation failed: name is required"
        );
    }

    #[test]
    fn only_invariant_violations_are_server_side() {
        assert!(DomainError::validation("x").is_client_error());
        assert!(DomainError::conflict("x").is_client_error());
        assert!(DomainError::invalid_id("x").is_client_error());
        assert!(!DomainError::invariant("x").is_client_error());
    }
}
