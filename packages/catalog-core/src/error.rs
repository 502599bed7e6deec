//! Harness error types.

use serde::Serialize;
use thiserror::Error;

use crate::model::EntityKind;

/// Failures the harness can observe while exercising the service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HarnessError {
    /// Entity absent in the queried layer
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: i64 },

    /// API answered a write with a validation failure
    #[error("Validation rejected with status {status}: {message}")]
    ValidationRejected { status: u16, message: String },

    /// API and store views diverge beyond the reconciliation window
    #[error("Inconsistent state for {entity} {id}: {detail}")]
    InconsistentState {
        entity: EntityKind,
        id: i64,
        detail: String,
    },

    /// A single field differs between two views
    #[error("Field '{field}' mismatch: expected {expected}, got {actual}")]
    FieldMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// The store could not complete an operation
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Bounded wait exceeded
    #[error("Operation '{operation}' timed out after {limit_ms} ms")]
    Timeout { operation: String, limit_ms: u64 },

    /// The service answered in a shape the harness cannot interpret
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Status code differs from the one the scenario expects
    #[error("Unexpected status for {operation}: expected {expected}, got {actual}")]
    UnexpectedStatus {
        operation: String,
        expected: u16,
        actual: u16,
    },

    /// Row count delta differs from the number of committed writes
    #[error("{table} count changed by {actual}, expected {expected}")]
    CountMismatch {
        table: String,
        expected: i64,
        actual: i64,
    },

    /// HTTP transport failure (connection refused, reset, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid harness configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Fieldless discriminant of [`HarnessError`], used by scenario expectations
/// and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    ValidationRejected,
    InconsistentState,
    FieldMismatch,
    StoreUnavailable,
    Timeout,
    ProtocolViolation,
    UnexpectedStatus,
    CountMismatch,
    Transport,
    Config,
}

impl HarnessError {
    /// Returns the discriminant of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            HarnessError::NotFound { .. } => FailureKind::NotFound,
            HarnessError::ValidationRejected { .. } => FailureKind::ValidationRejected,
            HarnessError::InconsistentState { .. } => FailureKind::InconsistentState,
            HarnessError::FieldMismatch { .. } => FailureKind::FieldMismatch,
            HarnessError::StoreUnavailable(_) => FailureKind::StoreUnavailable,
            HarnessError::Timeout { .. } => FailureKind::Timeout,
            HarnessError::ProtocolViolation(_) => FailureKind::ProtocolViolation,
            HarnessError::UnexpectedStatus { .. } => FailureKind::UnexpectedStatus,
            HarnessError::CountMismatch { .. } => FailureKind::CountMismatch,
            HarnessError::Transport(_) => FailureKind::Transport,
            HarnessError::Config(_) => FailureKind::Config,
        }
    }

    /// Whether a retry of the same store or network operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HarnessError::StoreUnavailable(_) | HarnessError::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let err = HarnessError::NotFound {
            entity: EntityKind::Product,
            id: 7,
        };
        assert_eq!(err.kind(), FailureKind::NotFound);
        assert_eq!(err.to_string(), "product 7 not found");

        let err = HarnessError::Timeout {
            operation: "count_products".to_string(),
            limit_ms: 5000,
        };
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert!(err.is_transient());
    }

    #[test]
    fn test_divergence_is_not_transient() {
        let err = HarnessError::InconsistentState {
            entity: EntityKind::Product,
            id: 1,
            detail: "phantom".to_string(),
        };
        assert!(!err.is_transient());
        assert!(!HarnessError::ProtocolViolation("no body".into()).is_transient());
    }
}
