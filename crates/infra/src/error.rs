//! Workflow error taxonomy.

use thiserror::Error;
use tracing::{error, warn};

use stockhold_core::{DomainError, OrderId, ProductId, ReservationId};

use crate::store::StoreError;

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Failure of a unit of work. Whatever the variant, nothing the workflow wrote
/// was committed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("reservation {0} not found")]
    ReservationNotFound(ReservationId),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Bad input (zero quantity, unbalanced stock in a catalog write, malformed cursor).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Internal fault: stored or computed state broke a ledger invariant.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A row lock was not acquired in time. Safe to retry.
    #[error("lock contention timeout: {0}")]
    LockContentionTimeout(String),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl WorkflowError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkflowError::LockContentionTimeout(_))
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        error!(error = %msg, "invariant violation");
        WorkflowError::InvariantViolation(msg)
    }
}

impl From<DomainError> for WorkflowError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                WorkflowError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => WorkflowError::invariant(msg),
            DomainError::InsufficientStock {
                requested,
                available,
            } => WorkflowError::InsufficientStock {
                requested,
                available,
            },
            DomainError::InvalidTransition { from, to } => {
                WorkflowError::InvalidTransition { from, to }
            }
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout(msg) => {
                warn!(error = %msg, "row lock wait timed out");
                WorkflowError::LockContentionTimeout(msg)
            }
            StoreError::Corrupt(msg) => WorkflowError::invariant(msg),
            other => {
                error!(error = %other, "store failure");
                WorkflowError::Store(other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeouts_are_the_only_retryable_errors() {
        let err: WorkflowError = StoreError::LockTimeout("product".into()).into();
        assert!(err.is_retryable());
        let err: WorkflowError = StoreError::Unavailable("down".into()).into();
        assert!(!err.is_retryable());
        assert!(matches!(err, WorkflowError::Store(_)));
    }

    #[test]
    fn domain_errors_keep_their_meaning() {
        let err: WorkflowError = DomainError::insufficient_stock(3, 1).into();
        assert_eq!(
            err,
            WorkflowError::InsufficientStock {
                requested: 3,
                available: 1
            }
        );
        let err: WorkflowError = DomainError::invalid_id("OrderId: bad").into();
        assert!(matches!(err, WorkflowError::Validation(_)));
        let err: WorkflowError = DomainError::invalid_transition("delivered", "pending").into();
        assert_eq!(err.to_string(), "invalid status transition delivered -> pending");
    }

    #[test]
    fn corrupt_rows_surface_as_invariant_violations() {
        let err: WorkflowError = StoreError::Corrupt("product x: unbalanced".into()).into();
        assert!(matches!(err, WorkflowError::InvariantViolation(_)));
    }
}
