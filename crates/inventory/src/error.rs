use thiserror::Error;

use stockval_core::DomainError;

use crate::movement::MovementType;

/// Failure to value or fold a single movement.
///
/// Every variant is local to one movement: nothing is clamped or guessed, and
/// the state passed in is left untouched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValuationError {
    #[error("quantity must be a positive finite number (got {0})")]
    InvalidQuantity(f64),

    #[error("unit price must be a non-negative finite number (got {0})")]
    InvalidUnitPrice(f64),

    #[error("total value {declared} does not match quantity x unit price ({computed})")]
    InconsistentTotalValue { declared: f64, computed: f64 },

    #[error("{0} movement requires a direction")]
    MissingDirection(MovementType),

    #[error("insufficient stock for this exit (requested {requested}, available {available})")]
    InsufficientStock { requested: f64, available: f64 },

    #[error("malformed stock state: {0}")]
    MalformedState(String),

    #[error("movement targets another product/warehouse")]
    IdentityMismatch,
}

impl ValuationError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedState(msg.into())
    }

    pub fn is_insufficient_stock(&self) -> bool {
        matches!(self, ValuationError::InsufficientStock { .. })
    }
}

impl From<ValuationError> for DomainError {
    fn from(value: ValuationError) -> Self {
        match value {
            ValuationError::InsufficientStock { .. } | ValuationError::MalformedState(_) => {
                DomainError::invariant(value.to_string())
            }
            ValuationError::IdentityMismatch => DomainError::invariant(value.to_string()),
            _ => DomainError::validation(value.to_string()),
        }
    }
}
