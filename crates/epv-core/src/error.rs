use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValuationError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Infeasible capacity: {field} — {reason}")]
    InfeasibleCapacity { field: String, reason: String },

    #[error("Numeric divergence: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    NumericDivergence {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ValuationError {
    /// Shorthand used by the validators.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValuationError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Field that caused the failure, when the error carries one.
    pub fn field(&self) -> Option<&str> {
        match self {
            ValuationError::InvalidInput { field, .. }
            | ValuationError::InfeasibleCapacity { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ValuationError {
    fn from(e: serde_json::Error) -> Self {
        ValuationError::SerializationError(e.to_string())
    }
}
