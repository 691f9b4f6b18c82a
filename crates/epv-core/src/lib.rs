pub mod case;
pub mod engine;
pub mod error;
pub mod monte_carlo;
pub mod normalization;
pub mod operations;
pub mod pe;
pub mod scenarios;
pub mod time_value;
pub mod types;
pub mod valuation;

pub use error::ValuationError;
pub use types::*;

/// Standard result type for all valuation operations
pub type EngineResult<T> = Result<T, ValuationError>;
