//! Error types for tangent

use thiserror::Error;

/// tangent error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Operand of the wrong kind (e.g. forward and reverse values mixed)
    #[error("Type error: {0}")]
    TypeKind(String),

    /// Value outside the differentiable domain, or an undeclared target
    #[error("Domain error: {0}")]
    Domain(String),

    /// Unknown differentiation mode
    #[error("Mode error: {0}")]
    Mode(String),

    /// Expression text could not be compiled or bound
    #[error("Expression error: {0}")]
    Expression(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
