use thiserror::Error;

use crate::domain::{ArithmeticError, Cents};
use crate::io::ProviderError;

/// Why an operation that passed validation could not produce a result.
#[derive(Error, Debug)]
pub enum OperationError {
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Insufficient balance: balance {balance}, required {required}")]
    InsufficientBalance { balance: Cents, required: Cents },

    #[error("{0}")]
    MissingOperand(String),

    #[error("Invalid operand: {0}")]
    InvalidOperand(String),

    #[error(transparent)]
    OperationFailed(#[from] OperationError),

    #[error("Failed to persist charge: {0}")]
    PersistenceFailed(anyhow::Error),

    #[error("Authorization token required")]
    Unauthenticated,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Username already taken: {0}")]
    UsernameTaken(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl From<ArithmeticError> for AppError {
    fn from(err: ArithmeticError) -> Self {
        AppError::OperationFailed(err.into())
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::OperationFailed(err.into())
    }
}
