//! Step execution error types.

use thiserror::Error;

use crate::error::AppError;

/// Errors a step executor can report. Every variant fails the run.
#[derive(Debug, Error)]
pub enum StepError {
    /// Missing or malformed step configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A recipient, conversation or other target could not be resolved.
    #[error("Missing target: {0}")]
    MissingTarget(String),

    /// Placeholder rendering failed.
    #[error("Template error: {0}")]
    Template(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// No executor registered for the step type.
    #[error("No executor registered for step type: {0}")]
    NotRegistered(String),

    /// A collaborator store call failed.
    #[error("Store error: {0}")]
    Store(#[from] AppError),
}

impl From<StepError> for AppError {
    fn from(e: StepError) -> Self {
        match e {
            StepError::Store(inner) => inner,
            other => AppError::Validation(other.to_string()),
        }
    }
}
