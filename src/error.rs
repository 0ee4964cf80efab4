//! Service-level error taxonomy shared by the coordinator, the order service
//! and the HTTP adapters.

use crate::database::error::DatabaseError;
use crate::database::order_repository::OrderStatus;
use std::time::Duration;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Signature did not match. Carries nothing about the expected value.
    #[error("payment verification failed")]
    VerificationFailed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("not allowed: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage did not respond within {0:?}")]
    Timeout(Duration),

    #[error("storage failure: {0}")]
    Database(DatabaseError),
}

impl AppError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Infrastructure failures a caller may retry; business failures are permanent
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Timeout(_) => true,
            AppError::Database(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Stable machine-readable code for API bodies
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::VerificationFailed => "PAYMENT_VERIFICATION_FAILED",
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Timeout(_) => "STORAGE_TIMEOUT",
            AppError::Database(_) => "STORAGE_ERROR",
        }
    }
}

impl From<DatabaseError> for AppError {
    fn from(error: DatabaseError) -> Self {
        if error.is_constraint_violation() {
            AppError::Conflict(error.to_string())
        } else {
            AppError::Database(error)
        }
    }
}
