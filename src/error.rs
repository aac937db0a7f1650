//! Error taxonomy for the prediction path.
//!
//! Every failure a request can hit is one of four kinds. The request boundary
//! turns each kind into a status category and an `{"error": ...}` body.

use crate::types::response::StatusCategory;
use thiserror::Error;

/// Result alias for the prediction core.
pub type ServeResult<T> = Result<T, ServeError>;

/// Failure of a single prediction request.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServeError {
    /// Caller-supplied data is malformed or missing required fields.
    #[error("{0}")]
    Validation(String),

    /// No model is loaded. Retrying once a model is available may succeed.
    #[error("{0}")]
    ServiceUnavailable(String),

    /// The input passed shape checks but the model rejected it.
    #[error("{0}")]
    InvalidInput(String),

    /// An invariant inside the service broke (e.g. label table mismatch).
    #[error("{0}")]
    Internal(String),
}

impl ServeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ServeError::Validation(msg.into())
    }

    pub fn model_not_loaded() -> Self {
        ServeError::ServiceUnavailable("model not loaded".to_string())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        ServeError::InvalidInput(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ServeError::Internal(msg.into())
    }

    /// Status category reported to the caller.
    pub fn status(&self) -> StatusCategory {
        match self {
            ServeError::Validation(_) | ServeError::InvalidInput(_) => StatusCategory::BadRequest,
            ServeError::ServiceUnavailable(_) => StatusCategory::ServiceUnavailable,
            ServeError::Internal(_) => StatusCategory::Internal,
        }
    }

    /// Returns true if the same request may succeed later without changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServeError::ServiceUnavailable(_))
    }

    /// Stable name used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ServeError::Validation(_) => "validation",
            ServeError::ServiceUnavailable(_) => "service_unavailable",
            ServeError::InvalidInput(_) => "invalid_input",
            ServeError::Internal(_) => "internal",
        }
    }
}
