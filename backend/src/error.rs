//! Error handling for the material ledger
//!
//! The variants mirror the ledger's failure taxonomy so that callers can tell
//! "not enough stock" apart from "system error" by kind, never by message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{AmountOverflow, FifoError};
use thiserror::Error;
use uuid::Uuid;

/// PostgreSQL SQLSTATE codes raised when concurrent writers collide
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";
/// Raised when a NUMERIC value exceeds its column precision
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Insufficient stock for material {material_id}: requested {requested}, available {available}")]
    InsufficientStock {
        material_id: Uuid,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Conflicting concurrent update: {0}")]
    ConflictRetryable(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Map a planner failure for `material_id` onto the ledger taxonomy
    pub fn from_fifo(material_id: Uuid, err: FifoError) -> Self {
        match err {
            FifoError::InvalidQuantity(_) => AppError::validation("quantity", "Quantity must be positive"),
            FifoError::Insufficient {
                requested,
                available,
            } => AppError::InsufficientStock {
                material_id,
                requested,
                available,
            },
            FifoError::Overflow(overflow) => overflow.into(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation { .. } => "INVALID_ARGUMENT",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::ConflictRetryable(_) => "CONFLICT_RETRYABLE",
            AppError::StorageFailure(_) => "STORAGE_FAILURE",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the whole operation may be safely re-issued by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConflictRetryable(_))
    }

    /// Whether the failure is caused by the request rather than the system
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            AppError::NotFound(_) | AppError::Validation { .. } | AppError::InsufficientStock { .. }
        )
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record".to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) | Some(LOCK_NOT_AVAILABLE) => {
                    AppError::ConflictRetryable(db.message().to_string())
                }
                Some(NUMERIC_VALUE_OUT_OF_RANGE) => {
                    AppError::validation("quantity", "Amount exceeds the supported range")
                }
                _ => AppError::StorageFailure(err.to_string()),
            },
            _ => AppError::StorageFailure(err.to_string()),
        }
    }
}

impl From<AmountOverflow> for AppError {
    fn from(err: AmountOverflow) -> Self {
        AppError::validation(err.0, "Amount exceeds the supported range")
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, field) = match &self {
            AppError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, format!("{} not found", resource), None)
            }
            AppError::Validation { field, message } => {
                (StatusCode::BAD_REQUEST, message.clone(), Some(field.clone()))
            }
            AppError::InsufficientStock {
                requested,
                available,
                ..
            } => (
                StatusCode::CONFLICT,
                format!(
                    "Not enough stock: requested {}, available {}",
                    requested, available
                ),
                Some("quantity".to_string()),
            ),
            AppError::ConflictRetryable(_) => (
                StatusCode::CONFLICT,
                "The material is being updated concurrently, please retry".to_string(),
                None,
            ),
            AppError::StorageFailure(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "The ledger store is unavailable".to_string(),
                None,
            ),
            AppError::Configuration(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal server error occurred".to_string(),
                None,
            ),
        };

        if self.is_user_facing() {
            tracing::debug!("Request rejected: {}", self);
        } else {
            tracing::error!("Error: {:?}", self);
        }

        let detail = ErrorDetail {
            code: self.code().to_string(),
            message,
            field,
            retryable: self.is_retryable(),
        };

        (status, Json(ErrorResponse { error: detail })).into_response()
    }
}

/// Result type alias for services and handlers
pub type AppResult<T> = Result<T, AppError>;

/// Attach a field name to a shared validation check
pub fn validate_field(field: &str, result: Result<(), &'static str>) -> AppResult<()> {
    result.map_err(|message| AppError::validation(field, message))
}
