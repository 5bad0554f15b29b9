//! # Service Error Type
//!
//! One error type for everything a till service can refuse or fail at.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ValidationError ──────────────────────────────► PosError::Validation  │
//! │                                                                         │
//! │   CoreError ── *NotFound ───────────────────────► PosError::NotFound    │
//! │             ── Validation ──────────────────────► PosError::Validation  │
//! │             ── everything else ─────────────────► PosError::Business    │
//! │                                                                         │
//! │   DbError ──── NotFound ────────────────────────► PosError::NotFound    │
//! │            ─── UniqueViolation ─────────────────► PosError::Validation  │
//! │            ─── everything else (logged) ────────► PosError::Database    │
//! │                                                                         │
//! │   SyncError ────────────────────────────────────► PosError::Remote      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A UI gets a stable machine-readable [`PosError::code`] plus the
//! human-readable `Display` text.

use thiserror::Error;

use kicks_core::{CoreError, ValidationError};
use kicks_db::DbError;
use kicks_sync::SyncError;

pub type PosResult<T> = Result<T, PosError>;

#[derive(Debug, Error)]
pub enum PosError {
    /// Record does not exist in the Local Store.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Input rejected before anything was written.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The acting user's role does not allow the operation.
    #[error("Not allowed: {0}")]
    Forbidden(String),

    /// A business rule refused the operation (closed layaway, last admin...).
    #[error("{0}")]
    Business(String),

    #[error("Database error: {0}")]
    Database(DbError),

    /// Only raised where the remote store must agree before the local change
    /// (catalog deletes, endpoint validation).
    #[error("Remote store error: {0}")]
    Remote(#[from] SyncError),
}

impl PosError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        PosError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        PosError::Forbidden(message.into())
    }

    pub fn business(message: impl Into<String>) -> Self {
        PosError::Business(message.into())
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            PosError::NotFound { .. } => "NOT_FOUND",
            PosError::Validation(_) => "VALIDATION_ERROR",
            PosError::Forbidden(_) => "FORBIDDEN",
            PosError::Business(_) => "BUSINESS_LOGIC",
            PosError::Database(_) => "DATABASE_ERROR",
            PosError::Remote(_) => "REMOTE_ERROR",
        }
    }
}

impl From<DbError> for PosError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => PosError::NotFound { entity, id },
            DbError::UniqueViolation { field, value } => {
                PosError::Validation(ValidationError::Duplicate { field, value })
            }
            other => {
                tracing::error!(error = %other, "Local store operation failed");
                PosError::Database(other)
            }
        }
    }
}

impl From<CoreError> for PosError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductNotFound(id) => PosError::not_found("Product", id),
            CoreError::SaleNotFound(id) => PosError::not_found("Sale", id),
            CoreError::LayawayNotFound(id) => PosError::not_found("Layaway", id),
            CoreError::Validation(e) => PosError::Validation(e),
            other => PosError::Business(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_errors_map_to_codes() {
        let err: PosError = DbError::not_found("Product", 12).into();
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(err.to_string(), "Product not found: 12");

        let err: PosError = DbError::duplicate("pin", "****").into();
        assert!(matches!(err, PosError::Validation(ValidationError::Duplicate { .. })));

        let err: PosError = DbError::QueryFailed("disk I/O error".into()).into();
        assert_eq!(err.code(), "DATABASE_ERROR");
    }

    #[test]
    fn test_core_errors_map_to_codes() {
        let err: PosError = CoreError::AlreadyRefunded(10).into();
        assert_eq!(err.code(), "BUSINESS_LOGIC");
        assert_eq!(err.to_string(), "Sale 10 is already refunded");

        let err: PosError = CoreError::LayawayNotFound(3).into();
        assert!(matches!(err, PosError::NotFound { ref entity, .. } if entity == "Layaway"));
    }
}
