//! # Domain Errors
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  kicks-core    ValidationError   bad input, rejected before any write   │
//! │                CoreError         a business rule said no                │
//! │  kicks-db      DbError           Local Store failures                   │
//! │  kicks-sync    SyncError         remote store / channel failures        │
//! │  kicks-pos     PosError          what the till operator sees            │
//! │                                                                         │
//! │  ValidationError ──► CoreError ──► PosError ──► operator                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::LayawayStatus;

// =============================================================================
// Core Error
// =============================================================================

#[derive(Debug, Error)]
pub enum CoreError {
    /// Product id is not in the Local Store: deleted by an admin, or removed
    /// by a realtime delete from another till while a cart still held it.
    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    #[error("Sale not found: {0}")]
    SaleNotFound(i64),

    #[error("Layaway not found: {0}")]
    LayawayNotFound(i64),

    /// Payment or cancellation on a layaway that is completed or cancelled.
    #[error("Layaway {layaway_id} is {status}, no further changes allowed")]
    LayawayClosed { layaway_id: i64, status: LayawayStatus },

    /// Installment larger than the outstanding balance.
    #[error("Payment of {attempted} cents exceeds outstanding balance of {balance} cents")]
    Overpayment { balance: i64, attempted: i64 },

    #[error("Sale {0} is already refunded")]
    AlreadyRefunded(i64),

    /// Checkout or layaway with no line items.
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before any state is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// e.g. a PIN with letters in it.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A stored or submitted enum string outside its allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// e.g. a PIN another user already has.
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

pub type CoreResult<T> = Result<T, CoreError>;
