//! # Local Store Errors
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sqlx::Error ─────────┐                                                 │
//! │  MigrateError ────────┼──► DbError ──► PosError / SyncError             │
//! │  serde_json::Error ───┘                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! SQLite reports constraint failures only through message text, so the
//! mapping below reads the message; lock contention is read from the
//! primary result code instead.

use thiserror::Error;

/// SQLITE_BUSY and SQLITE_LOCKED primary result codes.
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

#[derive(Debug, Error)]
pub enum DbError {
    /// A row the caller named by id is not there.
    ///
    /// Typical cases: a stock adjustment for a product deleted since the cart
    /// was built, a refund of a sale that never existed on this till.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE index rejected the write (a PIN already in use, a remote id
    /// already linked to another local record).
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// CHECK, foreign key, or the kardex append-only trigger.
    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// Another writer held the lock longer than the busy timeout.
    #[error("Local store is locked by another writer")]
    Locked,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A JSON column (line items, layaway payments) did not round-trip.
    #[error("Corrupt JSON column: {0}")]
    Serialization(String),

    /// A stored enum string (role, payment method, movement type) is unknown.
    #[error("Invalid stored value: {0}")]
    InvalidData(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. })
    }

    /// True when retrying the same write later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Locked | DbError::PoolExhausted)
    }
}

/// `"UNIQUE constraint failed: users.pin"` gives `"pin"`; composite indexes
/// keep their column list.
fn unique_columns(message: &str) -> String {
    let columns = message
        .split_once("UNIQUE constraint failed: ")
        .map(|(_, cols)| cols)
        .unwrap_or("unknown");
    columns
        .split(", ")
        .map(|col| col.rsplit('.').next().unwrap_or(col))
        .collect::<Vec<_>>()
        .join(", ")
}

fn primary_code(db_err: &dyn sqlx::error::DatabaseError) -> Option<i64> {
    db_err
        .code()
        .and_then(|code| code.parse::<i64>().ok())
        .map(|code| code & 0xff)
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                if matches!(primary_code(db_err.as_ref()), Some(SQLITE_BUSY | SQLITE_LOCKED)) {
                    return DbError::Locked;
                }

                let msg = db_err.message();
                if msg.contains("UNIQUE constraint failed") {
                    DbError::UniqueViolation {
                        field: unique_columns(msg),
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed")
                    || msg.contains("CHECK constraint failed")
                    || msg.contains("append-only")
                {
                    DbError::ConstraintViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("local store is closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

impl From<kicks_core::ValidationError> for DbError {
    fn from(err: kicks_core::ValidationError) -> Self {
        DbError::InvalidData(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;
