//! # Till Error Type
//!
//! Everything a command can fail with, flattened into one enum so `main`
//! can print it and pick an exit code.
//!
//! ```text
//!  DbError   ──┐
//!  SyncError ──┼──► TillError ──► "error [CODE]: message" on stderr, exit 1
//!  PosError  ──┤
//!  usage     ──┘                  exit 2
//! ```

use thiserror::Error;

use kicks_db::DbError;
use kicks_pos::PosError;
use kicks_sync::SyncError;

pub type TillResult<T> = Result<T, TillError>;

#[derive(Debug, Error)]
pub enum TillError {
    /// Bad command line; the message is shown with the usage text.
    #[error("{0}")]
    Usage(String),

    #[error("could not determine the app data directory")]
    NoDataDir,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("{0}")]
    Pos(#[from] PosError),

    #[error("could not encode output: {0}")]
    Output(#[from] serde_json::Error),
}

impl TillError {
    pub fn usage(message: impl Into<String>) -> Self {
        TillError::Usage(message.into())
    }

    /// Machine-readable code, shared with the service layer where possible.
    pub fn code(&self) -> &'static str {
        match self {
            TillError::Usage(_) => "USAGE",
            TillError::NoDataDir | TillError::Io(_) => "IO_ERROR",
            TillError::Database(_) => "DATABASE_ERROR",
            TillError::Sync(_) => "SYNC_ERROR",
            TillError::Pos(err) => err.code(),
            TillError::Output(_) => "OUTPUT_ERROR",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            TillError::Usage(_) => 2,
            _ => 1,
        }
    }
}
