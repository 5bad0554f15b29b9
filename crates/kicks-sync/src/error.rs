//! # Sync Errors
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  where it came from          variants                  next cycle?      │
//! │  ──────────────────          ────────                  ───────────      │
//! │  sync.toml / settings        InvalidConfig, InvalidUrl, no, needs an    │
//! │                              NotConfigured, ...         operator        │
//! │  remote REST calls           Http, RemoteRejected,      yes for network │
//! │                              RemoteNotFound             and 5xx / 429   │
//! │  realtime websocket          ConnectionFailed, ...      yes             │
//! │  row <-> record mapping      Mapping, Serialization     no              │
//! │  Local Store                 LocalStore(DbError)        when locked     │
//! │  engine / agent              Busy, ShuttingDown         Busy only       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Remote failures never escape a sync cycle: the engine turns them into
//! [`crate::SyncFailure`] entries and the record stays unsynced until the
//! next cycle.

use thiserror::Error;

use kicks_db::DbError;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration
    // =========================================================================
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Device ID not configured")]
    MissingDeviceId,

    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    /// No remote endpoint/key has been set yet; the till runs local-only.
    #[error("Remote store is not configured")]
    NotConfigured,

    #[error("Failed to load sync config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save sync config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Remote store
    // =========================================================================
    /// Network-level failure (DNS, refused, reset, request timeout).
    #[error("Remote request failed: {0}")]
    Http(String),

    /// The remote store answered with an error status.
    #[error("Remote store rejected request ({status}): {body}")]
    RemoteRejected { status: u16, body: String },

    /// A row expected to exist remotely was not there.
    #[error("Remote {table} row {id} not found")]
    RemoteNotFound { table: String, id: i64 },

    // =========================================================================
    // Realtime channel
    // =========================================================================
    #[error("Realtime connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Disconnected from realtime channel")]
    Disconnected,

    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Realtime channel error: {0}")]
    Channel(String),

    // =========================================================================
    // Mapping
    // =========================================================================
    /// A remote row could not be turned into a local record.
    #[error("Cannot map remote row: {0}")]
    Mapping(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    // =========================================================================
    // Local Store
    // =========================================================================
    #[error("Local store: {0}")]
    LocalStore(#[from] DbError),

    // =========================================================================
    // Engine
    // =========================================================================
    /// A sync cycle is already in flight.
    #[error("A sync cycle is already running")]
    Busy,

    #[error("Sync agent is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return SyncError::RemoteRejected {
                status: status.as_u16(),
                body: err.to_string(),
            };
        }
        if err.is_timeout() {
            return SyncError::Http(format!("request timed out: {err}"));
        }
        if err.is_decode() {
            return SyncError::Serialization(err.to_string());
        }
        SyncError::Http(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => SyncError::Disconnected,
            WsError::Io(io) => SyncError::ConnectionFailed(io.to_string()),
            WsError::Tls(tls) => SyncError::Tls(tls.to_string()),
            other => SyncError::WebSocket(other.to_string()),
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Categorization
// =============================================================================

impl SyncError {
    /// True if the next cycle may succeed without anyone changing anything.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Http(_)
            | SyncError::ConnectionFailed(_)
            | SyncError::Disconnected
            | SyncError::Timeout(_)
            | SyncError::WebSocket(_)
            | SyncError::Busy => true,
            SyncError::RemoteRejected { status, .. } => *status >= 500 || *status == 429,
            SyncError::LocalStore(db) => db.is_transient(),
            _ => false,
        }
    }

    /// True if an operator has to fix settings before sync can work.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::MissingDeviceId
                | SyncError::InvalidUrl(_)
                | SyncError::NotConfigured
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        ) || matches!(self, SyncError::RemoteRejected { status: 401 | 403, .. })
    }
}
