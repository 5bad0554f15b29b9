//! # Remote Store
//!
//! The shared relational store every till mirrors against. The engine and
//! the inventory ledger receive it as an `Arc<dyn RemoteStore>`; nothing
//! reaches for a global client.
//!
//! ```text
//! ┌──────────────┐      ┌─────────────────────┐      ┌───────────────────┐
//! │  SyncEngine  │─────►│  dyn RemoteStore    │◄─────│ InventoryLedger   │
//! └──────────────┘      └──────────┬──────────┘      └───────────────────┘
//!                                  │
//!                   ┌──────────────┴──────────────┐
//!                   ▼                             ▼
//!          ┌─────────────────┐          ┌─────────────────┐
//!          │ PostgrestClient │          │  MemoryRemote   │
//!          │ (HTTPS, reqwest)│          │  (tests)        │
//!          └─────────────────┘          └─────────────────┘
//! ```
//!
//! Rows are plain JSON objects keyed by column name; see [`crate::rows`]
//! for the typed view.

use async_trait::async_trait;
use serde_json::Value;

use kicks_core::SyncEntity;

use crate::error::SyncResult;

pub mod memory;
pub mod postgrest;

pub use memory::MemoryRemote;
pub use postgrest::PostgrestClient;

/// Table-level operations against the remote store.
///
/// The remote store owns the `id` column: inserts never send one and
/// updates never change it.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Short label for logs (host name, "memory").
    fn label(&self) -> String;

    /// Rows ordered by id, skipping `offset`, at most `limit`.
    async fn fetch_page(&self, entity: SyncEntity, offset: usize, limit: usize) -> SyncResult<Vec<Value>>;

    /// The `limit` newest rows (highest id first).
    async fn fetch_recent(&self, entity: SyncEntity, limit: usize) -> SyncResult<Vec<Value>>;

    /// Existence probe by id.
    async fn exists(&self, entity: SyncEntity, id: i64) -> SyncResult<bool>;

    /// Inserts a row and returns it as stored (with its new id).
    async fn insert(&self, entity: SyncEntity, row: &Value) -> SyncResult<Value>;

    /// Patches the given columns of row `id`.
    ///
    /// Fails with [`crate::SyncError::RemoteNotFound`] when no row matched.
    async fn update(&self, entity: SyncEntity, id: i64, patch: &Value) -> SyncResult<()>;

    /// Deletes row `id`; returns whether a row was removed.
    async fn delete(&self, entity: SyncEntity, id: i64) -> SyncResult<bool>;
}
