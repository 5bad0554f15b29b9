//! # kicks-db: Local Store for Kicks POS
//!
//! The on-device SQLite database every till operation writes to first.
//! The remote store is only ever a mirror of what lives here.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   kicks-pos services          kicks-sync engine                         │
//! │        │                            │                                   │
//! │        │ db.sales().insert(..)      │ db.sales().list_unsynced()        │
//! │        │ db.stock().adjust(..)      │ db.begin_pull().await?            │
//! │        ▼                            ▼                                   │
//! │   ┌─────────────────────────────────────────────────────────────────┐  │
//! │   │                ★ kicks-db (THIS CRATE) ★                        │  │
//! │   │                                                                 │  │
//! │   │  Database ─┬─ ProductRepository   ─┬─ StockRepository (kardex)  │  │
//! │   │            ├─ SaleRepository       ├─ SettingsRepository        │  │
//! │   │            ├─ ExpenseRepository    ├─ RemoteIdRepository        │  │
//! │   │            ├─ UserRepository       └─ PullBatch                 │  │
//! │   │            └─ LayawayRepository                                 │  │
//! │   └───────────────────────────────┬─────────────────────────────────┘  │
//! │                                   ▼                                     │
//! │                       SQLite (WAL, foreign keys on)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kicks_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("kicks.db")).await?;
//! let pending = db.sales().list_unsynced().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::batch::PullBatch;
pub use repository::expense::ExpenseRepository;
pub use repository::layaway::{LayawayRepository, LayawayUpdate};
pub use repository::product::ProductRepository;
pub use repository::remote_id::RemoteIdRepository;
pub use repository::sale::SaleRepository;
pub use repository::settings::{keys as setting_keys, SettingsRepository};
pub use repository::stock::{StockAdjustment, StockRepository};
pub use repository::user::UserRepository;
pub use repository::Versioned;
