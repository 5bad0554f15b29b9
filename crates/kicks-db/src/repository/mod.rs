//! # Repository Module
//!
//! One repository per table, each a thin owner of its SQL.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Service / sync engine                                                  │
//! │       │  db.stock().adjust(StockAdjustment { .. })                      │
//! │       ▼                                                                 │
//! │  StockRepository ── BEGIN ─ UPDATE products ─ INSERT movement ─ COMMIT  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - catalog CRUD and sync flags
//! - [`SaleRepository`](sale::SaleRepository) - sales, refunds, sync flags
//! - [`ExpenseRepository`](expense::ExpenseRepository) - expenses
//! - [`UserRepository`](user::UserRepository) - users and PIN lookup
//! - [`LayawayRepository`](layaway::LayawayRepository) - layaways
//! - [`StockRepository`](stock::StockRepository) - kardex
//! - [`SettingsRepository`](settings::SettingsRepository) - key/value settings
//! - [`RemoteIdRepository`](remote_id::RemoteIdRepository) - local/remote id map
//! - [`PullBatch`](batch::PullBatch) - transactional apply of remote records

pub mod batch;
pub mod expense;
pub mod layaway;
pub mod product;
pub mod remote_id;
pub mod sale;
pub mod settings;
pub mod stock;
pub mod user;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::DbResult;

/// A synced-entity record read together with its local edit counter.
///
/// Pass `version` back to `mark_synced` after uploading `record`; the flag
/// only flips while no local write has happened since the read.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub record: T,
    pub version: i64,
}

/// Encodes a JSON text column (line items, payments).
pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> DbResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decodes a JSON text column.
pub(crate) fn from_json<T: DeserializeOwned>(raw: &str) -> DbResult<T> {
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use kicks_core::{NewProduct, NewSale, PaymentMethod, SaleItem};

    use crate::{Database, DbConfig};

    pub async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    pub fn new_product(name: &str, stock: i64) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            price_cents: 9999,
            brand: Some("Nike".to_string()),
            size: Some("42".to_string()),
            stock,
            ..Default::default()
        }
    }

    pub fn new_sale(total_cents: i64) -> NewSale {
        NewSale {
            timestamp: Utc::now(),
            items: vec![SaleItem {
                product_id: 1,
                name: "Dunk Low".to_string(),
                brand: Some("Nike".to_string()),
                category: None,
                size: Some("41".to_string()),
                price_cents: total_cents,
                quantity: 1,
            }],
            total_cents,
            shipping_cost_cents: 0,
            salesperson_id: Some(1),
            salesperson_name: "Ana".to_string(),
            payment_method: PaymentMethod::Card,
            location: None,
            layaway_id: None,
        }
    }
}
