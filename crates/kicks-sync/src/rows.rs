//! # Remote Rows
//!
//! Wire shapes of the three mirrored tables, as the remote store returns
//! them (snake_case, decimal money, ISO-8601 strings).
//!
//! ```text
//!  products(id, name, price, category, brand, size, image, stock)
//!  sales(id, timestamp, total, shipping_cost, salesperson_name,
//!        payment_method, items, refunded)
//!  expenses(id, amount, description, salesperson_id, timestamp)
//! ```
//!
//! Rows travel through [`RemoteStore`] as `serde_json::Value`; the helpers
//! at the bottom give typed access on top of it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use kicks_core::SyncEntity;

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;

// =============================================================================
// Row Types
// =============================================================================

/// A row of the remote `sales` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSale {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub timestamp: String,
    pub total: f64,
    #[serde(default)]
    pub shipping_cost: Option<f64>,
    #[serde(default)]
    pub salesperson_name: Option<String>,
    pub payment_method: String,
    /// Line items; an array, or the same array serialized as a string.
    #[serde(default)]
    pub items: Value,
    #[serde(default)]
    pub refunded: Option<bool>,
}

/// One element of `sales.items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteLineItem {
    #[serde(alias = "id")]
    pub product_id: i64,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    pub price: f64,
    pub quantity: i64,
}

/// A row of the remote `products` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteProduct {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub stock: i64,
}

/// A row of the remote `expenses` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteExpense {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub amount: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub salesperson_id: Option<i64>,
    pub timestamp: String,
}

// =============================================================================
// RemoteRow
// =============================================================================

/// Implemented by each row type; ties it to its table.
pub trait RemoteRow: Serialize + DeserializeOwned + Send + Sync {
    const ENTITY: SyncEntity;

    fn remote_id(&self) -> Option<i64>;

    /// The row minus its identity column, for updates.
    fn without_id(&self) -> SyncResult<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() {
            obj.remove("id");
        }
        Ok(value)
    }
}

impl RemoteRow for RemoteSale {
    const ENTITY: SyncEntity = SyncEntity::Sale;

    fn remote_id(&self) -> Option<i64> {
        self.id
    }
}

impl RemoteRow for RemoteProduct {
    const ENTITY: SyncEntity = SyncEntity::Product;

    fn remote_id(&self) -> Option<i64> {
        self.id
    }
}

impl RemoteRow for RemoteExpense {
    const ENTITY: SyncEntity = SyncEntity::Expense;

    fn remote_id(&self) -> Option<i64> {
        self.id
    }
}

// =============================================================================
// Typed Helpers
// =============================================================================

/// Decodes one raw row.
pub fn decode_row<R: RemoteRow>(raw: &Value) -> SyncResult<R> {
    R::deserialize(raw).map_err(|e| {
        SyncError::Mapping(format!("{} row {}: {}", R::ENTITY.table(), row_id(raw).unwrap_or(-1), e))
    })
}

/// The `id` column of a raw row, if present.
pub fn row_id(raw: &Value) -> Option<i64> {
    raw.get("id").and_then(Value::as_i64)
}

/// Inserts a row; the remote store assigns the id and the stored row is
/// returned.
pub async fn insert_row<R: RemoteRow>(remote: &dyn RemoteStore, row: &R) -> SyncResult<R> {
    let mut value = serde_json::to_value(row)?;
    if let Some(obj) = value.as_object_mut() {
        obj.remove("id");
    }
    let stored = remote.insert(R::ENTITY, &value).await?;
    decode_row(&stored)
}

/// Overwrites the mutable columns of an existing row.
pub async fn update_row<R: RemoteRow>(remote: &dyn RemoteStore, id: i64, row: &R) -> SyncResult<()> {
    remote.update(R::ENTITY, id, &row.without_id()?).await
}

/// Every remote row of a table, walking pages of `page_size`.
pub async fn fetch_all(remote: &dyn RemoteStore, entity: SyncEntity, page_size: usize) -> SyncResult<Vec<Value>> {
    let mut rows = Vec::new();
    let mut offset = 0;
    loop {
        let page = remote.fetch_page(entity, offset, page_size).await?;
        let len = page.len();
        rows.extend(page);
        if len < page_size {
            break;
        }
        offset += len;
    }
    Ok(rows)
}

/// Writes only the `stock` column of a remote product.
pub async fn update_product_stock(remote: &dyn RemoteStore, id: i64, stock: i64) -> SyncResult<()> {
    remote.update(SyncEntity::Product, id, &json!({ "stock": stock })).await
}
