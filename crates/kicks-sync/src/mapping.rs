//! # Local <-> Remote Mapping
//!
//! ```text
//!   local (kicks-core)                 remote row
//!   ──────────────────                 ──────────
//!   price_cents: 12999       ◄──►      price: 129.99
//!   timestamp: DateTime<Utc> ◄──►      timestamp: "2024-03-01T10:00:00.000Z"
//!   items: Vec<SaleItem>     ◄──►      items: [{ product_id, price, ... }]
//!   salesperson_id, location,          (not stored remotely)
//!   layaway_id, synced
//! ```
//!
//! Records built from remote rows carry `id = 0` (the caller resolves the
//! local id through the mapping table) and `synced = true`.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

use kicks_core::{Expense, Money, PaymentMethod, Product, Sale, SaleItem};

use crate::error::{SyncError, SyncResult};
use crate::rows::{RemoteExpense, RemoteLineItem, RemoteProduct, RemoteSale};

// =============================================================================
// Dates
// =============================================================================

/// ISO-8601 with millisecond precision, `Z` suffix.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts RFC 3339 with any offset, and the zone-less forms a
/// `timestamp without time zone` column produces (read as UTC).
pub fn parse_timestamp(raw: &str) -> SyncResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    // "+00" offsets without minutes
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(ts.with_timezone(&Utc));
    }
    Err(SyncError::Mapping(format!("unparseable timestamp '{}'", raw)))
}

// =============================================================================
// Sales
// =============================================================================

pub fn sale_to_remote(sale: &Sale) -> SyncResult<RemoteSale> {
    let items: Vec<RemoteLineItem> = sale.items.iter().map(item_to_remote).collect();
    Ok(RemoteSale {
        id: None,
        timestamp: format_timestamp(&sale.timestamp),
        total: Money::from_cents(sale.total_cents).to_decimal(),
        shipping_cost: Some(Money::from_cents(sale.shipping_cost_cents).to_decimal()),
        salesperson_name: Some(sale.salesperson_name.clone()),
        payment_method: sale.payment_method.as_str().to_string(),
        items: serde_json::to_value(items)?,
        refunded: Some(sale.refunded),
    })
}

pub fn sale_from_remote(row: &RemoteSale) -> SyncResult<Sale> {
    let payment_method: PaymentMethod = row
        .payment_method
        .parse()
        .map_err(|e| SyncError::Mapping(format!("sale {:?}: {}", row.id, e)))?;

    Ok(Sale {
        id: 0,
        timestamp: parse_timestamp(&row.timestamp)?,
        items: items_from_value(&row.items)?,
        total_cents: Money::from_decimal(row.total).cents(),
        shipping_cost_cents: row
            .shipping_cost
            .map(|c| Money::from_decimal(c).cents())
            .unwrap_or(0),
        salesperson_id: None,
        salesperson_name: row.salesperson_name.clone().unwrap_or_default(),
        payment_method,
        location: None,
        layaway_id: None,
        refunded: row.refunded.unwrap_or(false),
        synced: true,
    })
}

fn item_to_remote(item: &SaleItem) -> RemoteLineItem {
    RemoteLineItem {
        product_id: item.product_id,
        name: item.name.clone(),
        brand: item.brand.clone(),
        category: item.category.clone(),
        size: item.size.clone(),
        price: Money::from_cents(item.price_cents).to_decimal(),
        quantity: item.quantity,
    }
}

fn item_from_remote(item: RemoteLineItem) -> SaleItem {
    SaleItem {
        product_id: item.product_id,
        name: item.name,
        brand: item.brand,
        category: item.category,
        size: item.size,
        price_cents: Money::from_decimal(item.price).cents(),
        quantity: item.quantity,
    }
}

fn items_from_value(value: &Value) -> SyncResult<Vec<SaleItem>> {
    let items: Vec<RemoteLineItem> = match value {
        Value::Null => Vec::new(),
        Value::String(text) => serde_json::from_str(text)
            .map_err(|e| SyncError::Mapping(format!("sale items: {}", e)))?,
        other => serde_json::from_value(other.clone())
            .map_err(|e| SyncError::Mapping(format!("sale items: {}", e)))?,
    };
    Ok(items.into_iter().map(item_from_remote).collect())
}

// =============================================================================
// Products
// =============================================================================

pub fn product_to_remote(product: &Product) -> RemoteProduct {
    RemoteProduct {
        id: None,
        name: product.name.clone(),
        price: Money::from_cents(product.price_cents).to_decimal(),
        category: product.category.clone(),
        brand: product.brand.clone(),
        size: product.size.clone(),
        image: product.image.clone(),
        stock: product.stock,
    }
}

pub fn product_from_remote(row: &RemoteProduct) -> Product {
    Product {
        id: 0,
        name: row.name.clone(),
        price_cents: Money::from_decimal(row.price).cents(),
        category: row.category.clone(),
        brand: row.brand.clone(),
        size: row.size.clone(),
        image: row.image.clone(),
        stock: row.stock.max(0),
        synced: true,
    }
}

// =============================================================================
// Expenses
// =============================================================================

pub fn expense_to_remote(expense: &Expense) -> RemoteExpense {
    RemoteExpense {
        id: None,
        amount: Money::from_cents(expense.amount_cents).to_decimal(),
        description: expense.description.clone(),
        salesperson_id: expense.salesperson_id,
        timestamp: format_timestamp(&expense.timestamp),
    }
}

pub fn expense_from_remote(row: &RemoteExpense) -> SyncResult<Expense> {
    Ok(Expense {
        id: 0,
        timestamp: parse_timestamp(&row.timestamp)?,
        amount_cents: Money::from_decimal(row.amount).cents(),
        description: row.description.clone(),
        salesperson_id: row.salesperson_id,
        synced: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sale() -> Sale {
        Sale {
            id: 10,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            items: vec![SaleItem {
                product_id: 3,
                name: "Samba OG".into(),
                brand: Some("Adidas".into()),
                category: None,
                size: Some("42".into()),
                price_cents: 10999,
                quantity: 2,
            }],
            total_cents: 21998,
            shipping_cost_cents: 500,
            salesperson_id: Some(1),
            salesperson_name: "Ana".into(),
            payment_method: PaymentMethod::Qr,
            location: None,
            layaway_id: None,
            refunded: false,
            synced: false,
        }
    }

    #[test]
    fn test_sale_to_remote_uses_decimals_and_iso_dates() {
        let row = sale_to_remote(&sale()).unwrap();
        assert_eq!(row.id, None);
        assert_eq!(row.total, 219.98);
        assert_eq!(row.shipping_cost, Some(5.0));
        assert_eq!(row.timestamp, "2024-03-01T10:00:00.000Z");
        assert_eq!(row.payment_method, "qr");
        assert_eq!(row.items[0]["price"], json!(109.99));
    }

    #[test]
    fn test_sale_from_remote_drops_local_only_fields() {
        let mut row = sale_to_remote(&sale()).unwrap();
        row.id = Some(4821);
        row.refunded = Some(true);

        let back = sale_from_remote(&row).unwrap();
        assert_eq!(back.id, 0);
        assert_eq!(back.salesperson_id, None);
        assert_eq!(back.total_cents, 21998);
        assert_eq!(back.items, sale().items);
        assert!(back.refunded);
        assert!(back.synced);
    }

    #[test]
    fn test_items_as_string() {
        let mut row = sale_to_remote(&sale()).unwrap();
        row.items = Value::String(row.items.to_string());
        assert_eq!(sale_from_remote(&row).unwrap().items.len(), 1);
    }

    #[test]
    fn test_unknown_payment_method_is_mapping_error() {
        let mut row = sale_to_remote(&sale()).unwrap();
        row.payment_method = "cheque".into();
        assert!(matches!(sale_from_remote(&row), Err(SyncError::Mapping(_))));
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01T10:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03-01T12:00:00+02:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03-01T10:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03-01 10:00:00.000").unwrap(), expected);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_negative_remote_stock_floors_at_zero() {
        let row = RemoteProduct {
            id: Some(1),
            name: "Era".into(),
            price: 69.99,
            category: None,
            brand: Some("Vans".into()),
            size: None,
            image: None,
            stock: -2,
        };
        let product = product_from_remote(&row);
        assert_eq!(product.stock, 0);
        assert_eq!(product.price_cents, 6999);
    }
}
