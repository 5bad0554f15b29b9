//! # Domain Types
//!
//! Core domain types used throughout Kicks POS.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │    Expense      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (i64)       │   │  id (i64)       │   │  id (i64)       │       │
//! │  │  name / brand   │   │  items (snap)   │   │  amount_cents   │       │
//! │  │  size           │   │  total_cents    │   │  description    │       │
//! │  │  stock >= 0     │   │  refunded       │   │  synced         │       │
//! │  │  synced         │   │  synced         │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Layaway      │   │  StockMovement  │   │      User       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  balance_cents  │   │  quantity (±)   │   │  pin (4 digit)  │       │
//! │  │  payments[]     │   │  prev → new     │   │  role           │       │
//! │  │  status         │   │  append-only    │   │  last_active    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Local ids are SQLite row ids. The remote store assigns its own ids, and
//! the correspondence lives in the Local Store's remote id table, never on
//! the records themselves.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

/// Implements `as_str`, `Display` and `FromStr` for a lowercase string enum.
macro_rules! string_enum {
    ($ty:ident, $field:literal, { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            /// Lowercase wire/storage form.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $s,)+
                }
            }

            /// Every accepted string form.
            pub fn allowed() -> Vec<String> {
                vec![$($s.to_string()),+]
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($s => Ok($ty::$variant),)+
                    _ => Err(ValidationError::NotAllowed {
                        field: $field.to_string(),
                        allowed: $ty::allowed(),
                    }),
                }
            }
        }
    };
}

// =============================================================================
// Product
// =============================================================================

/// A sneaker (or accessory) on the shelf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    pub id: i64,

    /// Display name shown to the salesperson and on the receipt.
    pub name: String,

    /// Price in cents.
    pub price_cents: i64,

    pub category: Option<String>,
    pub brand: Option<String>,

    /// Size label as printed on the box ("42", "US 9.5").
    pub size: Option<String>,

    /// Image URL.
    pub image: Option<String>,

    /// Units on hand. Never negative.
    pub stock: i64,

    /// Local copy matches the last confirmed remote copy.
    pub synced: bool,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

/// Fields needed to create a product locally.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub name: String,
    pub price_cents: i64,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub size: Option<String>,
    pub image: Option<String>,
    pub stock: i64,
}

// =============================================================================
// User
// =============================================================================

/// What a logged-in user is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Manages catalog, users, settings and sees the dashboard.
    Admin,
    /// Rings up sales, layaways and expenses.
    Sales,
}

string_enum!(UserRole, "role", { Admin => "admin", Sales => "sales" });

/// A till user. The PIN doubles as the login credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub pin: String,
    pub role: UserRole,
    #[ts(as = "Option<String>")]
    pub last_active: Option<DateTime<Utc>>,
}

impl User {
    #[inline]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Snapshot used to attribute sales, expenses and movements.
    pub fn actor(&self) -> Actor {
        Actor {
            id: Some(self.id),
            name: self.name.clone(),
        }
    }
}

/// Who did it. Denormalized onto every record it touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub id: Option<i64>,
    pub name: String,
}

impl Actor {
    /// Attribution for changes that did not come from a logged-in user.
    pub fn system() -> Self {
        Actor {
            id: None,
            name: "system".to_string(),
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    /// Bank transfer through a QR code.
    Qr,
}

string_enum!(PaymentMethod, "payment_method", { Cash => "cash", Card => "card", Qr => "qr" });

// =============================================================================
// Sale
// =============================================================================

/// A line on a sale or layaway.
///
/// Snapshot of the product at the time of sale; later catalog edits never
/// change it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleItem {
    pub product_id: i64,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub size: Option<String>,
    /// Unit price actually charged.
    pub price_cents: i64,
    pub quantity: i64,
}

impl SaleItem {
    /// Snapshot a product line.
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        SaleItem {
            product_id: product.id,
            name: product.name.clone(),
            brand: product.brand.clone(),
            category: product.category.clone(),
            size: product.size.clone(),
            price_cents: product.price_cents,
            quantity,
        }
    }

    /// Returns price × quantity.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.price_cents).multiply_quantity(self.quantity)
    }
}

/// Latitude/longitude captured at checkout. Never leaves the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A completed sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    pub id: i64,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
    pub items: Vec<SaleItem>,
    /// Everything the customer paid, shipping included.
    pub total_cents: i64,
    pub shipping_cost_cents: i64,
    /// Local only; the remote store keeps just the name.
    pub salesperson_id: Option<i64>,
    pub salesperson_name: String,
    pub payment_method: PaymentMethod,
    /// Local only.
    pub location: Option<GeoPoint>,
    /// Set on the synthetic sales that record layaway installments.
    pub layaway_id: Option<i64>,
    pub refunded: bool,
    pub synced: bool,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Total that counts towards revenue. Zero once refunded.
    #[inline]
    pub fn revenue(&self) -> Money {
        if self.refunded {
            Money::zero()
        } else {
            self.total()
        }
    }

    /// Total pairs on this sale.
    pub fn units(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

/// Fields needed to record a sale locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSale {
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
    pub items: Vec<SaleItem>,
    pub total_cents: i64,
    pub shipping_cost_cents: i64,
    pub salesperson_id: Option<i64>,
    pub salesperson_name: String,
    pub payment_method: PaymentMethod,
    pub location: Option<GeoPoint>,
    pub layaway_id: Option<i64>,
}

// =============================================================================
// Expense
// =============================================================================

/// Money taken out of the till (cleaning supplies, shipping labels...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Expense {
    pub id: i64,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
    pub amount_cents: i64,
    pub description: String,
    pub salesperson_id: Option<i64>,
    pub synced: bool,
}

impl Expense {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Layaway
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum LayawayStatus {
    /// Stock reserved, balance outstanding.
    Pending,
    /// Paid off.
    Completed,
    /// Called off; reserved stock went back to the shelf.
    Cancelled,
}

string_enum!(LayawayStatus, "status", {
    Pending => "pending",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl Default for LayawayStatus {
    fn default() -> Self {
        LayawayStatus::Pending
    }
}

/// One installment towards a layaway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LayawayPayment {
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    pub method: PaymentMethod,
}

/// A reserved sale paid off over several installments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Layaway {
    pub id: i64,
    pub customer_name: String,
    pub customer_contact: Option<String>,
    pub items: Vec<SaleItem>,
    pub total_cents: i64,
    /// Always `total_cents - Σ payments`.
    pub balance_cents: i64,
    pub payments: Vec<LayawayPayment>,
    pub status: LayawayStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Layaway {
    /// Sum of all installments so far.
    pub fn paid(&self) -> Money {
        self.payments
            .iter()
            .map(|p| Money::from_cents(p.amount_cents))
            .sum()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == LayawayStatus::Pending
    }
}

// =============================================================================
// Stock Movement (kardex)
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Sale,
    Restock,
    /// Manual correction after a count.
    Adjustment,
    /// Refund or layaway cancellation putting pairs back.
    Return,
    /// Reserved for a layaway.
    Layaway,
    /// Opening stock when a product is created.
    Initial,
}

string_enum!(MovementType, "movement_type", {
    Sale => "sale",
    Restock => "restock",
    Adjustment => "adjustment",
    Return => "return",
    Layaway => "layaway",
    Initial => "initial",
});

/// One append-only kardex entry.
///
/// `quantity` is the requested delta; `new_stock` is what the shelf ended up
/// at after zero-floor clamping, so `new_stock` may differ from
/// `previous_stock + quantity` on an oversell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockMovement {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<i64>,
    pub user_name: String,
    pub note: Option<String>,
    /// E.g. the sale id that caused this movement.
    pub reference_id: Option<String>,
}

// =============================================================================
// Sync Entities
// =============================================================================

/// Record kinds mirrored to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SyncEntity {
    Sale,
    Product,
    Expense,
}

string_enum!(SyncEntity, "entity", {
    Sale => "sale",
    Product => "product",
    Expense => "expense",
});

impl SyncEntity {
    pub const ALL: [SyncEntity; 3] = [SyncEntity::Sale, SyncEntity::Product, SyncEntity::Expense];

    /// Remote table holding this entity.
    pub const fn table(&self) -> &'static str {
        match self {
            SyncEntity::Sale => "sales",
            SyncEntity::Product => "products",
            SyncEntity::Expense => "expenses",
        }
    }

    /// Inverse of [`SyncEntity::table`].
    pub fn from_table(table: &str) -> Option<Self> {
        SyncEntity::ALL.into_iter().find(|e| e.table() == table)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> Product {
        Product {
            id: 7,
            name: "Air Max 90".to_string(),
            price_cents: 12999,
            category: Some("running".to_string()),
            brand: Some("Nike".to_string()),
            size: Some("42".to_string()),
            image: None,
            stock: 4,
            synced: true,
        }
    }

    #[test]
    fn test_enum_string_forms() {
        assert_eq!(PaymentMethod::Qr.as_str(), "qr");
        assert_eq!("CARD".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
        assert!("bitcoin".parse::<PaymentMethod>().is_err());

        assert_eq!(MovementType::Return.to_string(), "return");
        assert_eq!("initial".parse::<MovementType>().unwrap(), MovementType::Initial);

        assert_eq!("cancelled".parse::<LayawayStatus>().unwrap(), LayawayStatus::Cancelled);
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Admin);
    }

    #[test]
    fn test_serde_uses_lowercase() {
        let json = serde_json::to_string(&MovementType::Layaway).unwrap();
        assert_eq!(json, "\"layaway\"");
    }

    #[test]
    fn test_sale_item_snapshot() {
        let p = product();
        let item = SaleItem::from_product(&p, 2);
        assert_eq!(item.product_id, 7);
        assert_eq!(item.size.as_deref(), Some("42"));
        assert_eq!(item.line_total().cents(), 25998);
    }

    #[test]
    fn test_refunded_sale_has_no_revenue() {
        let mut sale = Sale {
            id: 1,
            timestamp: Utc::now(),
            items: vec![SaleItem::from_product(&product(), 1)],
            total_cents: 12999,
            shipping_cost_cents: 0,
            salesperson_id: Some(1),
            salesperson_name: "Ana".to_string(),
            payment_method: PaymentMethod::Cash,
            location: None,
            layaway_id: None,
            refunded: false,
            synced: false,
        };
        assert_eq!(sale.revenue().cents(), 12999);
        sale.refunded = true;
        assert_eq!(sale.revenue().cents(), 0);
        assert_eq!(sale.units(), 1);
    }

    #[test]
    fn test_sync_entity_tables() {
        assert_eq!(SyncEntity::Sale.table(), "sales");
        assert_eq!(SyncEntity::from_table("products"), Some(SyncEntity::Product));
        assert_eq!(SyncEntity::from_table("users"), None);
    }
}
