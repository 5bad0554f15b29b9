//! # Checkout
//!
//! Turns a cart into a recorded sale.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Cart ──► validate (lines, quantities, prices, shipping)                │
//! │             │ rejected ──► nothing written                              │
//! │             ▼                                                           │
//! │           INSERT sale (synced = 0)                                      │
//! │             │                                                           │
//! │             ▼                                                           │
//! │           per line: adjust_stock(-qty, "sale", reference = sale id)     │
//! │             │ failure ──► collected in stock_failures, sale kept        │
//! │             ▼                                                           │
//! │           push_now(sale)                                                │
//! │             ├── ok ──────► RemoteMirror::Confirmed                      │
//! │             └── error ───► RemoteMirror::Pending (next cycle uploads)   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Money is always taken. A product deleted from under the cart or a
//! network outage shows up as a warning in the outcome, never as a lost sale.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use kicks_core::validation::{validate_cart_size, validate_price_cents, validate_quantity, validate_shipping_cents};
use kicks_core::{CoreError, GeoPoint, Money, MovementType, NewSale, PaymentMethod, Product, Sale, SaleItem, SyncEntity, User};
use kicks_db::Database;
use kicks_sync::SyncEngine;

use crate::error::PosResult;
use crate::inventory::InventoryLedger;
use crate::outcome::{RemoteMirror, StockFailure};

// =============================================================================
// Cart
// =============================================================================

/// Lines being rung up. Each line is a frozen snapshot of the product as it
/// was when added, so later catalog edits do not change what the customer
/// was quoted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub items: Vec<SaleItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a product. Adding the same product again bumps its quantity.
    pub fn add(&mut self, product: &Product, quantity: i64) -> PosResult<()> {
        validate_quantity(quantity)?;

        if let Some(line) = self.items.iter_mut().find(|i| i.product_id == product.id) {
            let combined = line.quantity + quantity;
            validate_quantity(combined)?;
            line.quantity = combined;
            return Ok(());
        }

        validate_cart_size(self.items.len() + 1)?;
        self.items.push(SaleItem::from_product(product, quantity));
        Ok(())
    }

    /// Sets a line's quantity; zero removes it.
    pub fn set_quantity(&mut self, product_id: i64, quantity: i64) -> PosResult<()> {
        if quantity == 0 {
            self.remove(product_id);
            return Ok(());
        }
        validate_quantity(quantity)?;
        let line = self
            .items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or(CoreError::ProductNotFound(product_id))?;
        line.quantity = quantity;
        Ok(())
    }

    /// Overrides the unit price of a line (haggling, damaged box).
    pub fn set_price(&mut self, product_id: i64, price_cents: i64) -> PosResult<()> {
        validate_price_cents(price_cents)?;
        let line = self
            .items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or(CoreError::ProductNotFound(product_id))?;
        line.price_cents = price_cents;
        Ok(())
    }

    pub fn remove(&mut self, product_id: i64) {
        self.items.retain(|i| i.product_id != product_id);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn subtotal(&self) -> Money {
        self.items.iter().map(SaleItem::line_total).sum()
    }

    pub fn units(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

// =============================================================================
// Checkout
// =============================================================================

/// Everything needed to close a sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub cart: Cart,
    pub shipping_cost_cents: i64,
    pub payment_method: PaymentMethod,
    /// Where the sale happened, when the device knows.
    pub location: Option<GeoPoint>,
}

impl CheckoutRequest {
    pub fn new(cart: Cart, payment_method: PaymentMethod) -> Self {
        CheckoutRequest {
            cart,
            shipping_cost_cents: 0,
            payment_method,
            location: None,
        }
    }

    pub fn shipping(mut self, cents: i64) -> Self {
        self.shipping_cost_cents = cents;
        self
    }

    pub fn location(mut self, point: GeoPoint) -> Self {
        self.location = Some(point);
        self
    }

    fn validate(&self) -> PosResult<()> {
        if self.cart.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }
        validate_cart_size(self.cart.items.len())?;
        for item in &self.cart.items {
            validate_quantity(item.quantity)?;
            validate_price_cents(item.price_cents)?;
        }
        validate_shipping_cents(self.shipping_cost_cents)?;
        Ok(())
    }
}

/// What the cashier sees after charging.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOutcome {
    pub sale: Sale,
    /// Lines whose stock could not be adjusted.
    pub stock_failures: Vec<StockFailure>,
    pub remote: RemoteMirror,
}

impl CheckoutOutcome {
    /// True when there is something to warn the cashier about.
    pub fn has_warnings(&self) -> bool {
        !self.stock_failures.is_empty() || !self.remote.is_confirmed()
    }
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Database,
    engine: Arc<SyncEngine>,
}

impl CheckoutService {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        CheckoutService {
            db: engine.database().clone(),
            engine,
        }
    }

    /// Records the sale, moves the stock and tries to upload right away.
    pub async fn checkout(&self, request: CheckoutRequest, seller: &User) -> PosResult<CheckoutOutcome> {
        request.validate()?;
        debug!(lines = request.cart.items.len(), seller = %seller.name, "Checkout requested");

        let total = request.cart.subtotal() + Money::from_cents(request.shipping_cost_cents);
        let new_sale = NewSale {
            timestamp: Utc::now(),
            items: request.cart.items,
            total_cents: total.cents(),
            shipping_cost_cents: request.shipping_cost_cents,
            salesperson_id: Some(seller.id),
            salesperson_name: seller.name.clone(),
            payment_method: request.payment_method,
            location: request.location,
            layaway_id: None,
        };
        let sale = self.db.sales().insert(&new_sale).await?;

        let stock_failures = InventoryLedger::new(self.engine.clone())
            .adjust_lines(&sale.items, true, MovementType::Sale, &seller.actor(), sale.id)
            .await;

        let remote = RemoteMirror::push(&self.engine, SyncEntity::Sale, sale.id).await;
        let sale = self.db.sales().require(sale.id).await?;

        info!(
            sale_id = sale.id,
            total = %sale.total(),
            units = sale.units(),
            method = %sale.payment_method,
            stock_failures = stock_failures.len(),
            uploaded = remote.is_confirmed(),
            "Sale recorded"
        );

        Ok(CheckoutOutcome {
            sale,
            stock_failures,
            remote,
        })
    }
}
