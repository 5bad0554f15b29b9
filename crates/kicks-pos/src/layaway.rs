//! # Layaways
//!
//! Reserve now, pay in installments.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create    layaway row (pending) ──► per line "layaway" movement (-qty) │
//! │                                                                         │
//! │  payment   ┌ one local transaction ──────────────────────────────┐    │
//! │            │ lock + re-read layaway ──► core math (balance, status) │    │
//! │            │ ──► synthetic sale (layaway_id set, no lines) ──► save │    │
//! │            └────────────────────────────────────────────────────────┘    │
//! │            ──► push_now(sale)                                           │
//! │                                                                         │
//! │  cancel    ┌ one local transaction ──────────────────────────────┐      │
//! │            │ lock + re-read ──► status = cancelled                │      │
//! │            │ ──► per line "return" movement (+qty) ──► save       │      │
//! │            └──────────────────────────────────────────────────────┘      │
//! │            ──► remote stock mirror per restocked product                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two payments, or a payment and a cancel, on the same layaway queue on the
//! layaway's lock: the second one sees the first one's balance and status.
//!
//! Layaways themselves never leave the device; the cash they bring in does,
//! through the synthetic sales. Those sales carry no lines so the pairs are
//! not counted twice (they left the shelf when the layaway was created).

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use kicks_core::layaway::{apply_payment, cancel, open};
use kicks_core::{
    CoreError, Layaway, LayawayPayment, LayawayStatus, MovementType, NewSale, PaymentMethod, Sale, SaleItem,
    SyncEntity, User,
};
use kicks_db::{Database, StockAdjustment};
use kicks_sync::SyncEngine;

use crate::error::{PosError, PosResult};
use crate::inventory::InventoryLedger;
use crate::outcome::{RemoteMirror, StockFailure};

/// Result of creating or cancelling a layaway.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayawayOutcome {
    pub layaway: Layaway,
    pub stock_failures: Vec<StockFailure>,
}

/// Result of an installment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    pub layaway: Layaway,
    /// The synthetic sale that carries the installment's cash.
    pub sale: Sale,
    pub remote: RemoteMirror,
}

#[derive(Clone)]
pub struct LayawayService {
    db: Database,
    engine: Arc<SyncEngine>,
}

impl LayawayService {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        LayawayService {
            db: engine.database().clone(),
            engine,
        }
    }

    fn ledger(&self) -> InventoryLedger {
        InventoryLedger::new(self.engine.clone())
    }

    /// Opens a layaway and takes its pairs off the shelf.
    pub async fn create(
        &self,
        customer_name: &str,
        customer_contact: Option<String>,
        items: Vec<SaleItem>,
        clerk: &User,
    ) -> PosResult<LayawayOutcome> {
        let draft = open(customer_name, customer_contact, items, Utc::now())?;
        let layaway = self.db.layaways().insert(&draft).await?;

        let stock_failures = self
            .ledger()
            .adjust_lines(&layaway.items, true, MovementType::Layaway, &clerk.actor(), layaway.id)
            .await;

        info!(
            layaway_id = layaway.id,
            customer = %layaway.customer_name,
            total_cents = layaway.total_cents,
            clerk = %clerk.name,
            "Layaway created"
        );
        Ok(LayawayOutcome {
            layaway,
            stock_failures,
        })
    }

    /// Records an installment.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown layaway
    /// - `Business` when the layaway is closed or the amount exceeds the
    ///   balance
    /// - `Validation` for a non-positive amount
    pub async fn add_payment(
        &self,
        layaway_id: i64,
        amount_cents: i64,
        method: PaymentMethod,
        clerk: &User,
    ) -> PosResult<PaymentOutcome> {
        let now = Utc::now();
        let mut update = self.db.layaways().begin_update(layaway_id).await?;
        apply_payment(
            update.layaway_mut(),
            LayawayPayment {
                amount_cents,
                date: now,
                method,
            },
        )?;
        let sale = update
            .record_sale(&NewSale {
                timestamp: now,
                items: Vec::new(),
                total_cents: amount_cents,
                shipping_cost_cents: 0,
                salesperson_id: Some(clerk.id),
                salesperson_name: clerk.name.clone(),
                payment_method: method,
                location: None,
                layaway_id: Some(layaway_id),
            })
            .await?;
        let layaway = update.commit().await?;

        let remote = RemoteMirror::push(&self.engine, SyncEntity::Sale, sale.id).await;
        let sale = self.db.sales().require(sale.id).await?;

        info!(
            layaway_id = layaway.id,
            amount_cents,
            balance_cents = layaway.balance_cents,
            status = %layaway.status,
            sale_id = sale.id,
            "Layaway payment recorded"
        );
        Ok(PaymentOutcome { layaway, sale, remote })
    }

    /// Calls off an open layaway and puts its pairs back on the shelf.
    ///
    /// Installments already paid stay recorded; any refund of them is a
    /// separate decision. A line whose product is gone is reported in
    /// `stock_failures` and the cancel still goes through.
    pub async fn cancel(&self, layaway_id: i64, clerk: &User) -> PosResult<LayawayOutcome> {
        let actor = clerk.actor();
        let mut update = self.db.layaways().begin_update(layaway_id).await?;
        cancel(update.layaway_mut(), Utc::now())?;

        let items = update.layaway().items.clone();
        let mut restocked = Vec::new();
        let mut stock_failures = Vec::new();
        for item in &items {
            let adj = StockAdjustment::new(item.product_id, item.quantity, MovementType::Return, actor.clone())
                .reference(layaway_id);
            match update.adjust_stock(&adj).await {
                Ok((product, _)) => restocked.push(product),
                Err(e) => {
                    let err = PosError::from(e);
                    warn!(
                        product_id = item.product_id,
                        layaway_id,
                        error = %err,
                        "Stock not returned for line, cancel kept"
                    );
                    stock_failures.push(StockFailure::new(item, &err));
                }
            }
        }
        let layaway = update.commit().await?;

        let ledger = self.ledger();
        for product in &restocked {
            ledger.mirror_stock(product).await;
        }

        info!(
            layaway_id = layaway.id,
            paid_cents = layaway.paid().cents(),
            restocked = restocked.len(),
            clerk = %clerk.name,
            "Layaway cancelled"
        );
        Ok(LayawayOutcome {
            layaway,
            stock_failures,
        })
    }

    /// All layaways, or only those in `status`.
    pub async fn list(&self, status: Option<LayawayStatus>) -> PosResult<Vec<Layaway>> {
        let layaways = match status {
            Some(status) => self.db.layaways().list_by_status(status).await?,
            None => self.db.layaways().list().await?,
        };
        Ok(layaways)
    }

    pub async fn get(&self, layaway_id: i64) -> PosResult<Layaway> {
        self.require(layaway_id).await
    }

    /// Installment sales recorded for a layaway.
    pub async fn payment_sales(&self, layaway_id: i64) -> PosResult<Vec<Sale>> {
        Ok(self.db.sales().list_for_layaway(layaway_id).await?)
    }

    async fn require(&self, layaway_id: i64) -> PosResult<Layaway> {
        Ok(self
            .db
            .layaways()
            .get_by_id(layaway_id)
            .await?
            .ok_or(CoreError::LayawayNotFound(layaway_id))?)
    }
}
