//! # Refunds
//!
//! A refunded sale is kept for the record but stops counting as revenue.
//!
//! ```text
//!  refund(sale)
//!    already refunded? ──► AlreadyRefunded, nothing written
//!    refunded = 1, synced = 0
//!    per line: adjust_stock(+qty, "return", reference = sale id)
//!    push_now(sale)        best effort; the refund flag wins any later pull
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use kicks_core::{CoreError, MovementType, Sale, SyncEntity, User};
use kicks_db::Database;
use kicks_sync::SyncEngine;

use crate::error::PosResult;
use crate::inventory::InventoryLedger;
use crate::outcome::{RemoteMirror, StockFailure};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundOutcome {
    pub sale: Sale,
    pub stock_failures: Vec<StockFailure>,
    pub remote: RemoteMirror,
}

#[derive(Clone)]
pub struct RefundService {
    db: Database,
    engine: Arc<SyncEngine>,
}

impl RefundService {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        RefundService {
            db: engine.database().clone(),
            engine,
        }
    }

    /// Refunds a whole sale and puts its pairs back on the shelf.
    ///
    /// Layaway installment sales carry no lines, so refunding one only
    /// reverses the money.
    pub async fn refund(&self, sale_id: i64, operator: &User) -> PosResult<RefundOutcome> {
        let sale = self
            .db
            .sales()
            .get_by_id(sale_id)
            .await?
            .ok_or(CoreError::SaleNotFound(sale_id))?;
        if sale.refunded {
            return Err(CoreError::AlreadyRefunded(sale_id).into());
        }

        let sale = self.db.sales().mark_refunded(sale_id).await?;
        let stock_failures = InventoryLedger::new(self.engine.clone())
            .adjust_lines(&sale.items, false, MovementType::Return, &operator.actor(), sale.id)
            .await;

        let remote = RemoteMirror::push(&self.engine, SyncEntity::Sale, sale.id).await;
        let sale = self.db.sales().require(sale.id).await?;

        info!(
            sale_id = sale.id,
            total = %sale.total(),
            operator = %operator.name,
            uploaded = remote.is_confirmed(),
            "Sale refunded"
        );

        Ok(RefundOutcome {
            sale,
            stock_failures,
            remote,
        })
    }
}
