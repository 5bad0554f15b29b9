//! # Inventory Ledger
//!
//! Every till-originated stock change goes through [`InventoryLedger`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  adjust_stock(adj)                                                      │
//! │                                                                         │
//! │    1. kardex transaction (kicks-db)                                     │
//! │         stock = max(0, previous + delta), movement appended,            │
//! │         product flagged unsynced                                        │
//! │                                                                         │
//! │    2. remote stock mirror (best effort, after commit)                   │
//! │         no remote configured ──► skip                                   │
//! │         product never uploaded ──► skip (next push inserts it)          │
//! │         remote update fails ──► warn, swallow                           │
//! │                                                                         │
//! │  A failed mirror is never retried here. The product stays unsynced     │
//! │  and the next sync cycle pushes the full row.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use kicks_core::ledger::{audit, StockChange};
use kicks_core::validation::{validate_quantity, validate_stock, validate_stock_delta};
use kicks_core::{Actor, MovementType, Product, SaleItem, StockMovement, SyncEntity};
use kicks_db::{Database, StockAdjustment};
use kicks_sync::{update_product_stock, SyncEngine};

use crate::error::PosResult;
use crate::outcome::StockFailure;

/// Result of one stock change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Adjusted {
    pub product: Product,
    pub movement: StockMovement,
    /// True when the remote store accepted the new count.
    pub mirrored: bool,
}

#[derive(Clone)]
pub struct InventoryLedger {
    db: Database,
    engine: Arc<SyncEngine>,
}

impl InventoryLedger {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        InventoryLedger {
            db: engine.database().clone(),
            engine,
        }
    }

    /// Applies a signed stock change and records it in the kardex.
    ///
    /// ## Errors
    /// - `Validation` for a zero delta
    /// - `NotFound` when the product is not in the Local Store; callers
    ///   holding a sale or layaway keep their record and report the line
    pub async fn adjust_stock(&self, adj: StockAdjustment) -> PosResult<Adjusted> {
        validate_stock_delta(adj.delta)?;

        let (product, movement) = self.db.stock().adjust(&adj).await?;
        info!(
            product_id = product.id,
            movement_type = %movement.movement_type,
            delta = movement.quantity,
            stock = product.stock,
            user = %movement.user_name,
            "Stock movement recorded"
        );

        let mirrored = self.mirror_stock(&product).await;
        Ok(Adjusted {
            product,
            movement,
            mirrored,
        })
    }

    /// One movement per line of a sale or layaway. `outgoing` lines leave
    /// the shelf, the others come back.
    ///
    /// Lines that fail are returned, never raised: the financial record that
    /// owns them has already been written.
    pub(crate) async fn adjust_lines(
        &self,
        items: &[SaleItem],
        outgoing: bool,
        movement_type: MovementType,
        actor: &Actor,
        reference_id: i64,
    ) -> Vec<StockFailure> {
        let mut failures = Vec::new();
        for item in items {
            let delta = if outgoing { -item.quantity } else { item.quantity };
            let adj = StockAdjustment::new(item.product_id, delta, movement_type, actor.clone()).reference(reference_id);
            if let Err(e) = self.adjust_stock(adj).await {
                warn!(
                    product_id = item.product_id,
                    reference_id,
                    movement_type = %movement_type,
                    error = %e,
                    "Stock not adjusted for line, record kept"
                );
                failures.push(StockFailure::new(item, &e));
            }
        }
        failures
    }

    /// Adds received pairs to the shelf.
    pub async fn restock(&self, product_id: i64, quantity: i64, actor: &Actor, note: Option<String>) -> PosResult<Adjusted> {
        validate_quantity(quantity)?;
        let mut adj = StockAdjustment::new(product_id, quantity, MovementType::Restock, actor.clone());
        adj.note = note;
        self.adjust_stock(adj).await
    }

    /// Brings the shelf count to `target` after a physical count.
    ///
    /// Returns `None` when the count already matches; no movement is written.
    pub async fn set_stock(
        &self,
        product_id: i64,
        target: i64,
        actor: &Actor,
        note: Option<String>,
    ) -> PosResult<Option<Adjusted>> {
        validate_stock(target)?;
        let current = self.db.products().require(product_id).await?;

        let change = StockChange::to_target(current.stock, target);
        if change.delta == 0 {
            debug!(product_id, stock = target, "Stock count unchanged");
            return Ok(None);
        }

        let mut adj = StockAdjustment::new(product_id, change.delta, MovementType::Adjustment, actor.clone());
        adj.note = note.or_else(|| Some(format!("Count set to {target}")));
        self.adjust_stock(adj).await.map(Some)
    }

    /// Kardex for a product, newest first.
    pub async fn history(&self, product_id: i64) -> PosResult<Vec<StockMovement>> {
        Ok(self.db.stock().history(product_id).await?)
    }

    /// Checks that the kardex chain ends at the shelf count.
    ///
    /// Returns the index (replay order) of the first inconsistent movement.
    pub async fn audit(&self, product_id: i64) -> PosResult<Option<usize>> {
        let product = self.db.products().require(product_id).await?;
        let movements = self.db.stock().movements_for(product_id).await?;
        let broken = audit(&movements, product.stock);
        if let Some(index) = broken {
            warn!(product_id, index, "Kardex does not replay to the shelf count");
        }
        Ok(broken)
    }

    pub(crate) async fn mirror_stock(&self, product: &Product) -> bool {
        let Some(remote) = self.engine.remote().await else {
            return false;
        };

        let remote_id = match self.db.remote_ids().remote_for(SyncEntity::Product, product.id).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                debug!(product_id = product.id, "Product not uploaded yet, stock mirror skipped");
                return false;
            }
            Err(e) => {
                warn!(product_id = product.id, error = %e, "Could not resolve remote product id");
                return false;
            }
        };

        match update_product_stock(remote.as_ref(), remote_id, product.stock).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    product_id = product.id,
                    remote_id,
                    stock = product.stock,
                    error = %e,
                    "Remote stock mirror failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PosError;
    use crate::test_support::{add_product, product, till};
    use kicks_core::ledger::replay;
    use serde_json::json;

    fn clerk() -> Actor {
        Actor {
            id: Some(2),
            name: "Luis".into(),
        }
    }

    #[tokio::test]
    async fn test_sale_adjustment_records_movement() {
        let (till, _remote) = till().await;
        let p = add_product(&till, product("Jordan 1 Mid 42", 5)).await;

        let adj = StockAdjustment::new(p.id, -3, MovementType::Sale, clerk()).reference(77);
        let done = till.inventory().adjust_stock(adj).await.unwrap();

        assert_eq!(done.product.stock, 2);
        assert!(!done.product.synced);
        assert_eq!(done.movement.quantity, -3);
        assert_eq!(done.movement.previous_stock, 5);
        assert_eq!(done.movement.new_stock, 2);
        assert_eq!(done.movement.reference_id.as_deref(), Some("77"));
        assert_eq!(done.movement.user_name, "Luis");
    }

    #[tokio::test]
    async fn test_oversell_clamps_to_zero() {
        let (till, _remote) = till().await;
        let p = add_product(&till, product("Samba OG 40", 2)).await;

        let adj = StockAdjustment::new(p.id, -5, MovementType::Sale, clerk());
        let done = till.inventory().adjust_stock(adj).await.unwrap();

        assert_eq!(done.product.stock, 0);
        assert_eq!(
            (done.movement.quantity, done.movement.previous_stock, done.movement.new_stock),
            (-5, 2, 0)
        );
    }

    #[tokio::test]
    async fn test_missing_product_writes_nothing() {
        let (till, _remote) = till().await;
        let adj = StockAdjustment::new(404, -1, MovementType::Sale, clerk());

        let err = till.inventory().adjust_stock(adj).await.unwrap_err();
        assert!(matches!(err, PosError::NotFound { .. }));
        assert!(till.inventory().history(404).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_delta_rejected() {
        let (till, _remote) = till().await;
        let p = add_product(&till, product("Gel-Kayano 14", 1)).await;

        let adj = StockAdjustment::new(p.id, 0, MovementType::Adjustment, clerk());
        assert!(matches!(
            till.inventory().adjust_stock(adj).await,
            Err(PosError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_replay_matches_shelf() {
        let (till, _remote) = till().await;
        let inventory = till.inventory();
        let p = add_product(&till, product("Superstar 43", 3)).await;

        for delta in [-2, -4, 6, -1] {
            let adj = StockAdjustment::new(p.id, delta, MovementType::Adjustment, clerk());
            inventory.adjust_stock(adj).await.unwrap();
        }
        inventory.restock(p.id, 2, &clerk(), None).await.unwrap();

        let shelf = till.database().products().require(p.id).await.unwrap().stock;
        let movements = till.database().stock().movements_for(p.id).await.unwrap();
        assert_eq!(shelf, 7);
        assert_eq!(replay(0, &movements), shelf);
        assert_eq!(inventory.audit(p.id).await.unwrap(), None);

        let newest_first = inventory.history(p.id).await.unwrap();
        assert_eq!(newest_first[0].movement_type, MovementType::Restock);
        assert_eq!(newest_first.last().unwrap().movement_type, MovementType::Initial);
    }

    #[tokio::test]
    async fn test_set_stock_to_count() {
        let (till, _remote) = till().await;
        let p = add_product(&till, product("Club C 85", 4)).await;

        let done = till
            .inventory()
            .set_stock(p.id, 9, &clerk(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.movement.movement_type, MovementType::Adjustment);
        assert_eq!(done.movement.quantity, 5);
        assert_eq!(done.product.stock, 9);

        assert!(till.inventory().set_stock(p.id, 9, &clerk(), None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mirror_updates_uploaded_product() {
        let (till, remote) = till().await;
        let p = add_product(&till, product("Forum Low 41", 6)).await;
        let rid = till.engine().push_now(SyncEntity::Product, p.id).await.unwrap();

        let adj = StockAdjustment::new(p.id, -1, MovementType::Sale, clerk());
        let done = till.inventory().adjust_stock(adj).await.unwrap();

        assert!(done.mirrored);
        assert_eq!(remote.row(SyncEntity::Product, rid).unwrap()["stock"], json!(5));
        // The ledger never confirms the row itself
        assert!(!till.database().products().require(p.id).await.unwrap().synced);
    }

    #[tokio::test]
    async fn test_mirror_failure_is_swallowed() {
        let (till, remote) = till().await;
        let p = add_product(&till, product("574 Core 44", 6)).await;
        till.engine().push_now(SyncEntity::Product, p.id).await.unwrap();
        remote.set_offline(true);

        let adj = StockAdjustment::new(p.id, -2, MovementType::Sale, clerk());
        let done = till.inventory().adjust_stock(adj).await.unwrap();

        assert!(!done.mirrored);
        assert_eq!(done.product.stock, 4);
    }

    #[tokio::test]
    async fn test_unuploaded_product_skips_mirror() {
        let (till, remote) = till().await;
        let p = add_product(&till, product("Old Skool 39", 6)).await;
        let calls_before = remote.calls();

        let adj = StockAdjustment::new(p.id, -2, MovementType::Sale, clerk());
        let done = till.inventory().adjust_stock(adj).await.unwrap();

        assert!(!done.mirrored);
        assert_eq!(remote.calls(), calls_before);
    }
}
