//! # Catalog
//!
//! Admin-side product management.
//!
//! ```text
//!  create_product   product + "initial" movement (when stock > 0), one tx
//!  update_product   catalog fields only, synced = 0; stock goes through
//!                   the inventory ledger
//!  delete_product   uploaded?  remote delete first, then local delete
//!                   local only  local delete
//!  restock          "restock" movement through the inventory ledger
//! ```
//!
//! A product that exists remotely is deleted there before it disappears
//! locally. Otherwise the next full pull would bring it straight back.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use kicks_core::validation::{validate_price_cents, validate_product_name, validate_stock};
use kicks_core::{NewProduct, Product, SyncEntity, User};
use kicks_db::Database;
use kicks_sync::SyncEngine;

use crate::error::{PosError, PosResult};
use crate::inventory::{Adjusted, InventoryLedger};
use crate::require_admin;

/// Catalog fields to change; `None` leaves a field as it is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub price_cents: Option<i64>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub size: Option<String>,
    pub image: Option<String>,
}

impl ProductUpdate {
    fn apply(self, product: &mut Product) {
        if let Some(name) = self.name {
            product.name = name.trim().to_string();
        }
        if let Some(price) = self.price_cents {
            product.price_cents = price;
        }
        if self.category.is_some() {
            product.category = self.category;
        }
        if self.brand.is_some() {
            product.brand = self.brand;
        }
        if self.size.is_some() {
            product.size = self.size;
        }
        if self.image.is_some() {
            product.image = self.image;
        }
    }
}

#[derive(Clone)]
pub struct CatalogService {
    db: Database,
    engine: Arc<SyncEngine>,
}

impl CatalogService {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        CatalogService {
            db: engine.database().clone(),
            engine,
        }
    }

    pub async fn list(&self) -> PosResult<Vec<Product>> {
        Ok(self.db.products().list().await?)
    }

    pub async fn get(&self, product_id: i64) -> PosResult<Product> {
        Ok(self.db.products().require(product_id).await?)
    }

    pub async fn create_product(&self, acting: &User, mut new: NewProduct) -> PosResult<Product> {
        require_admin(acting, "edit the catalog")?;
        validate_product_name(&new.name)?;
        validate_price_cents(new.price_cents)?;
        validate_stock(new.stock)?;
        new.name = new.name.trim().to_string();

        let (product, initial) = self.db.stock().create_product(&new, &acting.actor()).await?;
        info!(
            product_id = product.id,
            name = %product.name,
            stock = product.stock,
            initial_movement = initial.is_some(),
            "Product created"
        );
        Ok(product)
    }

    pub async fn update_product(&self, acting: &User, product_id: i64, update: ProductUpdate) -> PosResult<Product> {
        require_admin(acting, "edit the catalog")?;

        let mut product = self.db.products().require(product_id).await?;
        update.apply(&mut product);
        validate_product_name(&product.name)?;
        validate_price_cents(product.price_cents)?;

        let product = self.db.products().update(&product).await?;
        info!(product_id, name = %product.name, price_cents = product.price_cents, "Product updated");
        Ok(product)
    }

    /// Deletes a product here and, when it was uploaded, remotely.
    ///
    /// ## Errors
    /// `Remote` when the product exists remotely and the remote delete
    /// fails; nothing is deleted locally in that case.
    pub async fn delete_product(&self, acting: &User, product_id: i64) -> PosResult<()> {
        require_admin(acting, "edit the catalog")?;
        let product = self.db.products().require(product_id).await?;

        let mapped = self.db.remote_ids().remote_for(SyncEntity::Product, product_id).await?;
        if let Some(remote_id) = mapped {
            match self.engine.remote().await {
                Some(remote) => {
                    let existed = remote.delete(SyncEntity::Product, remote_id).await?;
                    debug!(product_id, remote_id, existed, "Remote product deleted");
                }
                None => {
                    return Err(PosError::business(
                        "product exists in the remote store; configure the remote store before deleting it",
                    ))
                }
            }
        }

        self.db.products().delete(product_id).await?;
        info!(product_id, name = %product.name, by = %acting.name, "Product deleted");
        Ok(())
    }

    /// Receives stock. Open to every user.
    pub async fn restock(&self, acting: &User, product_id: i64, quantity: i64) -> PosResult<Adjusted> {
        InventoryLedger::new(self.engine.clone())
            .restock(product_id, quantity, &acting.actor(), None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{admin, clerk, product, till};
    use kicks_core::MovementType;

    #[tokio::test]
    async fn test_create_writes_initial_movement() {
        let (till, _remote) = till().await;
        let boss = admin(&till).await;

        let p = till.catalog().create_product(&boss, product(" Samba OG 42 ", 4)).await.unwrap();
        assert_eq!(p.name, "Samba OG 42");
        assert_eq!(p.stock, 4);
        assert!(!p.synced);

        let history = till.inventory().history(p.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].movement_type, MovementType::Initial);
        assert_eq!(history[0].user_name, "Marta");

        let empty = till.catalog().create_product(&boss, product("Samba OG 43", 0)).await.unwrap();
        assert!(till.inventory().history(empty.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clerk_cannot_edit_catalog() {
        let (till, _remote) = till().await;
        let seller = clerk(&till).await;
        assert!(matches!(
            till.catalog().create_product(&seller, product("Handball Spezial", 1)).await,
            Err(PosError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_update_keeps_stock() {
        let (till, _remote) = till().await;
        let boss = admin(&till).await;
        let p = till.catalog().create_product(&boss, product("Cortez 40", 3)).await.unwrap();
        till.engine().push_now(SyncEntity::Product, p.id).await.unwrap();

        let update = ProductUpdate {
            price_cents: Some(9900),
            brand: Some("Nike".into()),
            ..Default::default()
        };
        let updated = till.catalog().update_product(&boss, p.id, update).await.unwrap();

        assert_eq!(updated.price_cents, 9900);
        assert_eq!(updated.stock, 3);
        assert!(!updated.synced);

        let bad = ProductUpdate {
            price_cents: Some(-1),
            ..Default::default()
        };
        assert!(matches!(
            till.catalog().update_product(&boss, p.id, bad).await,
            Err(PosError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_remote_row() {
        let (till, remote) = till().await;
        let boss = admin(&till).await;
        let p = till.catalog().create_product(&boss, product("Air Max 1 41", 1)).await.unwrap();
        let rid = till.engine().push_now(SyncEntity::Product, p.id).await.unwrap();

        till.catalog().delete_product(&boss, p.id).await.unwrap();

        assert!(remote.row(SyncEntity::Product, rid).is_none());
        assert!(till.database().products().get_by_id(p.id).await.unwrap().is_none());
        assert_eq!(
            till.database().remote_ids().remote_for(SyncEntity::Product, p.id).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_delete_waits_for_remote() {
        let (till, remote) = till().await;
        let boss = admin(&till).await;
        let p = till.catalog().create_product(&boss, product("Air Max 95 44", 1)).await.unwrap();
        till.engine().push_now(SyncEntity::Product, p.id).await.unwrap();
        remote.set_offline(true);

        let err = till.catalog().delete_product(&boss, p.id).await.unwrap_err();
        assert!(matches!(err, PosError::Remote(_)));
        assert!(till.database().products().get_by_id(p.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_local_only_product_deleted_offline() {
        let (till, remote) = till().await;
        let boss = admin(&till).await;
        let p = till.catalog().create_product(&boss, product("Pegasus 40", 1)).await.unwrap();
        remote.set_offline(true);

        till.catalog().delete_product(&boss, p.id).await.unwrap();
        assert!(till.catalog().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restock_by_clerk() {
        let (till, _remote) = till().await;
        let boss = admin(&till).await;
        let seller = clerk(&till).await;
        let p = till.catalog().create_product(&boss, product("Vomero 5", 0)).await.unwrap();

        let done = till.catalog().restock(&seller, p.id, 6).await.unwrap();
        assert_eq!(done.product.stock, 6);
        assert_eq!(done.movement.movement_type, MovementType::Restock);
    }
}
