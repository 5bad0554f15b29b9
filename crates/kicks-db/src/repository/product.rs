//! # Product Repository
//!
//! Catalog rows. Stock is read here but only ever written through the
//! kardex ([`StockRepository`](super::stock::StockRepository)) or by the
//! sync engine applying a remote copy.

use sqlx::SqlitePool;
use tracing::debug;

use super::{remote_id, Versioned};
use crate::error::{DbError, DbResult};
use kicks_core::{NewProduct, Product, SyncEntity};

pub(crate) const PRODUCT_COLUMNS: &str =
    "id, name, price_cents, category, brand, size, image, stock, synced, version";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    id: i64,
    name: String,
    price_cents: i64,
    category: Option<String>,
    brand: Option<String>,
    size: Option<String>,
    image: Option<String>,
    stock: i64,
    synced: bool,
    version: i64,
}

impl From<ProductRow> for Versioned<Product> {
    fn from(row: ProductRow) -> Self {
        let version = row.version;
        Versioned {
            record: row.into(),
            version,
        }
    }
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            price_cents: row.price_cents,
            category: row.category,
            brand: row.brand,
            size: row.size,
            image: row.image,
            stock: row.stock,
            synced: row.synced,
        }
    }
}

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// All products, alphabetical.
    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name, id");
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Gets a product by its local id.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Product::from))
    }

    /// Like [`get_by_id`](Self::get_by_id) but `NotFound` when missing.
    pub async fn require(&self, id: i64) -> DbResult<Product> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Case-insensitive exact name match. Used as the natural key when the
    /// id mapping is lost.
    pub async fn find_by_name(&self, name: &str) -> DbResult<Option<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE name = ?1 COLLATE NOCASE ORDER BY id LIMIT 1"
        );
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Product::from))
    }

    /// Inserts a product as-is, unsynced.
    ///
    /// Opening stock should normally go through
    /// [`StockRepository::create_product`](super::stock::StockRepository::create_product)
    /// so the kardex gets its `initial` entry.
    pub async fn insert(&self, product: &NewProduct) -> DbResult<Product> {
        debug!(name = %product.name, "Inserting product");

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO products (name, price_cents, category, brand, size, image, stock, synced)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)
            RETURNING id
            "#,
        )
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(&product.category)
        .bind(&product.brand)
        .bind(&product.size)
        .bind(&product.image)
        .bind(product.stock)
        .fetch_one(&self.pool)
        .await?;

        self.require(id).await
    }

    /// Updates catalog fields (not stock) and flags the row unsynced.
    pub async fn update(&self, product: &Product) -> DbResult<Product> {
        debug!(id = product.id, "Updating product");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2,
                price_cents = ?3,
                category = ?4,
                brand = ?5,
                size = ?6,
                image = ?7,
                synced = 0
            WHERE id = ?1
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(&product.category)
        .bind(&product.brand)
        .bind(&product.size)
        .bind(&product.image)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", product.id));
        }

        self.require(product.id).await
    }

    /// Hard delete, together with the product's remote id mapping. The
    /// kardex keeps its history.
    pub async fn delete(&self, id: i64) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        remote_id::unlink_local(&mut *tx, SyncEntity::Product, id).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Products with local changes the remote store has not confirmed.
    pub async fn list_unsynced(&self) -> DbResult<Vec<Versioned<Product>>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE synced = 0 ORDER BY id");
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Versioned::from).collect())
    }

    pub async fn count_unsynced(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE synced = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn require_versioned(&self, id: i64) -> DbResult<Versioned<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Versioned::from)
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Every product with its version, in id order. Used by force push.
    pub async fn list_versioned(&self) -> DbResult<Vec<Versioned<Product>>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id");
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Versioned::from).collect())
    }

    /// Flags the product synced if it is still at `version`. A stock
    /// movement or catalog edit since the read keeps it pending.
    pub async fn mark_synced(&self, id: i64, version: i64) -> DbResult<bool> {
        let result = sqlx::query("UPDATE products SET synced = 1 WHERE id = ?1 AND version = ?2")
            .bind(id)
            .bind(version)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db, new_product};

    #[tokio::test]
    async fn test_insert_starts_unsynced() {
        let db = db().await;
        let p = db.products().insert(&new_product("Air Force 1", 3)).await.unwrap();
        assert!(!p.synced);
        assert_eq!(p.stock, 3);

        let pending = db.products().list_unsynced().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].record, p);

        assert!(db.products().mark_synced(p.id, pending[0].version).await.unwrap());
        assert!(db.products().list_unsynced().await.unwrap().is_empty());
        assert_eq!(db.products().count_unsynced().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_flags_unsynced_and_keeps_stock() {
        let db = db().await;
        let p = db.products().insert(&new_product("Blazer Mid", 5)).await.unwrap();
        db.products().mark_synced(p.id, 0).await.unwrap();

        let mut edited = db.products().require(p.id).await.unwrap();
        edited.price_cents = 8999;
        edited.stock = 999;
        let saved = db.products().update(&edited).await.unwrap();

        assert_eq!(saved.price_cents, 8999);
        assert_eq!(saved.stock, 5);
        assert!(!saved.synced);
    }

    #[tokio::test]
    async fn test_find_by_name_is_case_insensitive() {
        let db = db().await;
        db.products().insert(&new_product("Superstar", 1)).await.unwrap();
        let found = db.products().find_by_name(" superSTAR ").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let db = db().await;
        let err = db.products().delete(42).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_drops_remote_mapping() {
        let db = db().await;
        let kept = db.products().insert(&new_product("Court Vision", 1)).await.unwrap();
        let gone = db.products().insert(&new_product("Waffle One", 1)).await.unwrap();
        db.remote_ids().link(SyncEntity::Product, kept.id, 70).await.unwrap();
        db.remote_ids().link(SyncEntity::Product, gone.id, 71).await.unwrap();

        db.products().delete(gone.id).await.unwrap();

        assert!(db.products().get_by_id(gone.id).await.unwrap().is_none());
        assert_eq!(db.remote_ids().all(SyncEntity::Product).await.unwrap(), vec![(kept.id, 70)]);
    }

    #[tokio::test]
    async fn test_edit_during_upload_keeps_product_pending() {
        let db = db().await;
        let p = db.products().insert(&new_product("Air Max 90", 4)).await.unwrap();
        let read = db.products().require_versioned(p.id).await.unwrap();

        let mut edited = read.record.clone();
        edited.price_cents = 12500;
        db.products().update(&edited).await.unwrap();

        assert!(!db.products().mark_synced(p.id, read.version).await.unwrap());
        assert_eq!(db.products().count_unsynced().await.unwrap(), 1);
    }
}
