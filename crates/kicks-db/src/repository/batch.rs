//! # Pull Batch
//!
//! Applies a page of remote records inside one local transaction.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  let mut batch = db.begin_pull().await?;                                │
//! │  for remote in page {                                                   │
//! │      let local = batch.find_sale(remote.id).await?;   // via remote_ids │
//! │      if merge says apply {                                              │
//! │          batch.put_sale(&merged, remote.id).await?;   // upsert + link  │
//! │      }                                                                  │
//! │  }                                                                      │
//! │  batch.commit().await?;                 // drop without commit = undo   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All reads go through the batch's own connection; touching the pool while
//! a batch is open would wait on a connection the batch already holds when
//! the pool has a single connection.

use sqlx::{Sqlite, Transaction};
use tracing::debug;

use super::expense::{ExpenseRow, EXPENSE_COLUMNS};
use super::product::{ProductRow, PRODUCT_COLUMNS};
use super::remote_id;
use super::sale::{SaleRow, SALE_COLUMNS};
use super::to_json;
use crate::error::DbResult;
use kicks_core::{Expense, Product, Sale, SyncEntity};

/// An open transaction for applying remote records.
pub struct PullBatch {
    tx: Transaction<'static, Sqlite>,
    applied: usize,
}

impl PullBatch {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        PullBatch { tx, applied: 0 }
    }

    /// Local id mapped to `remote_id`, if any.
    pub async fn local_for(&mut self, entity: SyncEntity, remote_id: i64) -> DbResult<Option<i64>> {
        remote_id::local_for(&mut *self.tx, entity, remote_id).await
    }

    /// Local counterpart of a remote sale.
    pub async fn find_sale(&mut self, remote_id: i64) -> DbResult<Option<Sale>> {
        let Some(local_id) = self.local_for(SyncEntity::Sale, remote_id).await? else {
            return Ok(None);
        };
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(local_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Sale::try_from).transpose()
    }

    /// Local counterpart of a remote product.
    pub async fn find_product(&mut self, remote_id: i64) -> DbResult<Option<Product>> {
        let Some(local_id) = self.local_for(SyncEntity::Product, remote_id).await? else {
            return Ok(None);
        };
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(local_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Product::from))
    }

    /// Local counterpart of a remote expense.
    pub async fn find_expense(&mut self, remote_id: i64) -> DbResult<Option<Expense>> {
        let Some(local_id) = self.local_for(SyncEntity::Expense, remote_id).await? else {
            return Ok(None);
        };
        let sql = format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?1");
        let row = sqlx::query_as::<_, ExpenseRow>(&sql)
            .bind(local_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Expense::from))
    }

    /// Insert-or-replace a sale and link it to `remote_id`.
    ///
    /// `sale.id == 0` inserts a new local row; any other id replaces that
    /// row. Returns the local id.
    pub async fn put_sale(&mut self, sale: &Sale, remote_id: i64) -> DbResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sales (
                id, timestamp, items, total_cents, shipping_cost_cents,
                salesperson_id, salesperson_name, payment_method,
                latitude, longitude, layaway_id, refunded, synced
            ) VALUES (NULLIF(?1, 0), ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO UPDATE SET
                timestamp = excluded.timestamp,
                items = excluded.items,
                total_cents = excluded.total_cents,
                shipping_cost_cents = excluded.shipping_cost_cents,
                salesperson_id = excluded.salesperson_id,
                salesperson_name = excluded.salesperson_name,
                payment_method = excluded.payment_method,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                layaway_id = excluded.layaway_id,
                refunded = excluded.refunded,
                synced = excluded.synced
            RETURNING id
            "#,
        )
        .bind(sale.id)
        .bind(sale.timestamp)
        .bind(to_json(&sale.items)?)
        .bind(sale.total_cents)
        .bind(sale.shipping_cost_cents)
        .bind(sale.salesperson_id)
        .bind(&sale.salesperson_name)
        .bind(sale.payment_method)
        .bind(sale.location.map(|l| l.lat))
        .bind(sale.location.map(|l| l.lng))
        .bind(sale.layaway_id)
        .bind(sale.refunded)
        .bind(sale.synced)
        .fetch_one(&mut *self.tx)
        .await?;

        remote_id::link(&mut *self.tx, SyncEntity::Sale, id, remote_id).await?;
        self.applied += 1;
        Ok(id)
    }

    /// Insert-or-replace a product and link it to `remote_id`.
    pub async fn put_product(&mut self, product: &Product, remote_id: i64) -> DbResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO products (id, name, price_cents, category, brand, size, image, stock, synced)
            VALUES (NULLIF(?1, 0), ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                price_cents = excluded.price_cents,
                category = excluded.category,
                brand = excluded.brand,
                size = excluded.size,
                image = excluded.image,
                stock = excluded.stock,
                synced = excluded.synced
            RETURNING id
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(&product.category)
        .bind(&product.brand)
        .bind(&product.size)
        .bind(&product.image)
        .bind(product.stock.max(0))
        .bind(product.synced)
        .fetch_one(&mut *self.tx)
        .await?;

        remote_id::link(&mut *self.tx, SyncEntity::Product, id, remote_id).await?;
        self.applied += 1;
        Ok(id)
    }

    /// Insert-or-replace an expense and link it to `remote_id`.
    pub async fn put_expense(&mut self, expense: &Expense, remote_id: i64) -> DbResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO expenses (id, timestamp, amount_cents, description, salesperson_id, synced)
            VALUES (NULLIF(?1, 0), ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                timestamp = excluded.timestamp,
                amount_cents = excluded.amount_cents,
                description = excluded.description,
                salesperson_id = excluded.salesperson_id,
                synced = excluded.synced
            RETURNING id
            "#,
        )
        .bind(expense.id)
        .bind(expense.timestamp)
        .bind(expense.amount_cents)
        .bind(&expense.description)
        .bind(expense.salesperson_id)
        .bind(expense.synced)
        .fetch_one(&mut *self.tx)
        .await?;

        remote_id::link(&mut *self.tx, SyncEntity::Expense, id, remote_id).await?;
        self.applied += 1;
        Ok(id)
    }

    /// Deletes the local record mapped to `remote_id` and its mapping.
    ///
    /// Returns the deleted local id, or `None` when nothing was mapped.
    pub async fn delete(&mut self, entity: SyncEntity, remote_id: i64) -> DbResult<Option<i64>> {
        let Some(local_id) = self.local_for(entity, remote_id).await? else {
            return Ok(None);
        };

        let sql = format!("DELETE FROM {} WHERE id = ?1", entity.table());
        sqlx::query(&sql)
            .bind(local_id)
            .execute(&mut *self.tx)
            .await?;
        remote_id::unlink_local(&mut *self.tx, entity, local_id).await?;

        self.applied += 1;
        Ok(Some(local_id))
    }

    /// Number of writes staged so far.
    pub fn applied(&self) -> usize {
        self.applied
    }

    pub async fn commit(self) -> DbResult<usize> {
        let applied = self.applied;
        self.tx.commit().await?;
        debug!(applied, "Pull batch committed");
        Ok(applied)
    }
}
