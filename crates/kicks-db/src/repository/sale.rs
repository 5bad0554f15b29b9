//! # Sale Repository
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  checkout ──► insert (synced=0) ──► push ok ──► mark_synced (synced=1)  │
//! │                                                                         │
//! │  refund   ──► mark_refunded (refunded=1, synced=0) ──► push ──► synced  │
//! │                                                                         │
//! │  Each write that leaves synced=0 bumps `version`; mark_synced only      │
//! │  flips the flag for the version the push read.                          │
//! │                                                                         │
//! │  Sales are never deleted by the till; only a remote DELETE event        │
//! │  removes one (see PullBatch::delete).                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::{from_json, to_json, Versioned};
use crate::error::{DbError, DbResult};
use kicks_core::{GeoPoint, NewSale, PaymentMethod, Sale};

pub(crate) const SALE_COLUMNS: &str = "id, timestamp, items, total_cents, shipping_cost_cents, \
     salesperson_id, salesperson_name, payment_method, latitude, longitude, layaway_id, \
     refunded, synced, version";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SaleRow {
    id: i64,
    timestamp: DateTime<Utc>,
    items: String,
    total_cents: i64,
    shipping_cost_cents: i64,
    salesperson_id: Option<i64>,
    salesperson_name: String,
    payment_method: PaymentMethod,
    latitude: Option<f64>,
    longitude: Option<f64>,
    layaway_id: Option<i64>,
    refunded: bool,
    synced: bool,
    version: i64,
}

impl TryFrom<SaleRow> for Sale {
    type Error = DbError;

    fn try_from(row: SaleRow) -> DbResult<Self> {
        let location = match (row.latitude, row.longitude) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        };

        Ok(Sale {
            id: row.id,
            timestamp: row.timestamp,
            items: from_json(&row.items)?,
            total_cents: row.total_cents,
            shipping_cost_cents: row.shipping_cost_cents,
            salesperson_id: row.salesperson_id,
            salesperson_name: row.salesperson_name,
            payment_method: row.payment_method,
            location,
            layaway_id: row.layaway_id,
            refunded: row.refunded,
            synced: row.synced,
        })
    }
}

pub(crate) fn rows_to_sales(rows: Vec<SaleRow>) -> DbResult<Vec<Sale>> {
    rows.into_iter().map(Sale::try_from).collect()
}

/// Inserts on a caller's connection, so a layaway payment and its sale can
/// share one transaction.
pub(crate) async fn insert_on(conn: &mut SqliteConnection, sale: &NewSale) -> DbResult<Sale> {
    debug!(
        total_cents = sale.total_cents,
        items = sale.items.len(),
        layaway_id = ?sale.layaway_id,
        "Inserting sale"
    );

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sales (
            timestamp, items, total_cents, shipping_cost_cents,
            salesperson_id, salesperson_name, payment_method,
            latitude, longitude, layaway_id, refunded, synced
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, 0)
        RETURNING id
        "#,
    )
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
    .fetch_one(&mut *conn)
    .await?;

    let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
    sqlx::query_as::<_, SaleRow>(&sql)
        .bind(id)
        .fetch_one(&mut *conn)
        .await?
        .try_into()
}

fn versioned(row: SaleRow) -> DbResult<Versioned<Sale>> {
    let version = row.version;
    Ok(Versioned {
        record: Sale::try_from(row)?,
        version,
    })
}

/// Repository for sale operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Records a sale locally, unsynced.
    pub async fn insert(&self, sale: &NewSale) -> DbResult<Sale> {
        insert_on(&mut *self.pool.acquire().await?, sale).await
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Sale::try_from).transpose()
    }

    /// Like [`get_by_id`](Self::get_by_id) but `NotFound` when missing.
    pub async fn require(&self, id: i64) -> DbResult<Sale> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id))
    }

    /// Newest first.
    pub async fn list(&self, limit: u32) -> DbResult<Vec<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales ORDER BY timestamp DESC, id DESC LIMIT ?1");
        let rows = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows_to_sales(rows)
    }

    /// Sales in `[from, to)`, oldest first.
    pub async fn list_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> DbResult<Vec<Sale>> {
        let sql = format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE timestamp >= ?1 AND timestamp < ?2 ORDER BY timestamp, id"
        );
        let rows = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        rows_to_sales(rows)
    }

    /// Synthetic installment sales recorded for a layaway.
    pub async fn list_for_layaway(&self, layaway_id: i64) -> DbResult<Vec<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE layaway_id = ?1 ORDER BY id");
        let rows = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(layaway_id)
            .fetch_all(&self.pool)
            .await?;
        rows_to_sales(rows)
    }

    /// Sales waiting for upload, with the version each was read at.
    pub async fn list_unsynced(&self) -> DbResult<Vec<Versioned<Sale>>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE synced = 0 ORDER BY id");
        let rows = sqlx::query_as::<_, SaleRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(versioned).collect()
    }

    pub async fn count_unsynced(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales WHERE synced = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn require_versioned(&self, id: i64) -> DbResult<Versioned<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id))?;
        versioned(row)
    }

    /// Every sale with its version, oldest first. Used by force push.
    pub async fn list_versioned(&self) -> DbResult<Vec<Versioned<Sale>>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales ORDER BY timestamp, id");
        let rows = sqlx::query_as::<_, SaleRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(versioned).collect()
    }

    /// Flags the sale synced if it is still at `version`.
    ///
    /// Returns false when a local write (a refund, say) landed after the
    /// uploaded copy was read; the sale then stays pending.
    pub async fn mark_synced(&self, id: i64, version: i64) -> DbResult<bool> {
        let result = sqlx::query("UPDATE sales SET synced = 1 WHERE id = ?1 AND version = ?2")
            .bind(id)
            .bind(version)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Flags a sale refunded and unsynced. The row stays for audit.
    pub async fn mark_refunded(&self, id: i64) -> DbResult<Sale> {
        let result = sqlx::query("UPDATE sales SET refunded = 1, synced = 0 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", id));
        }
        self.require(id).await
    }

    /// Every sale, oldest first.
    pub async fn list_all(&self) -> DbResult<Vec<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales ORDER BY timestamp, id");
        let rows = sqlx::query_as::<_, SaleRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows_to_sales(rows)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db, new_sale};
    use chrono::Duration;

    #[tokio::test]
    async fn test_insert_roundtrips_items_and_location() {
        let db = db().await;
        let mut new = new_sale(15000);
        new.location = Some(GeoPoint { lat: -12.05, lng: -77.04 });
        new.shipping_cost_cents = 1000;

        let sale = db.sales().insert(&new).await.unwrap();
        assert_eq!(sale.items, new.items);
        assert_eq!(sale.location, new.location);
        assert_eq!(sale.payment_method, PaymentMethod::Card);
        assert!(!sale.synced);
        assert!(!sale.refunded);
    }

    #[tokio::test]
    async fn test_refund_marks_unsynced() {
        let db = db().await;
        let sale = db.sales().insert(&new_sale(5000)).await.unwrap();
        assert!(db.sales().mark_synced(sale.id, 0).await.unwrap());
        assert_eq!(db.sales().count_unsynced().await.unwrap(), 0);

        let refunded = db.sales().mark_refunded(sale.id).await.unwrap();
        assert!(refunded.refunded);
        assert!(!refunded.synced);
        assert_eq!(db.sales().count_unsynced().await.unwrap(), 1);
        assert_eq!(db.sales().list_unsynced().await.unwrap()[0].record, refunded);
    }

    #[tokio::test]
    async fn test_mark_synced_skips_sale_edited_after_read() {
        let db = db().await;
        let sale = db.sales().insert(&new_sale(5000)).await.unwrap();
        let read = db.sales().require_versioned(sale.id).await.unwrap();

        // Refund lands while the read copy is being uploaded
        db.sales().mark_refunded(sale.id).await.unwrap();
        assert!(!db.sales().mark_synced(sale.id, read.version).await.unwrap());

        let pending = db.sales().list_unsynced().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].record.refunded);
        assert!(pending[0].version > read.version);

        assert!(db.sales().mark_synced(sale.id, pending[0].version).await.unwrap());
        let stored = db.sales().require(sale.id).await.unwrap();
        assert!(stored.synced);
        assert!(stored.refunded);
    }

    #[tokio::test]
    async fn test_list_between() {
        let db = db().await;
        let now = Utc::now();
        let mut old = new_sale(100);
        old.timestamp = now - Duration::days(3);
        db.sales().insert(&old).await.unwrap();
        db.sales().insert(&new_sale(200)).await.unwrap();

        let today = db
            .sales()
            .list_between(now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].total_cents, 200);
    }
}
