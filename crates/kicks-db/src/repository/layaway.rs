//! # Layaway Repository
//!
//! Layaways stay local; only their synthetic installment sales are synced.
//!
//! ## Payments and Cancels
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  let mut update = db.layaways().begin_update(id).await?;                │
//! │      BEGIN                                                              │
//! │      UPDATE layaways SET updated_at = updated_at   ← takes write lock   │
//! │      SELECT .. FROM layaways WHERE id = ?          ← fresh copy         │
//! │                                                                         │
//! │  apply_payment(update.layaway_mut(), ..)?;         // core math         │
//! │  update.record_sale(&installment).await?;          // same tx           │
//! │  update.commit().await?;                           // save + COMMIT     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A second payment or a cancel for the same layaway waits on the lock and
//! then reads the committed balance. Dropping the update rolls it back.

use chrono::{DateTime, Utc};
use sqlx::{Connection, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;

use super::sale::insert_on as insert_sale;
use super::stock::{adjust_on, StockAdjustment};
use super::{from_json, to_json};
use crate::error::{DbError, DbResult};
use kicks_core::{Layaway, LayawayStatus, NewSale, Product, Sale, StockMovement};

const LAYAWAY_COLUMNS: &str = "id, customer_name, customer_contact, items, total_cents, \
     balance_cents, payments, status, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct LayawayRow {
    id: i64,
    customer_name: String,
    customer_contact: Option<String>,
    items: String,
    total_cents: i64,
    balance_cents: i64,
    payments: String,
    status: LayawayStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LayawayRow> for Layaway {
    type Error = DbError;

    fn try_from(row: LayawayRow) -> DbResult<Self> {
        Ok(Layaway {
            id: row.id,
            customer_name: row.customer_name,
            customer_contact: row.customer_contact,
            items: from_json(&row.items)?,
            total_cents: row.total_cents,
            balance_cents: row.balance_cents,
            payments: from_json(&row.payments)?,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for layaway operations.
#[derive(Debug, Clone)]
pub struct LayawayRepository {
    pool: SqlitePool,
}

impl LayawayRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LayawayRepository { pool }
    }

    /// Stores a new layaway; the `id` field of the argument is ignored.
    pub async fn insert(&self, layaway: &Layaway) -> DbResult<Layaway> {
        debug!(customer = %layaway.customer_name, total_cents = layaway.total_cents, "Inserting layaway");

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO layaways (
                customer_name, customer_contact, items, total_cents, balance_cents,
                payments, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            RETURNING id
            "#,
        )
        .bind(&layaway.customer_name)
        .bind(&layaway.customer_contact)
        .bind(to_json(&layaway.items)?)
        .bind(layaway.total_cents)
        .bind(layaway.balance_cents)
        .bind(to_json(&layaway.payments)?)
        .bind(layaway.status)
        .bind(layaway.created_at)
        .bind(layaway.updated_at)
        .fetch_one(&self.pool)
        .await?;

        self.require(id).await
    }

    /// Persists balance, payments and status.
    ///
    /// Payments and cancels go through [`begin_update`](Self::begin_update)
    /// instead, so the read and the write cannot interleave with another
    /// writer.
    pub async fn save(&self, layaway: &Layaway) -> DbResult<()> {
        save_on(&mut *self.pool.acquire().await?, layaway).await
    }

    /// Locks one layaway for a read-modify-write.
    ///
    /// ## Errors
    /// `NotFound` for an unknown id; nothing is locked in that case.
    pub async fn begin_update(&self, id: i64) -> DbResult<LayawayUpdate> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query("UPDATE layaways SET updated_at = updated_at WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if locked.rows_affected() == 0 {
            return Err(DbError::not_found("Layaway", id));
        }

        let sql = format!("SELECT {LAYAWAY_COLUMNS} FROM layaways WHERE id = ?1");
        let layaway: Layaway = sqlx::query_as::<_, LayawayRow>(&sql)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?
            .try_into()?;

        Ok(LayawayUpdate { tx, layaway })
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Layaway>> {
        let sql = format!("SELECT {LAYAWAY_COLUMNS} FROM layaways WHERE id = ?1");
        let row = sqlx::query_as::<_, LayawayRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Layaway::try_from).transpose()
    }

    pub async fn require(&self, id: i64) -> DbResult<Layaway> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Layaway", id))
    }

    /// Newest first.
    pub async fn list(&self) -> DbResult<Vec<Layaway>> {
        let sql = format!("SELECT {LAYAWAY_COLUMNS} FROM layaways ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query_as::<_, LayawayRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Layaway::try_from).collect()
    }

    pub async fn list_by_status(&self, status: LayawayStatus) -> DbResult<Vec<Layaway>> {
        let sql = format!(
            "SELECT {LAYAWAY_COLUMNS} FROM layaways WHERE status = ?1 ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, LayawayRow>(&sql)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Layaway::try_from).collect()
    }
}

async fn save_on(conn: &mut SqliteConnection, layaway: &Layaway) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE layaways SET
            customer_name = ?2,
            customer_contact = ?3,
            balance_cents = ?4,
            payments = ?5,
            status = ?6,
            updated_at = ?7
        WHERE id = ?1
        "#,
    )
    .bind(layaway.id)
    .bind(&layaway.customer_name)
    .bind(&layaway.customer_contact)
    .bind(layaway.balance_cents)
    .bind(to_json(&layaway.payments)?)
    .bind(layaway.status)
    .bind(layaway.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Layaway", layaway.id));
    }
    Ok(())
}

// =============================================================================
// LayawayUpdate
// =============================================================================

/// A layaway held under the write lock, plus the writes that belong with
/// its change.
#[derive(Debug)]
pub struct LayawayUpdate {
    tx: Transaction<'static, Sqlite>,
    layaway: Layaway,
}

impl LayawayUpdate {
    /// The copy read under the lock.
    pub fn layaway(&self) -> &Layaway {
        &self.layaway
    }

    pub fn layaway_mut(&mut self) -> &mut Layaway {
        &mut self.layaway
    }

    /// Inserts the installment's synthetic sale in this transaction.
    pub async fn record_sale(&mut self, sale: &NewSale) -> DbResult<Sale> {
        insert_sale(&mut *self.tx, sale).await
    }

    /// A kardex movement in this transaction, under its own savepoint.
    ///
    /// A failed adjustment writes nothing, and the update can still be
    /// committed without it.
    pub async fn adjust_stock(&mut self, adj: &StockAdjustment) -> DbResult<(Product, StockMovement)> {
        let mut savepoint = Connection::begin(&mut *self.tx).await?;
        let adjusted = adjust_on(&mut *savepoint, adj).await?;
        savepoint.commit().await?;
        Ok(adjusted)
    }

    /// Saves the layaway and commits everything staged with it.
    pub async fn commit(mut self) -> DbResult<Layaway> {
        save_on(&mut *self.tx, &self.layaway).await?;
        self.tx.commit().await?;
        debug!(
            layaway_id = self.layaway.id,
            status = %self.layaway.status,
            balance_cents = self.layaway.balance_cents,
            "Layaway update committed"
        );
        Ok(self.layaway)
    }
}
