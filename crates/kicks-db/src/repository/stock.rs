//! # Stock Repository (Kardex)
//!
//! The only writer of `products.stock` for till-originated changes.
//!
//! ## One Adjustment, One Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    UPDATE products SET synced = 0 WHERE id = ?     ← takes write lock   │
//! │    SELECT stock FROM products WHERE id = ?         ← previous_stock     │
//! │    new = max(0, previous + delta)                                       │
//! │    UPDATE products SET stock = new WHERE id = ?                         │
//! │    INSERT INTO stock_movements (.., quantity=delta, previous, new, ..)  │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Either both the counter and the kardex entry land, or neither does.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ledger order is append order (`id`), so a replay over
//! [`StockRepository::movements_for`] reproduces the shelf count even if
//! the wall clock jumps backwards between two movements.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use super::product::{ProductRow, PRODUCT_COLUMNS};
use crate::error::{DbError, DbResult};
use kicks_core::ledger::StockChange;
use kicks_core::{Actor, MovementType, NewProduct, Product, StockMovement};

const MOVEMENT_COLUMNS: &str = "id, product_id, product_name, movement_type, quantity, \
     previous_stock, new_stock, timestamp, user_id, user_name, note, reference_id";

#[derive(Debug, sqlx::FromRow)]
struct MovementRow {
    id: i64,
    product_id: i64,
    product_name: String,
    movement_type: MovementType,
    quantity: i64,
    previous_stock: i64,
    new_stock: i64,
    timestamp: DateTime<Utc>,
    user_id: Option<i64>,
    user_name: String,
    note: Option<String>,
    reference_id: Option<String>,
}

impl From<MovementRow> for StockMovement {
    fn from(row: MovementRow) -> Self {
        StockMovement {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            movement_type: row.movement_type,
            quantity: row.quantity,
            previous_stock: row.previous_stock,
            new_stock: row.new_stock,
            timestamp: row.timestamp,
            user_id: row.user_id,
            user_name: row.user_name,
            note: row.note,
            reference_id: row.reference_id,
        }
    }
}

/// A requested stock change.
#[derive(Debug, Clone)]
pub struct StockAdjustment {
    pub product_id: i64,
    /// Signed delta; negative for sales and layaway reservations.
    pub delta: i64,
    pub movement_type: MovementType,
    pub actor: Actor,
    pub note: Option<String>,
    pub reference_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StockAdjustment {
    pub fn new(product_id: i64, delta: i64, movement_type: MovementType, actor: Actor) -> Self {
        StockAdjustment {
            product_id,
            delta,
            movement_type,
            actor,
            note: None,
            reference_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn reference(mut self, reference_id: impl ToString) -> Self {
        self.reference_id = Some(reference_id.to_string());
        self
    }
}

/// Repository for the kardex.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Applies a stock change and appends its kardex entry atomically.
    ///
    /// The product is left `synced = 0` so the next sync cycle re-verifies
    /// it against the remote store.
    ///
    /// ## Errors
    /// `NotFound` when the product does not exist locally; nothing is
    /// written in that case.
    pub async fn adjust(&self, adj: &StockAdjustment) -> DbResult<(Product, StockMovement)> {
        let mut tx = self.pool.begin().await?;
        let adjusted = adjust_on(&mut *tx, adj).await?;
        tx.commit().await?;
        Ok(adjusted)
    }

    /// Creates a product and, when it starts with stock, its `initial`
    /// kardex entry in the same transaction.
    pub async fn create_product(
        &self,
        new: &NewProduct,
        actor: &Actor,
    ) -> DbResult<(Product, Option<StockMovement>)> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO products (name, price_cents, category, brand, size, image, stock, synced)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0)
            RETURNING id
            "#,
        )
        .bind(&new.name)
        .bind(new.price_cents)
        .bind(&new.category)
        .bind(&new.brand)
        .bind(&new.size)
        .bind(&new.image)
        .fetch_one(&mut *tx)
        .await?;

        let mut movement = None;
        if new.stock > 0 {
            let adj = StockAdjustment::new(id, new.stock, MovementType::Initial, actor.clone())
                .note("Opening stock");
            let change = StockChange::compute(0, new.stock);
            sqlx::query("UPDATE products SET stock = ?2 WHERE id = ?1")
                .bind(id)
                .bind(change.new_stock)
                .execute(&mut *tx)
                .await?;
            movement = Some(insert_movement(&mut *tx, &new.name, &adj, change).await?);
        }

        tx.commit().await?;

        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let product: Product = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?
            .into();

        Ok((product, movement))
    }

    /// Kardex for a product, newest first.
    pub async fn history(&self, product_id: i64) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE product_id = ?1 ORDER BY id DESC"
        );
        let rows = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(StockMovement::from).collect())
    }

    /// Kardex for a product in ledger (replay) order.
    pub async fn movements_for(&self, product_id: i64) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE product_id = ?1 ORDER BY id"
        );
        let rows = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(StockMovement::from).collect())
    }
}

/// The body of [`StockRepository::adjust`], for callers that already hold
/// a transaction (layaway cancel).
pub(crate) async fn adjust_on(conn: &mut SqliteConnection, adj: &StockAdjustment) -> DbResult<(Product, StockMovement)> {
    let locked = sqlx::query("UPDATE products SET synced = 0 WHERE id = ?1")
        .bind(adj.product_id)
        .execute(&mut *conn)
        .await?;
    if locked.rows_affected() == 0 {
        return Err(DbError::not_found("Product", adj.product_id));
    }

    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
    let before: Product = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(adj.product_id)
        .fetch_one(&mut *conn)
        .await?
        .into();

    let change = StockChange::compute(before.stock, adj.delta);
    if change.shortfall() > 0 {
        warn!(
            product_id = before.id,
            previous = change.previous_stock,
            delta = change.delta,
            shortfall = change.shortfall(),
            "Oversell: stock clamped to zero"
        );
    }

    sqlx::query("UPDATE products SET stock = ?2 WHERE id = ?1")
        .bind(adj.product_id)
        .bind(change.new_stock)
        .execute(&mut *conn)
        .await?;

    let movement = insert_movement(&mut *conn, &before.name, adj, change).await?;

    debug!(
        product_id = adj.product_id,
        movement_type = %adj.movement_type,
        previous = change.previous_stock,
        new = change.new_stock,
        "Stock adjusted"
    );

    let product = Product {
        stock: change.new_stock,
        synced: false,
        ..before
    };
    Ok((product, movement))
}

async fn insert_movement(
    conn: &mut SqliteConnection,
    product_name: &str,
    adj: &StockAdjustment,
    change: StockChange,
) -> DbResult<StockMovement> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO stock_movements (
            product_id, product_name, movement_type, quantity,
            previous_stock, new_stock, timestamp,
            user_id, user_name, note, reference_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        RETURNING id
        "#,
    )
    .bind(adj.product_id)
    .bind(product_name)
    .bind(adj.movement_type)
    .bind(change.delta)
    .bind(change.previous_stock)
    .bind(change.new_stock)
    .bind(adj.timestamp)
    .bind(adj.actor.id)
    .bind(&adj.actor.name)
    .bind(&adj.note)
    .bind(&adj.reference_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(StockMovement {
        id,
        product_id: adj.product_id,
        product_name: product_name.to_string(),
        movement_type: adj.movement_type,
        quantity: change.delta,
        previous_stock: change.previous_stock,
        new_stock: change.new_stock,
        timestamp: adj.timestamp,
        user_id: adj.actor.id,
        user_name: adj.actor.name.clone(),
        note: adj.note.clone(),
        reference_id: adj.reference_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db, new_product};
    use kicks_core::ledger;

    fn clerk() -> Actor {
        Actor {
            id: Some(1),
            name: "Ana".to_string(),
        }
    }

    #[tokio::test]
    async fn test_sale_within_stock() {
        let db = db().await;
        let (p, _) = db.stock().create_product(&new_product("Air Max 1", 5), &clerk()).await.unwrap();

        let (after, movement) = db
            .stock()
            .adjust(&StockAdjustment::new(p.id, -3, MovementType::Sale, clerk()).reference(10))
            .await
            .unwrap();

        assert_eq!(after.stock, 2);
        assert_eq!(movement.quantity, -3);
        assert_eq!(movement.previous_stock, 5);
        assert_eq!(movement.new_stock, 2);
        assert_eq!(movement.reference_id.as_deref(), Some("10"));

        // Opening entry + the sale
        let history = db.stock().history(p.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].movement_type, MovementType::Sale);
        assert_eq!(history[1].movement_type, MovementType::Initial);
    }

    #[tokio::test]
    async fn test_oversell_clamps_and_records_raw_delta() {
        let db = db().await;
        let (p, _) = db.stock().create_product(&new_product("Cortez", 2), &clerk()).await.unwrap();

        let (after, movement) = db
            .stock()
            .adjust(&StockAdjustment::new(p.id, -5, MovementType::Sale, clerk()))
            .await
            .unwrap();

        assert_eq!(after.stock, 0);
        assert_eq!(movement.quantity, -5);
        assert_eq!(movement.previous_stock, 2);
        assert_eq!(movement.new_stock, 0);
    }

    #[tokio::test]
    async fn test_missing_product_writes_nothing() {
        let db = db().await;
        let err = db
            .stock()
            .adjust(&StockAdjustment::new(99, -1, MovementType::Sale, clerk()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(db.stock().history(99).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_adjust_flags_product_unsynced() {
        let db = db().await;
        let (p, _) = db.stock().create_product(&new_product("Samba", 1), &clerk()).await.unwrap();
        let read = db.products().require_versioned(p.id).await.unwrap();
        assert!(db.products().mark_synced(p.id, read.version).await.unwrap());

        db.stock()
            .adjust(&StockAdjustment::new(p.id, 4, MovementType::Restock, clerk()))
            .await
            .unwrap();

        let stored = db.products().require(p.id).await.unwrap();
        assert_eq!(stored.stock, 5);
        assert!(!stored.synced);
        // The copy read before the restock no longer confirms the row
        assert!(!db.products().mark_synced(p.id, read.version).await.unwrap());
    }

    #[tokio::test]
    async fn test_replay_matches_stock() {
        let db = db().await;
        let (p, opening) = db.stock().create_product(&new_product("Jordan 4", 3), &clerk()).await.unwrap();
        assert!(opening.is_some());

        for (delta, kind) in [
            (-2, MovementType::Sale),
            (-4, MovementType::Sale),
            (6, MovementType::Restock),
            (-1, MovementType::Layaway),
            (1, MovementType::Return),
            (-10, MovementType::Adjustment),
        ] {
            db.stock()
                .adjust(&StockAdjustment::new(p.id, delta, kind, clerk()))
                .await
                .unwrap();
        }

        let stored = db.products().require(p.id).await.unwrap();
        let movements = db.stock().movements_for(p.id).await.unwrap();
        assert_eq!(ledger::replay(0, &movements), stored.stock);
        assert_eq!(ledger::audit(&movements, stored.stock), None);
        assert_eq!(stored.stock, 0);
    }

    #[tokio::test]
    async fn test_create_without_stock_has_no_movement() {
        let db = db().await;
        let (p, opening) = db.stock().create_product(&new_product("Slip-On", 0), &clerk()).await.unwrap();
        assert!(opening.is_none());
        assert_eq!(p.stock, 0);
        assert!(!p.synced);
    }
}
