//! # Expense Repository

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use super::Versioned;
use crate::error::{DbError, DbResult};
use kicks_core::Expense;

pub(crate) const EXPENSE_COLUMNS: &str =
    "id, timestamp, amount_cents, description, salesperson_id, synced, version";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ExpenseRow {
    id: i64,
    timestamp: DateTime<Utc>,
    amount_cents: i64,
    description: String,
    salesperson_id: Option<i64>,
    synced: bool,
    version: i64,
}

impl From<ExpenseRow> for Versioned<Expense> {
    fn from(row: ExpenseRow) -> Self {
        let version = row.version;
        Versioned {
            record: row.into(),
            version,
        }
    }
}

impl From<ExpenseRow> for Expense {
    fn from(row: ExpenseRow) -> Self {
        Expense {
            id: row.id,
            timestamp: row.timestamp,
            amount_cents: row.amount_cents,
            description: row.description,
            salesperson_id: row.salesperson_id,
            synced: row.synced,
        }
    }
}

/// Repository for expense operations.
#[derive(Debug, Clone)]
pub struct ExpenseRepository {
    pool: SqlitePool,
}

impl ExpenseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ExpenseRepository { pool }
    }

    /// Records an expense locally, unsynced.
    pub async fn insert(
        &self,
        timestamp: DateTime<Utc>,
        amount_cents: i64,
        description: &str,
        salesperson_id: Option<i64>,
    ) -> DbResult<Expense> {
        debug!(amount_cents, "Inserting expense");

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO expenses (timestamp, amount_cents, description, salesperson_id, synced)
            VALUES (?1, ?2, ?3, ?4, 0)
            RETURNING id
            "#,
        )
        .bind(timestamp)
        .bind(amount_cents)
        .bind(description)
        .bind(salesperson_id)
        .fetch_one(&self.pool)
        .await?;

        self.require(id).await
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Expense>> {
        let sql = format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?1");
        let row = sqlx::query_as::<_, ExpenseRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Expense::from))
    }

    pub async fn require(&self, id: i64) -> DbResult<Expense> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Expense", id))
    }

    /// Every expense, oldest first.
    pub async fn list_all(&self) -> DbResult<Vec<Expense>> {
        let sql = format!("SELECT {EXPENSE_COLUMNS} FROM expenses ORDER BY timestamp, id");
        let rows = sqlx::query_as::<_, ExpenseRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Expense::from).collect())
    }

    /// Expenses in `[from, to)`, oldest first.
    pub async fn list_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<Expense>> {
        let sql = format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE timestamp >= ?1 AND timestamp < ?2 ORDER BY timestamp, id"
        );
        let rows = sqlx::query_as::<_, ExpenseRow>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Expense::from).collect())
    }

    pub async fn list_unsynced(&self) -> DbResult<Vec<Versioned<Expense>>> {
        let sql = format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE synced = 0 ORDER BY id");
        let rows = sqlx::query_as::<_, ExpenseRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Versioned::from).collect())
    }

    pub async fn count_unsynced(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM expenses WHERE synced = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn require_versioned(&self, id: i64) -> DbResult<Versioned<Expense>> {
        let sql = format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?1");
        sqlx::query_as::<_, ExpenseRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Versioned::from)
            .ok_or_else(|| DbError::not_found("Expense", id))
    }

    /// Every expense with its version, oldest first. Used by force push.
    pub async fn list_versioned(&self) -> DbResult<Vec<Versioned<Expense>>> {
        let sql = format!("SELECT {EXPENSE_COLUMNS} FROM expenses ORDER BY timestamp, id");
        let rows = sqlx::query_as::<_, ExpenseRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Versioned::from).collect())
    }

    /// Flags the expense synced if it is still at `version`.
    pub async fn mark_synced(&self, id: i64, version: i64) -> DbResult<bool> {
        let result = sqlx::query("UPDATE expenses SET synced = 1 WHERE id = ?1 AND version = ?2")
            .bind(id)
            .bind(version)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::db;

    #[tokio::test]
    async fn test_expense_sync_flag() {
        let db = db().await;
        let e = db
            .expenses()
            .insert(Utc::now(), 2500, "Shoe cleaner", Some(1))
            .await
            .unwrap();
        assert!(!e.synced);
        assert_eq!(e.description, "Shoe cleaner");

        assert_eq!(db.expenses().count_unsynced().await.unwrap(), 1);
        assert!(db.expenses().mark_synced(e.id, 0).await.unwrap());
        assert!(db.expenses().list_unsynced().await.unwrap().is_empty());
        assert_eq!(db.expenses().count_unsynced().await.unwrap(), 0);
        assert_eq!(db.expenses().list_all().await.unwrap().len(), 1);
    }
}
