//! # User Repository
//!
//! Till users. The PIN is unique per till, so it doubles as the login key.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use kicks_core::{User, UserRole};

const USER_COLUMNS: &str = "id, name, pin, role, last_active";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    pin: String,
    role: UserRole,
    last_active: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            pin: row.pin,
            role: row.role,
            last_active: row.last_active,
        }
    }
}

/// Repository for user operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Creates a user.
    ///
    /// ## Errors
    /// `UniqueViolation` when another user already has this PIN.
    pub async fn insert(&self, name: &str, pin: &str, role: UserRole) -> DbResult<User> {
        debug!(name = %name, role = %role, "Inserting user");

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (name, pin, role) VALUES (?1, ?2, ?3) RETURNING id",
        )
        .bind(name)
        .bind(pin)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("pin", "****"),
            other => other,
        })?;

        self.require(id).await
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    pub async fn require(&self, id: i64) -> DbResult<User> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("User", id))
    }

    pub async fn find_by_pin(&self, pin: &str) -> DbResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE pin = ?1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(pin)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    pub async fn list(&self) -> DbResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY name, id");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Stamps the user's last activity.
    pub async fn touch_last_active(&self, id: i64, at: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query("UPDATE users SET last_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", id));
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", id));
        }
        Ok(())
    }

    pub async fn count_admins(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::db;

    #[tokio::test]
    async fn test_pin_lookup_and_touch() {
        let db = db().await;
        let user = db.users().insert("Ana", "1234", UserRole::Sales).await.unwrap();
        assert!(user.last_active.is_none());

        let found = db.users().find_by_pin("1234").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(db.users().find_by_pin("9999").await.unwrap().is_none());

        db.users().touch_last_active(user.id, Utc::now()).await.unwrap();
        let touched = db.users().require(user.id).await.unwrap();
        assert!(touched.last_active.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_pin_rejected() {
        let db = db().await;
        db.users().insert("Ana", "1234", UserRole::Admin).await.unwrap();
        let err = db.users().insert("Luis", "1234", UserRole::Sales).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert_eq!(db.users().count_admins().await.unwrap(), 1);
    }
}
