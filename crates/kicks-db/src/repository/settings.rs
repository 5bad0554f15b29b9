//! # Settings Repository
//!
//! Key/value pairs edited from the admin dashboard (remote endpoint and key,
//! device preferences). Keys live in [`keys`].

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::DbResult;

/// Well-known setting keys.
pub mod keys {
    /// Base URL of the remote store.
    pub const REMOTE_URL: &str = "remote_url";
    /// Access key sent with every remote request.
    pub const REMOTE_KEY: &str = "remote_key";
    /// Overrides the sync timer period, in seconds.
    pub const SYNC_INTERVAL_SECS: &str = "sync_interval_secs";
}

#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    /// Insert or overwrite.
    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Every setting, sorted by key.
    pub async fn all(&self) -> DbResult<Vec<(String, String)>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM settings ORDER BY key")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::db;

    #[tokio::test]
    async fn test_set_overwrites() {
        let db = db().await;
        let settings = db.settings();
        assert!(settings.get(keys::REMOTE_URL).await.unwrap().is_none());

        settings.set(keys::REMOTE_URL, "https://a.example.co").await.unwrap();
        settings.set(keys::REMOTE_URL, "https://b.example.co").await.unwrap();
        assert_eq!(
            settings.get(keys::REMOTE_URL).await.unwrap().as_deref(),
            Some("https://b.example.co")
        );
        assert_eq!(settings.all().await.unwrap().len(), 1);

        settings.remove(keys::REMOTE_URL).await.unwrap();
        assert!(settings.get(keys::REMOTE_URL).await.unwrap().is_none());
    }
}
