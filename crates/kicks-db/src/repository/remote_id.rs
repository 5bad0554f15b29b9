//! # Remote Id Repository
//!
//! The remote store assigns its own ids, so a record's local id and remote
//! id can differ forever. This table is the only place that knows both.
//!
//! ```text
//!  entity    local_id   remote_id
//!  ───────   ────────   ─────────
//!  sale          10        4821      ← pushed from this till
//!  sale          11        4790      ← pulled from another till
//!  product        3          3
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use kicks_core::SyncEntity;

#[derive(Debug, Clone)]
pub struct RemoteIdRepository {
    pool: SqlitePool,
}

impl RemoteIdRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RemoteIdRepository { pool }
    }

    pub async fn remote_for(&self, entity: SyncEntity, local_id: i64) -> DbResult<Option<i64>> {
        let id = sqlx::query_scalar("SELECT remote_id FROM remote_ids WHERE entity = ?1 AND local_id = ?2")
            .bind(entity.as_str())
            .bind(local_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn local_for(&self, entity: SyncEntity, remote_id: i64) -> DbResult<Option<i64>> {
        local_for(&mut *self.pool.acquire().await?, entity, remote_id).await
    }

    /// Records (or re-points) the correspondence.
    pub async fn link(&self, entity: SyncEntity, local_id: i64, remote_id: i64) -> DbResult<()> {
        link(&mut *self.pool.acquire().await?, entity, local_id, remote_id).await
    }

    /// Forgets the mapping for a local record.
    pub async fn unlink_local(&self, entity: SyncEntity, local_id: i64) -> DbResult<()> {
        unlink_local(&mut *self.pool.acquire().await?, entity, local_id).await
    }

    /// Forgets the mapping for a remote record; returns the local id it
    /// pointed at.
    pub async fn unlink_remote(&self, entity: SyncEntity, remote_id: i64) -> DbResult<Option<i64>> {
        let local: Option<i64> = sqlx::query_scalar(
            "DELETE FROM remote_ids WHERE entity = ?1 AND remote_id = ?2 RETURNING local_id",
        )
        .bind(entity.as_str())
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(local)
    }

    /// Every `(local_id, remote_id)` pair for an entity.
    pub async fn all(&self, entity: SyncEntity) -> DbResult<Vec<(i64, i64)>> {
        let rows = sqlx::query_as(
            "SELECT local_id, remote_id FROM remote_ids WHERE entity = ?1 ORDER BY local_id",
        )
        .bind(entity.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

pub(crate) async fn local_for(
    conn: &mut SqliteConnection,
    entity: SyncEntity,
    remote_id: i64,
) -> DbResult<Option<i64>> {
    let id = sqlx::query_scalar("SELECT local_id FROM remote_ids WHERE entity = ?1 AND remote_id = ?2")
        .bind(entity.as_str())
        .bind(remote_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

pub(crate) async fn unlink_local(conn: &mut SqliteConnection, entity: SyncEntity, local_id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM remote_ids WHERE entity = ?1 AND local_id = ?2")
        .bind(entity.as_str())
        .bind(local_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Both directions stay unique: any stale row pointing at either id is
/// replaced.
pub(crate) async fn link(
    conn: &mut SqliteConnection,
    entity: SyncEntity,
    local_id: i64,
    remote_id: i64,
) -> DbResult<()> {
    debug!(entity = %entity, local_id, remote_id, "Linking remote id");

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO remote_ids (entity, local_id, remote_id, linked_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(entity.as_str())
    .bind(local_id)
    .bind(remote_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::db;

    #[tokio::test]
    async fn test_link_both_directions() {
        let db = db().await;
        let ids = db.remote_ids();

        ids.link(SyncEntity::Sale, 10, 4821).await.unwrap();
        assert_eq!(ids.remote_for(SyncEntity::Sale, 10).await.unwrap(), Some(4821));
        assert_eq!(ids.local_for(SyncEntity::Sale, 4821).await.unwrap(), Some(10));
        // Entities are separate namespaces
        assert_eq!(ids.remote_for(SyncEntity::Product, 10).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_relink_replaces_stale_rows() {
        let db = db().await;
        let ids = db.remote_ids();

        ids.link(SyncEntity::Product, 1, 100).await.unwrap();
        ids.link(SyncEntity::Product, 2, 100).await.unwrap();
        assert_eq!(ids.local_for(SyncEntity::Product, 100).await.unwrap(), Some(2));
        assert_eq!(ids.remote_for(SyncEntity::Product, 1).await.unwrap(), None);

        ids.link(SyncEntity::Product, 2, 200).await.unwrap();
        assert_eq!(ids.all(SyncEntity::Product).await.unwrap(), vec![(2, 200)]);

        ids.unlink_local(SyncEntity::Product, 2).await.unwrap();
        assert!(ids.all(SyncEntity::Product).await.unwrap().is_empty());

        ids.link(SyncEntity::Product, 3, 300).await.unwrap();
        assert_eq!(ids.unlink_remote(SyncEntity::Product, 300).await.unwrap(), Some(3));
        assert_eq!(ids.unlink_remote(SyncEntity::Product, 300).await.unwrap(), None);
    }
}
