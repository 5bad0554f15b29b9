//! # Pull
//!
//! Brings remote rows into the local store through the merge rule.
//!
//! ```text
//!  Full   (startup, manual, settings change)
//!    fetch_page(0, N) ─► batch ─► commit ─► fetch_page(N, N) ─► ... until a short page
//!
//!  Recent (timer, focus, visibility)
//!    fetch_recent(W) ─► batch ─► commit
//! ```
//!
//! Each fetched page is applied inside its own [`kicks_db::PullBatch`]. A row
//! that fails to decode is reported and skipped; the rest of its page is
//! still applied.

use serde_json::Value;
use tracing::{debug, info};

use kicks_core::SyncEntity;
use kicks_db::Database;

use crate::apply::{apply_row, Applied};
use crate::config::SyncSettings;
use crate::error::SyncResult;
use crate::remote::RemoteStore;
use crate::report::{CycleReport, PullMode, SyncFailure, SyncStage};
use crate::rows::row_id;

/// Pulls every mirrored table.
///
/// A table whose fetch fails is reported and skipped; the others still run.
pub async fn pull_all(
    db: &Database,
    remote: &dyn RemoteStore,
    mode: PullMode,
    settings: &SyncSettings,
    report: &mut CycleReport,
) -> SyncResult<()> {
    for entity in SyncEntity::ALL {
        if let Err(e) = pull_entity(db, remote, entity, mode, settings, report).await {
            report.fail(SyncFailure::new(entity, SyncStage::Pull, &e));
        }
    }

    if report.total_pulled() > 0 {
        info!(
            mode = ?mode,
            sales = report.sales.pulled,
            products = report.products.pulled,
            expenses = report.expenses.pulled,
            "Pulled remote changes"
        );
    }
    Ok(())
}

async fn pull_entity(
    db: &Database,
    remote: &dyn RemoteStore,
    entity: SyncEntity,
    mode: PullMode,
    settings: &SyncSettings,
    report: &mut CycleReport,
) -> SyncResult<()> {
    match mode {
        PullMode::Recent => {
            let rows = remote.fetch_recent(entity, settings.recent_window).await?;
            apply_page(db, entity, &rows, report).await
        }
        PullMode::Full => {
            let page_size = settings.page_size.max(1);
            let mut offset = 0;
            loop {
                let rows = remote.fetch_page(entity, offset, page_size).await?;
                apply_page(db, entity, &rows, report).await?;
                if rows.len() < page_size {
                    return Ok(());
                }
                offset += rows.len();
            }
        }
    }
}

/// Applies one fetched page in a single local transaction.
pub async fn apply_page(db: &Database, entity: SyncEntity, rows: &[Value], report: &mut CycleReport) -> SyncResult<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let mut batch = db.begin_pull().await?;
    for raw in rows {
        match apply_row(&mut batch, entity, raw).await {
            Ok(Applied::Written(_)) => report.counts_mut(entity).pulled += 1,
            Ok(Applied::Kept) => report.counts_mut(entity).kept_local += 1,
            Err(e) => report.fail(SyncFailure::new(entity, SyncStage::Pull, &e).remote(row_id(raw))),
        }
    }
    let applied = batch.commit().await?;
    debug!(entity = %entity, rows = rows.len(), applied, "Applied remote page");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;
    use crate::report::SyncTrigger;
    use kicks_db::DbConfig;
    use serde_json::json;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn sale_row(total: f64, refunded: bool) -> Value {
        json!({
            "timestamp": "2024-06-01T12:30:00.000Z",
            "total": total,
            "shipping_cost": 0.0,
            "salesperson_name": "Marta",
            "payment_method": "cash",
            "items": [{ "product_id": 1, "name": "Old Skool 40", "price": total, "quantity": 1 }],
            "refunded": refunded
        })
    }

    #[tokio::test]
    async fn test_full_pull_walks_pages() {
        let db = db().await;
        let remote = MemoryRemote::new();
        for id in 1..=5 {
            remote.seed(SyncEntity::Sale, id, sale_row(50.0 + id as f64, false));
        }
        let settings = SyncSettings {
            page_size: 2,
            ..SyncSettings::default()
        };

        let mut report = CycleReport::new(SyncTrigger::Startup);
        pull_all(&db, &remote, PullMode::Full, &settings, &mut report).await.unwrap();

        assert_eq!(report.sales.pulled, 5);
        assert_eq!(db.sales().count().await.unwrap(), 5);
        assert_eq!(db.remote_ids().all(SyncEntity::Sale).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_same_payload_twice_is_idempotent() {
        let db = db().await;
        let remote = MemoryRemote::new();
        remote.seed(SyncEntity::Sale, 7, sale_row(80.0, false));
        remote.seed(SyncEntity::Product, 3, json!({ "name": "Chuck 70", "price": 85.0, "stock": 6 }));
        let settings = SyncSettings::default();

        let mut first = CycleReport::new(SyncTrigger::Timer);
        pull_all(&db, &remote, PullMode::Recent, &settings, &mut first).await.unwrap();
        let sales_after_first = db.sales().list_all().await.unwrap();
        let products_after_first = db.products().list().await.unwrap();

        let mut second = CycleReport::new(SyncTrigger::Timer);
        pull_all(&db, &remote, PullMode::Recent, &settings, &mut second).await.unwrap();

        assert_eq!(db.sales().list_all().await.unwrap(), sales_after_first);
        assert_eq!(db.products().list().await.unwrap(), products_after_first);
    }

    #[tokio::test]
    async fn test_unsynced_sale_kept_until_remote_refund() {
        let db = db().await;
        let remote = MemoryRemote::new();
        remote.seed(SyncEntity::Sale, 10, sale_row(100.0, false));
        let settings = SyncSettings::default();

        let mut report = CycleReport::new(SyncTrigger::Startup);
        pull_all(&db, &remote, PullMode::Full, &settings, &mut report).await.unwrap();
        let local_id = db.remote_ids().local_for(SyncEntity::Sale, 10).await.unwrap().unwrap();

        // A local refund is pending upload
        db.sales().mark_refunded(local_id).await.unwrap();
        let mut pending = db.sales().require(local_id).await.unwrap();
        assert!(!pending.synced);

        // Another till changed the total, not refunded: local copy wins
        remote.seed(SyncEntity::Sale, 10, sale_row(120.0, false));
        let mut report = CycleReport::new(SyncTrigger::Timer);
        pull_all(&db, &remote, PullMode::Recent, &settings, &mut report).await.unwrap();
        assert_eq!(report.sales.kept_local, 1);
        assert_eq!(db.sales().require(local_id).await.unwrap(), pending);

        // Refunded remotely: applied over the pending edit
        remote.seed(SyncEntity::Sale, 10, sale_row(120.0, true));
        let mut report = CycleReport::new(SyncTrigger::Timer);
        pull_all(&db, &remote, PullMode::Recent, &settings, &mut report).await.unwrap();
        pending = db.sales().require(local_id).await.unwrap();
        assert_eq!(pending.total_cents, 12000);
        assert!(pending.refunded);
        assert!(pending.synced);
    }

    #[tokio::test]
    async fn test_bad_row_does_not_block_page() {
        let db = db().await;
        let remote = MemoryRemote::new();
        remote.seed(SyncEntity::Expense, 1, json!({ "amount": "lots", "timestamp": "2024-06-01T00:00:00Z" }));
        remote.seed(SyncEntity::Expense, 2, json!({ "amount": 9.5, "description": "Tape", "timestamp": "2024-06-01T00:00:00Z" }));

        let mut report = CycleReport::new(SyncTrigger::Manual);
        pull_all(&db, &remote, PullMode::Full, &SyncSettings::default(), &mut report)
            .await
            .unwrap();

        assert_eq!(report.expenses.pulled, 1);
        assert_eq!(report.expenses.failed, 1);
        assert_eq!(report.failures[0].remote_id, Some(1));
        assert_eq!(db.expenses().list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_offline_remote_reports_each_table() {
        let db = db().await;
        let remote = MemoryRemote::new();
        remote.set_offline(true);

        let mut report = CycleReport::new(SyncTrigger::Timer);
        pull_all(&db, &remote, PullMode::Recent, &SyncSettings::default(), &mut report)
            .await
            .unwrap();
        assert_eq!(report.failures.len(), 3);
        assert!(report.failures.iter().all(|f| f.stage == SyncStage::Pull && f.retryable));
    }
}
