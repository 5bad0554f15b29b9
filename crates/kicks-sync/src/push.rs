//! # Push
//!
//! Uploads every local record still marked `synced = false`.
//!
//! ```text
//!  for each unsynced record:
//!
//!    remote_ids.remote_for(local) ──► Some(rid) ──► exists(rid)? ──► yes ──► update(rid)
//!           │                                            │
//!           ▼ None                                       ▼ no (deleted remotely)
//!    insert() ──► remote assigns rid ──► remote_ids.link(local, rid)
//!                                                        │
//!                                                        ▼
//!                                              mark_synced(local, version)
//! ```
//!
//! A failed record stays `synced = false` and is reported; the next cycle
//! tries it again. Nothing here retries within a cycle.
//!
//! `version` is the row's edit counter as read before the upload. A local
//! write that lands while the remote call is in flight bumps it, the mark
//! matches nothing and the record goes out again on the next cycle.

use tracing::{debug, info};

use kicks_core::{Expense, Product, Sale, SyncEntity};
use kicks_db::{Database, Versioned};

use crate::error::{SyncError, SyncResult};
use crate::mapping::{expense_to_remote, product_to_remote, sale_to_remote};
use crate::remote::RemoteStore;
use crate::report::{CycleReport, SyncFailure, SyncStage};
use crate::rows::{insert_row, update_row, RemoteRow};

/// Pushes all unsynced products, sales and expenses.
pub async fn push_all(db: &Database, remote: &dyn RemoteStore, report: &mut CycleReport) -> SyncResult<()> {
    // Products first so a sale's line items refer to rows that exist remotely.
    for product in db.products().list_unsynced().await? {
        record(report, SyncEntity::Product, product.record.id, push_product(db, remote, &product).await);
    }
    for sale in db.sales().list_unsynced().await? {
        record(report, SyncEntity::Sale, sale.record.id, push_sale(db, remote, &sale).await);
    }
    for expense in db.expenses().list_unsynced().await? {
        record(report, SyncEntity::Expense, expense.record.id, push_expense(db, remote, &expense).await);
    }

    if report.total_pushed() > 0 {
        info!(
            sales = report.sales.pushed,
            products = report.products.pushed,
            expenses = report.expenses.pushed,
            "Pushed local changes"
        );
    }
    Ok(())
}

fn record(report: &mut CycleReport, entity: SyncEntity, local_id: i64, result: SyncResult<i64>) {
    match result {
        Ok(_) => report.counts_mut(entity).pushed += 1,
        Err(e) => report.fail(SyncFailure::new(entity, SyncStage::Push, &e).local(local_id)),
    }
}

/// Pushes one sale and marks it synced unless it changed during the upload.
/// Returns the remote id.
pub async fn push_sale(db: &Database, remote: &dyn RemoteStore, sale: &Versioned<Sale>) -> SyncResult<i64> {
    let id = sale.record.id;
    let remote_id = upsert(db, remote, id, &sale_to_remote(&sale.record)?).await?;
    let marked = db.sales().mark_synced(id, sale.version).await?;
    confirmed(SyncEntity::Sale, id, marked);
    Ok(remote_id)
}

pub async fn push_product(db: &Database, remote: &dyn RemoteStore, product: &Versioned<Product>) -> SyncResult<i64> {
    let id = product.record.id;
    let remote_id = upsert(db, remote, id, &product_to_remote(&product.record)).await?;
    let marked = db.products().mark_synced(id, product.version).await?;
    confirmed(SyncEntity::Product, id, marked);
    Ok(remote_id)
}

pub async fn push_expense(db: &Database, remote: &dyn RemoteStore, expense: &Versioned<Expense>) -> SyncResult<i64> {
    let id = expense.record.id;
    let remote_id = upsert(db, remote, id, &expense_to_remote(&expense.record)).await?;
    let marked = db.expenses().mark_synced(id, expense.version).await?;
    confirmed(SyncEntity::Expense, id, marked);
    Ok(remote_id)
}

fn confirmed(entity: SyncEntity, local_id: i64, marked: bool) {
    if !marked {
        debug!(entity = %entity, local_id, "Edited during upload, left pending");
    }
}

/// Pushes one record by local id, whatever its `synced` flag.
pub async fn push_record(
    db: &Database,
    remote: &dyn RemoteStore,
    entity: SyncEntity,
    local_id: i64,
) -> SyncResult<i64> {
    match entity {
        SyncEntity::Sale => push_sale(db, remote, &db.sales().require_versioned(local_id).await?).await,
        SyncEntity::Product => push_product(db, remote, &db.products().require_versioned(local_id).await?).await,
        SyncEntity::Expense => push_expense(db, remote, &db.expenses().require_versioned(local_id).await?).await,
    }
}

/// Update when the mapped remote row still exists, insert otherwise.
async fn upsert<R: RemoteRow>(db: &Database, remote: &dyn RemoteStore, local_id: i64, row: &R) -> SyncResult<i64> {
    let entity = R::ENTITY;

    if let Some(remote_id) = db.remote_ids().remote_for(entity, local_id).await? {
        if remote.exists(entity, remote_id).await? {
            update_row(remote, remote_id, row).await?;
            debug!(entity = %entity, local_id, remote_id, "Updated remote row");
            return Ok(remote_id);
        }
        debug!(entity = %entity, local_id, remote_id, "Mapped remote row is gone, inserting again");
    }

    let stored = insert_row(remote, row).await?;
    let remote_id = stored
        .remote_id()
        .ok_or_else(|| SyncError::Mapping(format!("{} insert returned no id", entity.table())))?;
    db.remote_ids().link(entity, local_id, remote_id).await?;
    debug!(entity = %entity, local_id, remote_id, "Inserted remote row");
    Ok(remote_id)
}
