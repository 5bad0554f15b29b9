//! # Force Push
//!
//! Disaster recovery: makes sure every local record exists remotely, whatever
//! its `synced` flag says. Used after the remote store was restored from an
//! old backup, or when the mapping table was lost.
//!
//! ```text
//!  for each local record:
//!
//!    mapped and remote row present ──────────────────────► present
//!    remote row with the same natural key ──► link ──────► healed
//!    otherwise ──► insert ──► link ──► mark synced ──────► pushed
//!
//!  natural keys:  sale     timestamp (ms)
//!                 product  name (trimmed, case-insensitive)
//!                 expense  timestamp (ms)
//! ```
//!
//! Remote tables are read once up front; every remote row heals at most one
//! local record.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{info, warn};

use kicks_core::SyncEntity;
use kicks_db::Database;

use crate::error::{SyncError, SyncResult};
use crate::mapping::{expense_to_remote, parse_timestamp, product_to_remote, sale_to_remote};
use crate::remote::RemoteStore;
use crate::report::{CycleReport, SyncFailure, SyncStage, SyncTrigger};
use crate::rows::{fetch_all, insert_row, row_id, RemoteRow};

/// One local record, ready to upload.
struct Candidate<R> {
    local_id: i64,
    version: i64,
    key: String,
    row: R,
}

/// Runs force push over all three tables.
pub async fn force_push(db: &Database, remote: &dyn RemoteStore, page_size: usize) -> SyncResult<CycleReport> {
    let mut report = CycleReport::new(SyncTrigger::ForcePush);
    warn!(remote = %remote.label(), "Force push started");

    let products: Vec<_> = db
        .products()
        .list_versioned()
        .await?
        .into_iter()
        .map(|p| Candidate {
            local_id: p.record.id,
            version: p.version,
            key: product_key(&p.record.name),
            row: product_to_remote(&p.record),
        })
        .collect();
    force_entity(db, remote, products, page_size, &mut report).await;

    let mut sales = Vec::new();
    for sale in db.sales().list_versioned().await? {
        let local_id = sale.record.id;
        match sale_to_remote(&sale.record) {
            Ok(row) => sales.push(Candidate {
                local_id,
                version: sale.version,
                key: timestamp_key(&sale.record.timestamp),
                row,
            }),
            Err(e) => report.fail(SyncFailure::new(SyncEntity::Sale, SyncStage::ForcePush, &e).local(local_id)),
        }
    }
    force_entity(db, remote, sales, page_size, &mut report).await;

    let expenses: Vec<_> = db
        .expenses()
        .list_versioned()
        .await?
        .into_iter()
        .map(|e| Candidate {
            local_id: e.record.id,
            version: e.version,
            key: timestamp_key(&e.record.timestamp),
            row: expense_to_remote(&e.record),
        })
        .collect();
    force_entity(db, remote, expenses, page_size, &mut report).await;

    report.finish();
    info!(
        pushed = report.total_pushed(),
        healed = report.sales.healed + report.products.healed + report.expenses.healed,
        failed = report.failures.len(),
        "Force push finished"
    );
    Ok(report)
}

async fn force_entity<R: RemoteRow>(
    db: &Database,
    remote: &dyn RemoteStore,
    candidates: Vec<Candidate<R>>,
    page_size: usize,
    report: &mut CycleReport,
) {
    let entity = R::ENTITY;

    let rows = match fetch_all(remote, entity, page_size.max(1)).await {
        Ok(rows) => rows,
        Err(e) => {
            report.fail(SyncFailure::new(entity, SyncStage::ForcePush, &e));
            return;
        }
    };
    let mappings: HashMap<i64, i64> = match db.remote_ids().all(entity).await {
        Ok(pairs) => pairs.into_iter().collect(),
        Err(e) => {
            report.fail(SyncFailure::new(entity, SyncStage::ForcePush, &e.into()));
            return;
        }
    };

    let remote_ids: HashSet<i64> = rows.iter().filter_map(row_id).collect();
    let claimed: HashSet<i64> = mappings.values().copied().filter(|id| remote_ids.contains(id)).collect();
    let mut by_key = natural_index(entity, &rows, &claimed);

    for candidate in candidates {
        let mapped = mappings.get(&candidate.local_id).copied();
        if mapped.is_some_and(|rid| remote_ids.contains(&rid)) {
            report.counts_mut(entity).present += 1;
            continue;
        }

        let healed = by_key.remove(&candidate.key);
        let result = match healed {
            Some(remote_id) => db
                .remote_ids()
                .link(entity, candidate.local_id, remote_id)
                .await
                .map(|_| true)
                .map_err(SyncError::from),
            None => insert_and_link(db, remote, &candidate).await.map(|_| false),
        };

        match result {
            Ok(true) => report.counts_mut(entity).healed += 1,
            Ok(false) => report.counts_mut(entity).pushed += 1,
            Err(e) => report.fail(
                SyncFailure::new(entity, SyncStage::ForcePush, &e)
                    .local(candidate.local_id)
                    .remote(mapped),
            ),
        }
    }
}

async fn insert_and_link<R: RemoteRow>(db: &Database, remote: &dyn RemoteStore, candidate: &Candidate<R>) -> SyncResult<i64> {
    let entity = R::ENTITY;
    let local_id = candidate.local_id;
    let stored = insert_row(remote, &candidate.row).await?;
    let remote_id = stored
        .remote_id()
        .ok_or_else(|| SyncError::Mapping(format!("{} insert returned no id", entity.table())))?;
    db.remote_ids().link(entity, local_id, remote_id).await?;
    // A record edited since it was read stays pending for the next cycle
    match entity {
        SyncEntity::Sale => db.sales().mark_synced(local_id, candidate.version).await?,
        SyncEntity::Product => db.products().mark_synced(local_id, candidate.version).await?,
        SyncEntity::Expense => db.expenses().mark_synced(local_id, candidate.version).await?,
    };
    Ok(remote_id)
}

/// Natural key -> remote id, skipping rows already mapped to a local record.
fn natural_index(entity: SyncEntity, rows: &[Value], claimed: &HashSet<i64>) -> HashMap<String, i64> {
    let mut index = HashMap::new();
    for raw in rows {
        let Some(id) = row_id(raw) else { continue };
        if claimed.contains(&id) {
            continue;
        }
        if let Some(key) = remote_key(entity, raw) {
            // Lowest id wins on duplicates
            index.entry(key).or_insert(id);
        }
    }
    index
}

fn remote_key(entity: SyncEntity, raw: &Value) -> Option<String> {
    match entity {
        SyncEntity::Product => raw.get("name").and_then(Value::as_str).map(product_key),
        SyncEntity::Sale | SyncEntity::Expense => raw
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|ts| parse_timestamp(ts).ok())
            .map(|ts| timestamp_key(&ts)),
    }
}

fn product_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn timestamp_key(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.timestamp_millis().to_string()
}
