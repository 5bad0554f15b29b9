//! Applies one raw remote row to the local database, inside a pull batch.
//!
//! Shared by the pull pass and the realtime channel so both follow the same
//! merge rule.

use serde_json::Value;

use kicks_core::SyncEntity;
use kicks_db::PullBatch;

use crate::error::{SyncError, SyncResult};
use crate::mapping::{expense_from_remote, product_from_remote, sale_from_remote};
use crate::merge::{merge_expense, merge_product, merge_sale, MergeOutcome};
use crate::rows::{decode_row, row_id, RemoteExpense, RemoteProduct, RemoteSale};

/// What happened to an incoming row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Written locally under this id.
    Written(i64),
    /// Local copy has pending edits and was left alone.
    Kept,
}

/// Decodes, merges and stages `raw` in `batch`.
pub async fn apply_row(batch: &mut PullBatch, entity: SyncEntity, raw: &Value) -> SyncResult<Applied> {
    let remote_id = row_id(raw)
        .ok_or_else(|| SyncError::Mapping(format!("{} row without id", entity.table())))?;

    match entity {
        SyncEntity::Sale => {
            let incoming = sale_from_remote(&decode_row::<RemoteSale>(raw)?)?;
            let local = batch.find_sale(remote_id).await?;
            match merge_sale(local.as_ref(), incoming) {
                MergeOutcome::Apply(sale) => Ok(Applied::Written(batch.put_sale(&sale, remote_id).await?)),
                MergeOutcome::Keep => Ok(Applied::Kept),
            }
        }
        SyncEntity::Product => {
            let incoming = product_from_remote(&decode_row::<RemoteProduct>(raw)?);
            let local = batch.find_product(remote_id).await?;
            match merge_product(local.as_ref(), incoming) {
                MergeOutcome::Apply(product) => {
                    Ok(Applied::Written(batch.put_product(&product, remote_id).await?))
                }
                MergeOutcome::Keep => Ok(Applied::Kept),
            }
        }
        SyncEntity::Expense => {
            let incoming = expense_from_remote(&decode_row::<RemoteExpense>(raw)?)?;
            let local = batch.find_expense(remote_id).await?;
            match merge_expense(local.as_ref(), incoming) {
                MergeOutcome::Apply(expense) => {
                    Ok(Applied::Written(batch.put_expense(&expense, remote_id).await?))
                }
                MergeOutcome::Keep => Ok(Applied::Kept),
            }
        }
    }
}
