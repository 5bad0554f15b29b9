//! Pieces shared by the results of till operations.

use serde::Serialize;

use kicks_core::{SaleItem, SyncEntity};
use kicks_sync::{SyncEngine, SyncError};

use crate::error::PosError;

/// What happened to the immediate upload of a freshly written record.
///
/// The local write has already succeeded either way; `Pending` only tells
/// the operator that the next sync cycle will do the upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RemoteMirror {
    Confirmed { remote_id: i64 },
    Pending { reason: String },
}

impl RemoteMirror {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, RemoteMirror::Confirmed { .. })
    }

    /// Uploads one record through the engine and folds the result.
    pub(crate) async fn push(engine: &SyncEngine, entity: SyncEntity, local_id: i64) -> Self {
        match engine.push_now(entity, local_id).await {
            Ok(remote_id) => RemoteMirror::Confirmed { remote_id },
            Err(e) => {
                if !matches!(e, SyncError::NotConfigured) {
                    tracing::warn!(entity = %entity, local_id, error = %e, "Immediate upload failed, left for next cycle");
                }
                RemoteMirror::Pending { reason: e.to_string() }
            }
        }
    }
}

/// A line whose stock could not be adjusted. The financial record it belongs
/// to is kept regardless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockFailure {
    pub product_id: i64,
    pub product_name: String,
    pub reason: String,
}

impl StockFailure {
    pub(crate) fn new(item: &SaleItem, err: &PosError) -> Self {
        StockFailure {
            product_id: item.product_id,
            product_name: item.name.clone(),
            reason: err.to_string(),
        }
    }
}
