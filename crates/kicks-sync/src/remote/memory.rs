//! # In-Memory Remote
//!
//! A [`RemoteStore`] held in process memory. Behaves like the hosted store
//! for the operations the engine uses (ids assigned on insert, patches merge
//! into the row) and can be switched into failure mode to simulate an
//! unreachable network.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use kicks_core::SyncEntity;

use super::RemoteStore;
use crate::error::{SyncError, SyncResult};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<i64, Value>,
    next_id: i64,
}

/// Shared in-process remote store.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    tables: Mutex<HashMap<SyncEntity, Table>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of calls made so far (including failed ones).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Stores a row under an explicit id, as another till would have.
    pub fn seed(&self, entity: SyncEntity, id: i64, row: Value) {
        let mut tables = self.lock();
        let table = tables.entry(entity).or_default();
        table.rows.insert(id, with_id(row, id));
        table.next_id = table.next_id.max(id);
    }

    /// Row `id` as currently stored.
    pub fn row(&self, entity: SyncEntity, id: i64) -> Option<Value> {
        self.lock().get(&entity).and_then(|t| t.rows.get(&id).cloned())
    }

    /// All rows of a table, ordered by id.
    pub fn rows(&self, entity: SyncEntity) -> Vec<Value> {
        self.lock()
            .get(&entity)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SyncEntity, Table>> {
        // A poisoned lock only means a test panicked mid-call; the map itself
        // is still usable.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self) -> SyncResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Http("memory remote is offline".into()));
        }
        Ok(())
    }
}

fn with_id(row: Value, id: i64) -> Value {
    let mut obj = match row {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    obj.insert("id".to_string(), Value::from(id));
    Value::Object(obj)
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    fn label(&self) -> String {
        "memory".to_string()
    }

    async fn fetch_page(&self, entity: SyncEntity, offset: usize, limit: usize) -> SyncResult<Vec<Value>> {
        self.enter()?;
        Ok(self
            .lock()
            .get(&entity)
            .map(|t| t.rows.values().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_recent(&self, entity: SyncEntity, limit: usize) -> SyncResult<Vec<Value>> {
        self.enter()?;
        Ok(self
            .lock()
            .get(&entity)
            .map(|t| t.rows.values().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn exists(&self, entity: SyncEntity, id: i64) -> SyncResult<bool> {
        self.enter()?;
        Ok(self.lock().get(&entity).is_some_and(|t| t.rows.contains_key(&id)))
    }

    async fn insert(&self, entity: SyncEntity, row: &Value) -> SyncResult<Value> {
        self.enter()?;
        let mut tables = self.lock();
        let table = tables.entry(entity).or_default();
        table.next_id += 1;
        let id = table.next_id;
        let stored = with_id(row.clone(), id);
        table.rows.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, entity: SyncEntity, id: i64, patch: &Value) -> SyncResult<()> {
        self.enter()?;
        let mut tables = self.lock();
        let existing = tables
            .get_mut(&entity)
            .and_then(|t| t.rows.get_mut(&id))
            .ok_or_else(|| SyncError::RemoteNotFound {
                table: entity.table().to_string(),
                id,
            })?;

        if let (Some(target), Some(changes)) = (existing.as_object_mut(), patch.as_object()) {
            for (column, value) in changes {
                if column != "id" {
                    target.insert(column.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, entity: SyncEntity, id: i64) -> SyncResult<bool> {
        self.enter()?;
        Ok(self
            .lock()
            .get_mut(&entity)
            .is_some_and(|t| t.rows.remove(&id).is_some()))
    }
}
