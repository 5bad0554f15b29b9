//! # Sync Engine
//!
//! Owns the local database handle, the (swappable) remote store and the
//! single-flight guard. Every path that talks to the remote store for
//! reconciliation goes through here.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            SyncEngine                                   │
//! │                                                                         │
//! │   run_cycle(trigger) ──► guard.try_lock() ──busy──► Skipped             │
//! │                                │                                        │
//! │                                ▼ acquired                               │
//! │                      push_all ──► pull_all(mode) ──► CycleReport        │
//! │                                                           │             │
//! │                                                           ▼             │
//! │                                                     SyncObserver        │
//! │                                                                         │
//! │   push_now(entity, id)   single record, try_lock, Busy when taken       │
//! │   force_push()           all records, try_lock, Busy when taken         │
//! │   apply_change(event)    realtime, waits for the guard                  │
//! │   set_remote(..)         hot swap; caller triggers a full cycle         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A cycle triggered while another one runs is skipped, not queued; the next
//! timer tick picks up whatever it would have done.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use kicks_core::SyncEntity;
use kicks_db::Database;

use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};
use crate::force_push::force_push;
use crate::pull::pull_all;
use crate::push::{push_all, push_record};
use crate::realtime::{apply_change, ChangeApplied, ChangeEvent};
use crate::remote::RemoteStore;
use crate::report::{CycleReport, LogObserver, SyncFailure, SyncObserver, SyncStage, SyncTrigger};

/// Result of asking for a cycle.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle held the guard.
    Skipped,
    /// No remote store configured; the till runs local-only.
    NotConfigured,
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// The reconciliation engine.
pub struct SyncEngine {
    db: Database,
    remote: RwLock<Option<Arc<dyn RemoteStore>>>,
    settings: SyncSettings,
    guard: Mutex<()>,
    observer: Arc<dyn SyncObserver>,
    last_report: RwLock<Option<CycleReport>>,
    skipped: AtomicU64,
}

impl SyncEngine {
    pub fn new(db: Database, settings: SyncSettings) -> Self {
        Self::with_observer(db, settings, Arc::new(LogObserver))
    }

    pub fn with_observer(db: Database, settings: SyncSettings, observer: Arc<dyn SyncObserver>) -> Self {
        SyncEngine {
            db,
            remote: RwLock::new(None),
            settings,
            guard: Mutex::new(()),
            observer,
            last_report: RwLock::new(None),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn observer(&self) -> Arc<dyn SyncObserver> {
        self.observer.clone()
    }

    /// Swaps the remote store. `None` puts the till in local-only mode.
    pub async fn set_remote(&self, remote: Option<Arc<dyn RemoteStore>>) {
        match &remote {
            Some(r) => info!(remote = %r.label(), "Remote store configured"),
            None => info!("Remote store cleared, running local-only"),
        }
        *self.remote.write().await = remote;
    }

    pub async fn remote(&self) -> Option<Arc<dyn RemoteStore>> {
        self.remote.read().await.clone()
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    /// Number of cycles skipped because one was already running.
    pub fn skipped_cycles(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Push then pull, unless a cycle is already running.
    pub async fn run_cycle(&self, trigger: SyncTrigger) -> SyncResult<CycleOutcome> {
        let Ok(_flight) = self.guard.try_lock() else {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            self.observer.cycle_skipped(trigger);
            return Ok(CycleOutcome::Skipped);
        };
        let Some(remote) = self.remote().await else {
            debug!(trigger = %trigger, "No remote store, cycle not run");
            return Ok(CycleOutcome::NotConfigured);
        };

        debug!(trigger = %trigger, remote = %remote.label(), "Sync cycle starting");
        let mut report = CycleReport::new(trigger);
        push_all(&self.db, remote.as_ref(), &mut report).await?;
        pull_all(&self.db, remote.as_ref(), trigger.pull_mode(), &self.settings, &mut report).await?;
        report.finish();

        self.observer.cycle_finished(&report);
        *self.last_report.write().await = Some(report.clone());
        Ok(CycleOutcome::Completed(report))
    }

    /// Pushes one record right away (checkout, refund, expense).
    ///
    /// Returns the remote id. Fails with [`SyncError::Busy`] while a cycle
    /// runs; the record stays unsynced and that cycle or the next one
    /// uploads it.
    pub async fn push_now(&self, entity: SyncEntity, local_id: i64) -> SyncResult<i64> {
        let Ok(_flight) = self.guard.try_lock() else {
            return Err(SyncError::Busy);
        };
        let remote = self.remote().await.ok_or(SyncError::NotConfigured)?;
        push_record(&self.db, remote.as_ref(), entity, local_id).await
    }

    /// Disaster-recovery upload of every local record.
    pub async fn force_push(&self) -> SyncResult<CycleReport> {
        let Ok(_flight) = self.guard.try_lock() else {
            return Err(SyncError::Busy);
        };
        let remote = self.remote().await.ok_or(SyncError::NotConfigured)?;
        let report = force_push(&self.db, remote.as_ref(), self.settings.page_size).await?;
        self.observer.cycle_finished(&report);
        Ok(report)
    }

    /// Applies one realtime change. Waits for a running cycle instead of
    /// dropping the event.
    pub async fn apply_change(&self, event: &ChangeEvent) -> SyncResult<ChangeApplied> {
        let _flight = self.guard.lock().await;
        apply_change(&self.db, event).await.inspect_err(|e| {
            let failure = SyncFailure::new(event.entity, SyncStage::Realtime, e).remote(event.remote_id());
            self.observer.failure(&failure);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;
    use async_trait::async_trait;
    use chrono::Utc;
    use kicks_core::{Actor, MovementType, NewProduct, NewSale, PaymentMethod};
    use kicks_db::{DbConfig, StockAdjustment};
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        finished: StdMutex<Vec<SyncTrigger>>,
        skipped: StdMutex<Vec<SyncTrigger>>,
    }

    impl SyncObserver for Recorder {
        fn cycle_finished(&self, report: &CycleReport) {
            self.finished.lock().unwrap().push(report.trigger);
        }

        fn cycle_skipped(&self, trigger: SyncTrigger) {
            self.skipped.lock().unwrap().push(trigger);
        }
    }

    async fn engine() -> (SyncEngine, Arc<MemoryRemote>, Arc<Recorder>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let recorder = Arc::new(Recorder::default());
        let engine = SyncEngine::with_observer(db, SyncSettings::default(), recorder.clone());
        let remote = Arc::new(MemoryRemote::new());
        engine.set_remote(Some(remote.clone())).await;
        (engine, remote, recorder)
    }

    fn product(name: &str) -> NewProduct {
        NewProduct {
            name: name.into(),
            price_cents: 6000,
            category: None,
            brand: None,
            size: None,
            image: None,
            stock: 2,
        }
    }

    #[tokio::test]
    async fn test_cycle_pushes_then_pulls() {
        let (engine, remote, recorder) = engine().await;
        engine.database().products().insert(&product("Vans Era 41")).await.unwrap();
        remote.seed(SyncEntity::Product, 50, json!({ "name": "Vans Era 42", "price": 60.0, "stock": 5 }));

        let outcome = engine.run_cycle(SyncTrigger::Startup).await.unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.products.pushed, 1);
        // Our own row comes back on the pull as well as the seeded one
        assert_eq!(report.products.pulled, 2);
        assert_eq!(engine.database().products().count().await.unwrap(), 2);
        assert_eq!(*recorder.finished.lock().unwrap(), vec![SyncTrigger::Startup]);
        assert!(engine.last_report().await.is_some());
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_skipped() {
        let (engine, _remote, recorder) = engine().await;

        let held = engine.guard.lock().await;
        let outcome = engine.run_cycle(SyncTrigger::Timer).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Skipped));
        assert!(matches!(
            engine.push_now(SyncEntity::Sale, 1).await,
            Err(SyncError::Busy)
        ));
        drop(held);

        assert_eq!(engine.skipped_cycles(), 1);
        assert_eq!(*recorder.skipped.lock().unwrap(), vec![SyncTrigger::Timer]);
        assert!(matches!(
            engine.run_cycle(SyncTrigger::Timer).await.unwrap(),
            CycleOutcome::Completed(_)
        ));
    }

    #[tokio::test]
    async fn test_without_remote_nothing_runs() {
        let (engine, remote, _) = engine().await;
        engine.set_remote(None).await;
        assert!(matches!(
            engine.run_cycle(SyncTrigger::Manual).await.unwrap(),
            CycleOutcome::NotConfigured
        ));
        assert!(matches!(
            engine.push_now(SyncEntity::Product, 1).await,
            Err(SyncError::NotConfigured)
        ));
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_push_now_marks_synced() {
        let (engine, remote, _) = engine().await;
        let p = engine.database().products().insert(&product("Kaiwa")).await.unwrap();

        let rid = engine.push_now(SyncEntity::Product, p.id).await.unwrap();
        assert!(remote.row(SyncEntity::Product, rid).is_some());
        assert!(engine.database().products().require(p.id).await.unwrap().synced);
    }

    /// Remote double that makes one local edit while the first upload of
    /// `entity` is in flight, as a clerk at the till would.
    struct EditDuringUpload {
        inner: Arc<MemoryRemote>,
        db: Database,
        entity: SyncEntity,
        local_id: i64,
        fired: AtomicBool,
    }

    impl EditDuringUpload {
        fn new(inner: Arc<MemoryRemote>, db: &Database, entity: SyncEntity, local_id: i64) -> Arc<Self> {
            Arc::new(EditDuringUpload {
                inner,
                db: db.clone(),
                entity,
                local_id,
                fired: AtomicBool::new(false),
            })
        }

        async fn edit_once(&self, entity: SyncEntity) {
            if entity != self.entity || self.fired.swap(true, Ordering::SeqCst) {
                return;
            }
            match entity {
                SyncEntity::Sale => {
                    self.db.sales().mark_refunded(self.local_id).await.unwrap();
                }
                SyncEntity::Product => {
                    let sold = StockAdjustment::new(self.local_id, -1, MovementType::Sale, Actor::system());
                    self.db.stock().adjust(&sold).await.unwrap();
                }
                SyncEntity::Expense => {}
            }
        }
    }

    #[async_trait]
    impl RemoteStore for EditDuringUpload {
        fn label(&self) -> String {
            self.inner.label()
        }

        async fn fetch_page(&self, entity: SyncEntity, offset: usize, limit: usize) -> SyncResult<Vec<Value>> {
            self.inner.fetch_page(entity, offset, limit).await
        }

        async fn fetch_recent(&self, entity: SyncEntity, limit: usize) -> SyncResult<Vec<Value>> {
            self.inner.fetch_recent(entity, limit).await
        }

        async fn exists(&self, entity: SyncEntity, id: i64) -> SyncResult<bool> {
            self.inner.exists(entity, id).await
        }

        async fn insert(&self, entity: SyncEntity, row: &Value) -> SyncResult<Value> {
            self.edit_once(entity).await;
            self.inner.insert(entity, row).await
        }

        async fn update(&self, entity: SyncEntity, id: i64, patch: &Value) -> SyncResult<()> {
            self.edit_once(entity).await;
            self.inner.update(entity, id, patch).await
        }

        async fn delete(&self, entity: SyncEntity, id: i64) -> SyncResult<bool> {
            self.inner.delete(entity, id).await
        }
    }

    #[tokio::test]
    async fn test_refund_during_upload_survives_the_cycle() {
        let (engine, remote, _) = engine().await;
        let db = engine.database().clone();
        let sale = db
            .sales()
            .insert(&NewSale {
                timestamp: Utc::now(),
                items: vec![],
                total_cents: 9000,
                shipping_cost_cents: 0,
                salesperson_id: None,
                salesperson_name: "Ana".into(),
                payment_method: PaymentMethod::Cash,
                location: None,
                layaway_id: None,
            })
            .await
            .unwrap();
        engine
            .set_remote(Some(EditDuringUpload::new(remote.clone(), &db, SyncEntity::Sale, sale.id)))
            .await;

        engine.run_cycle(SyncTrigger::Timer).await.unwrap();

        // The pre-refund copy went out; the refund itself is still pending
        // and the pull did not overwrite it.
        let after_first = db.sales().require(sale.id).await.unwrap();
        assert!(after_first.refunded);
        assert!(!after_first.synced);

        engine.run_cycle(SyncTrigger::Timer).await.unwrap();

        let after_second = db.sales().require(sale.id).await.unwrap();
        assert!(after_second.refunded);
        assert!(after_second.synced);
        let rid = db.remote_ids().remote_for(SyncEntity::Sale, sale.id).await.unwrap().unwrap();
        assert_eq!(remote.row(SyncEntity::Sale, rid).unwrap()["refunded"], json!(true));
        assert_eq!(remote.rows(SyncEntity::Sale).len(), 1);
    }

    #[tokio::test]
    async fn test_sale_during_product_upload_keeps_new_stock() {
        let (engine, remote, _) = engine().await;
        let db = engine.database().clone();
        let p = db.products().insert(&product("Old Skool 43")).await.unwrap();
        engine
            .set_remote(Some(EditDuringUpload::new(remote.clone(), &db, SyncEntity::Product, p.id)))
            .await;

        engine.run_cycle(SyncTrigger::Timer).await.unwrap();

        let after_first = db.products().require(p.id).await.unwrap();
        assert_eq!(after_first.stock, 1);
        assert!(!after_first.synced);

        engine.run_cycle(SyncTrigger::Timer).await.unwrap();

        assert!(db.products().require(p.id).await.unwrap().synced);
        let rid = db.remote_ids().remote_for(SyncEntity::Product, p.id).await.unwrap().unwrap();
        assert_eq!(remote.row(SyncEntity::Product, rid).unwrap()["stock"], json!(1));
    }
}
