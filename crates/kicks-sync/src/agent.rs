//! # Sync Agent
//!
//! Background scheduler for the sync engine. Decides *when* cycles run; the
//! engine decides *what* a cycle does.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent Architecture                           │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │                         SyncAgent                                │   │
//! │  │                                                                  │   │
//! │  │  • Startup cycle (full pull), once                               │   │
//! │  │  • Interval timer (recent pull), every interval_secs             │   │
//! │  │  • Command channel: focus / visibility / manual / reconfigure    │   │
//! │  │  • Owns the realtime channel                                     │   │
//! │  └────────────────────────────┬─────────────────────────────────────┘   │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                   │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐     │
//! │  │ SyncEngine     │  │ SyncEngine     │  │ RealtimeChannel        │     │
//! │  │ .run_cycle()   │  │ .set_remote()  │  │ (websocket)            │     │
//! │  │ one task per   │  │ on reconfigure │  │ .apply_change()        │     │
//! │  │ trigger        │  │                │  │                        │     │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘     │
//! │                                                                         │
//! │  Every trigger spawns its own cycle task; the engine's single-flight    │
//! │  guard turns overlapping triggers into skips.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use kicks_db::Database;

use crate::config::{RealtimeSettings, RemoteSettings, SyncConfig};
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::realtime::{ConnectionState, RealtimeChannel, RealtimeConfig, RealtimeHandle};
use crate::remote::{PostgrestClient, RemoteStore};
use crate::report::{CycleReport, SyncTrigger};

// =============================================================================
// Sync Status
// =============================================================================

/// Snapshot for status bars and the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    /// Remote store label, `None` when running local-only.
    pub remote: Option<String>,

    #[serde(serialize_with = "serialize_state")]
    pub realtime: ConnectionState,

    /// Local records still waiting for upload.
    pub pending: i64,

    pub skipped_cycles: u64,

    pub last_report: Option<CycleReport>,
}

fn serialize_state<S: serde::Serializer>(state: &ConnectionState, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&state.to_string())
}

/// Number of unsynced sales, products and expenses.
pub async fn pending_count(db: &Database) -> SyncResult<i64> {
    let sales = db.sales().count_unsynced().await?;
    let products = db.products().count_unsynced().await?;
    let expenses = db.expenses().count_unsynced().await?;
    Ok(sales + products + expenses)
}

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug, Clone)]
pub enum AgentCommand {
    /// Run a cycle now (focus, visibility, manual).
    Trigger(SyncTrigger),
    /// Swap the remote store; `None` switches to local-only.
    Reconfigure(Option<RemoteSettings>),
}

/// Builds the production remote client.
pub fn connect_remote(settings: &RemoteSettings) -> SyncResult<Arc<dyn RemoteStore>> {
    Ok(Arc::new(PostgrestClient::new(settings)?))
}

// =============================================================================
// Sync Agent
// =============================================================================

pub struct SyncAgent {
    engine: Arc<SyncEngine>,
    config: SyncConfig,
}

impl SyncAgent {
    pub fn new(engine: Arc<SyncEngine>, config: SyncConfig) -> Self {
        SyncAgent { engine, config }
    }

    /// Validates the configuration, connects the remote store (when one is
    /// configured) and spawns the scheduler.
    ///
    /// A remote store already set on the engine is kept when the
    /// configuration names none.
    pub async fn start(self) -> SyncResult<SyncAgentHandle> {
        self.config.validate()?;

        let remote_settings = self.config.remote_settings();
        if let Some(settings) = &remote_settings {
            self.engine.set_remote(Some(connect_remote(settings)?)).await;
        } else if self.engine.remote().await.is_none() {
            info!("No remote store configured, sync runs local-only");
        }

        let realtime = Arc::new(RwLock::new(None));
        if let Some(settings) = &remote_settings {
            *realtime.write().await = start_realtime(&self.engine, settings, &self.config.realtime);
        }

        let (command_tx, command_rx) = mpsc::channel(32);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        info!(
            device_id = %self.config.device_id(),
            interval_secs = self.config.sync.interval_secs,
            realtime = self.config.realtime.enabled,
            "Starting sync agent"
        );

        let handle = SyncAgentHandle {
            commands: command_tx,
            shutdown_tx,
            engine: self.engine.clone(),
            realtime: realtime.clone(),
        };
        tokio::spawn(self.run(command_rx, shutdown_rx, realtime));
        Ok(handle)
    }

    async fn run(
        self,
        mut commands: mpsc::Receiver<AgentCommand>,
        mut shutdown_rx: mpsc::Receiver<()>,
        realtime: Arc<RwLock<Option<RealtimeHandle>>>,
    ) {
        spawn_cycle(&self.engine, SyncTrigger::Startup);

        let period = self.config.sync.interval();
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => spawn_cycle(&self.engine, SyncTrigger::Timer),

                Some(command) = commands.recv() => match command {
                    AgentCommand::Trigger(trigger) => spawn_cycle(&self.engine, trigger),
                    AgentCommand::Reconfigure(settings) => {
                        self.reconfigure(settings, &realtime).await;
                    }
                },

                _ = shutdown_rx.recv() => {
                    info!("Sync agent received shutdown");
                    break;
                }
            }
        }

        if let Some(channel) = realtime.write().await.take() {
            let _ = channel.shutdown().await;
        }
        info!("Sync agent stopped");
    }

    async fn reconfigure(&self, settings: Option<RemoteSettings>, realtime: &RwLock<Option<RealtimeHandle>>) {
        if let Some(channel) = realtime.write().await.take() {
            let _ = channel.shutdown().await;
        }

        match settings {
            Some(settings) => match connect_remote(&settings) {
                Ok(remote) => {
                    self.engine.set_remote(Some(remote)).await;
                    *realtime.write().await = start_realtime(&self.engine, &settings, &self.config.realtime);
                    spawn_cycle(&self.engine, SyncTrigger::SettingsChanged);
                }
                Err(e) => error!(error = %e, "Rejected new remote settings"),
            },
            None => self.engine.set_remote(None).await,
        }
    }
}

fn spawn_cycle(engine: &Arc<SyncEngine>, trigger: SyncTrigger) {
    let engine = engine.clone();
    tokio::spawn(async move {
        if let Err(e) = engine.run_cycle(trigger).await {
            error!(trigger = %trigger, error = %e, "Sync cycle aborted");
        }
    });
}

fn start_realtime(
    engine: &Arc<SyncEngine>,
    remote: &RemoteSettings,
    settings: &RealtimeSettings,
) -> Option<RealtimeHandle> {
    if !settings.enabled {
        debug!("Realtime channel disabled");
        return None;
    }
    match RealtimeConfig::new(remote, settings) {
        Ok(config) => Some(RealtimeChannel::spawn(config, engine.clone())),
        Err(e) => {
            warn!(error = %e, "Realtime channel not started");
            None
        }
    }
}

// =============================================================================
// Agent Handle (for external control)
// =============================================================================

/// Handle for controlling a running agent.
#[derive(Clone)]
pub struct SyncAgentHandle {
    commands: mpsc::Sender<AgentCommand>,
    shutdown_tx: mpsc::Sender<()>,
    engine: Arc<SyncEngine>,
    realtime: Arc<RwLock<Option<RealtimeHandle>>>,
}

impl SyncAgentHandle {
    /// Requests a cycle (focus, visibility, manual).
    pub async fn trigger(&self, trigger: SyncTrigger) -> SyncResult<()> {
        self.send(AgentCommand::Trigger(trigger)).await
    }

    /// Applies new remote settings, followed by a full cycle.
    pub async fn reconfigure(&self, settings: Option<RemoteSettings>) -> SyncResult<()> {
        self.send(AgentCommand::Reconfigure(settings)).await
    }

    async fn send(&self, command: AgentCommand) -> SyncResult<()> {
        self.commands.send(command).await.map_err(|_| SyncError::ShuttingDown)
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub async fn status(&self) -> SyncResult<SyncStatus> {
        let realtime = match self.realtime.read().await.as_ref() {
            Some(channel) => channel.state().await,
            None => ConnectionState::Disconnected,
        };
        Ok(SyncStatus {
            remote: self.engine.remote().await.map(|r| r.label()),
            realtime,
            pending: pending_count(self.engine.database()).await?,
            skipped_cycles: self.engine.skipped_cycles(),
            last_report: self.engine.last_report().await,
        })
    }

    /// Signals the agent to shut down gracefully.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncSettings;
    use crate::remote::MemoryRemote;
    use kicks_core::{NewProduct, SyncEntity};
    use kicks_db::DbConfig;
    use std::time::Duration;

    macro_rules! eventually {
        ($cond:expr) => {{
            let mut reached = false;
            for _ in 0..200 {
                if $cond {
                    reached = true;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert!(reached, "never true: {}", stringify!($cond));
        }};
    }

    async fn engine_with_memory() -> (Arc<SyncEngine>, Arc<MemoryRemote>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = Arc::new(SyncEngine::new(db, SyncSettings::default()));
        let remote = Arc::new(MemoryRemote::new());
        engine.set_remote(Some(remote.clone())).await;
        (engine, remote)
    }

    #[tokio::test]
    async fn test_startup_cycle_runs() {
        let (engine, remote) = engine_with_memory().await;
        engine
            .database()
            .products()
            .insert(&NewProduct {
                name: "Ozweego".into(),
                price_cents: 10000,
                category: None,
                brand: None,
                size: None,
                image: None,
                stock: 1,
            })
            .await
            .unwrap();

        let handle = SyncAgent::new(engine.clone(), SyncConfig::default()).start().await.unwrap();
        eventually!(remote.rows(SyncEntity::Product).len() == 1);
        eventually!(handle.status().await.unwrap().pending == 0);

        let status = handle.status().await.unwrap();
        assert_eq!(status.remote.as_deref(), Some("memory"));
        assert_eq!(status.realtime, ConnectionState::Disconnected);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_trigger_and_reconfigure_to_local_only() {
        let (engine, remote) = engine_with_memory().await;
        let handle = SyncAgent::new(engine.clone(), SyncConfig::default()).start().await.unwrap();
        eventually!(engine.last_report().await.is_some());

        let before = remote.calls();
        handle.trigger(SyncTrigger::Focus).await.unwrap();
        eventually!(remote.calls() > before);

        handle.reconfigure(None).await.unwrap();
        eventually!(engine.remote().await.is_none());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_config_refuses_to_start() {
        let (engine, _) = engine_with_memory().await;
        let mut config = SyncConfig::default();
        config.sync.page_size = 0;
        assert!(SyncAgent::new(engine, config).start().await.is_err());
    }

    #[tokio::test]
    async fn test_pending_count_sums_unsynced_tables() {
        let (engine, _) = engine_with_memory().await;
        let db = engine.database();
        assert_eq!(pending_count(db).await.unwrap(), 0);

        let product = db
            .products()
            .insert(&NewProduct {
                name: "Handball Spezial".into(),
                price_cents: 11000,
                stock: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        db.expenses().insert(chrono::Utc::now(), 800, "Tissue paper", None).await.unwrap();
        db.expenses().insert(chrono::Utc::now(), 1500, "Courier", None).await.unwrap();
        assert_eq!(pending_count(db).await.unwrap(), 3);

        assert!(db.products().mark_synced(product.id, 0).await.unwrap());
        assert_eq!(pending_count(db).await.unwrap(), 2);
    }
}
