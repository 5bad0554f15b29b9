//! # kicks-sync: Sync Engine for Kicks POS
//!
//! Keeps each till's Local Store in step with the shared remote store while
//! never making a sale wait on the network.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │                      SyncAgent (Scheduler)                       │   │
//! │  │                                                                  │   │
//! │  │  Startup (full) · Timer 15 s (recent) · Focus / Visibility       │   │
//! │  │  Manual · SettingsChanged (full)                                 │   │
//! │  └────────────────────────────┬─────────────────────────────────────┘   │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │                 SyncEngine (single-flight guard)                 │   │
//! │  │                                                                  │   │
//! │  │   push ─────────────────────────────► pull                       │   │
//! │  │   unsynced rows                       remote rows                │   │
//! │  │   insert / update                     merge rule (merge.rs)      │   │
//! │  │   link remote id                      PullBatch per page         │   │
//! │  │   mark synced                                                    │   │
//! │  │                                                                  │   │
//! │  │   ──► CycleReport ──► SyncObserver                               │   │
//! │  └───────────────┬──────────────────────────────────┬───────────────┘   │
//! │                  │                                  ▲                   │
//! │                  ▼                                  │                   │
//! │  ┌────────────────────────────┐      ┌──────────────┴─────────────┐     │
//! │  │ dyn RemoteStore            │      │ RealtimeChannel            │     │
//! │  │ PostgrestClient / Memory   │      │ Phoenix websocket feed     │     │
//! │  └────────────────────────────┘      └────────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`agent`] - `SyncAgent` scheduler and its handle
//! - [`engine`] - `SyncEngine`, single-flight cycles
//! - [`push`] / [`pull`] / [`force_push`] - the three reconciliation passes
//! - [`apply`] - one remote row into a pull batch
//! - [`merge`] - the keep-local-unless-refunded rule
//! - [`mapping`] / [`rows`] - local records <-> remote rows
//! - [`remote`] - `RemoteStore` trait, PostgREST client, in-memory double
//! - [`realtime`] - change feed over websocket
//! - [`report`] - cycle reports and observers
//! - [`config`] - `SyncConfig` (TOML, database settings, environment)
//! - [`error`] - `SyncError`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kicks_sync::{SyncAgent, SyncConfig, SyncEngine, SyncTrigger};
//!
//! let config = SyncConfig::resolve(None, &db).await?;
//! let engine = Arc::new(SyncEngine::new(db.clone(), config.sync.clone()));
//! let agent = SyncAgent::new(engine, config).start().await?;
//!
//! agent.trigger(SyncTrigger::Focus).await?;
//! println!("pending: {}", agent.status().await?.pending);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod apply;
pub mod config;
pub mod engine;
pub mod error;
pub mod force_push;
pub mod mapping;
pub mod merge;
pub mod pull;
pub mod push;
pub mod realtime;
pub mod remote;
pub mod report;
pub mod rows;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{connect_remote, pending_count, AgentCommand, SyncAgent, SyncAgentHandle, SyncStatus};
pub use config::{RealtimeSettings, RemoteSettings, SyncConfig, SyncSettings};
pub use engine::{CycleOutcome, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use merge::{MergeDecision, MergeOutcome};
pub use realtime::{ChangeApplied, ChangeEvent, ChangeKind, ConnectionState, RealtimeChannel};
pub use remote::{MemoryRemote, PostgrestClient, RemoteStore};
pub use report::{CycleReport, EntityCounts, LogObserver, PullMode, SyncFailure, SyncObserver, SyncStage, SyncTrigger};
pub use rows::update_product_stock;
