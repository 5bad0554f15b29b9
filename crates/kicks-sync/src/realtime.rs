//! # Realtime Channel
//!
//! Row-level change feed from the remote store over a Phoenix-protocol
//! websocket. Each change is applied at once through the same merge rule the
//! pull pass uses; the timer cycles cover whatever the feed misses.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Realtime Connection States                           │
//! │                                                                         │
//! │  ┌────────────┐    connect()    ┌────────────┐                          │
//! │  │Disconnected│ ──────────────► │ Connecting │                          │
//! │  └────────────┘                 └─────┬──────┘                          │
//! │        ▲                              │                                 │
//! │        │                    success   │   failure                       │
//! │        │                        ┌─────┴─────┐                           │
//! │        │                        ▼           ▼                           │
//! │        │              ┌────────────┐  ┌────────────┐                    │
//! │        │              │ Connected  │  │ Backoff    │                    │
//! │        │              └─────┬──────┘  └─────┬──────┘                    │
//! │        │                    │               │                           │
//! │        │              disconnect/error      │  timer expired            │
//! │        │                    ▼               │                           │
//! │        │              ┌────────────┐        │                           │
//! │        └───────────── │Reconnecting│ ◄──────┘                           │
//! │                       └────────────┘                                    │
//! │                                                                         │
//! │  ON CONNECT                                                             │
//! │  ──────────                                                             │
//! │  phx_join  realtime:public:sales     { postgres_changes: [*] }          │
//! │  phx_join  realtime:public:products  { postgres_changes: [*] }          │
//! │  phx_join  realtime:public:expenses  { postgres_changes: [*] }          │
//! │  heartbeat on topic "phoenix" every heartbeat_secs                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Change Events
//! ```text
//!  INSERT / UPDATE  record      ──► apply_row (merge rule)
//!  DELETE           old_record  ──► delete mapped local record + mapping
//! ```

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use kicks_core::SyncEntity;
use kicks_db::Database;

use crate::apply::{apply_row, Applied};
use crate::config::{RealtimeSettings, RemoteSettings};
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::rows::row_id;

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting before a reconnection attempt.
    Backoff,
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Backoff => write!(f, "backoff"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

// =============================================================================
// Phoenix Messages
// =============================================================================

/// One Phoenix channel frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhoenixMessage {
    /// Subscribes to every change of one table.
    pub fn join(entity: SyncEntity, reference: u64) -> Self {
        PhoenixMessage {
            topic: topic_for(entity),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "postgres_changes": [
                        { "event": "*", "schema": "public", "table": entity.table() }
                    ]
                }
            }),
            reference: Some(reference.to_string()),
        }
    }

    pub fn heartbeat(reference: u64) -> Self {
        PhoenixMessage {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }
}

fn topic_for(entity: SyncEntity) -> String {
    format!("realtime:public:{}", entity.table())
}

// =============================================================================
// Change Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// A decoded row-level change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub entity: SyncEntity,
    pub kind: ChangeKind,
    pub record: Option<Value>,
    pub old_record: Option<Value>,
}

impl ChangeEvent {
    /// Decodes a frame; `None` for replies, heartbeats and unknown tables.
    ///
    /// Accepts both the `postgres_changes` envelope (`payload.data`) and the
    /// older per-kind events (`event: "INSERT"`, fields directly in the
    /// payload).
    pub fn decode(message: &PhoenixMessage) -> Option<Self> {
        let body = if message.event == "postgres_changes" {
            message.payload.get("data")?
        } else {
            ChangeKind::parse(&message.event)?;
            &message.payload
        };

        let kind = body
            .get("type")
            .or_else(|| body.get("eventType"))
            .and_then(Value::as_str)
            .and_then(ChangeKind::parse)
            .or_else(|| ChangeKind::parse(&message.event))?;
        let entity = body
            .get("table")
            .and_then(Value::as_str)
            .and_then(SyncEntity::from_table)?;

        Some(ChangeEvent {
            entity,
            kind,
            record: non_empty(body.get("record")),
            old_record: non_empty(body.get("old_record")),
        })
    }

    /// Remote id of the changed row.
    pub fn remote_id(&self) -> Option<i64> {
        self.record
            .as_ref()
            .and_then(row_id)
            .or_else(|| self.old_record.as_ref().and_then(row_id))
    }
}

fn non_empty(value: Option<&Value>) -> Option<Value> {
    match value {
        Some(Value::Object(map)) if !map.is_empty() => Some(Value::Object(map.clone())),
        _ => None,
    }
}

/// What a change did locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeApplied {
    Written(i64),
    /// Local copy has pending edits.
    Kept,
    Deleted(i64),
    /// Nothing mapped locally for a delete.
    Ignored,
}

/// Applies one change in its own transaction.
pub async fn apply_change(db: &Database, event: &ChangeEvent) -> SyncResult<ChangeApplied> {
    let mut batch = db.begin_pull().await?;
    let applied = match event.kind {
        ChangeKind::Insert | ChangeKind::Update => {
            let record = event.record.as_ref().ok_or_else(|| {
                SyncError::Mapping(format!("{} change without record", event.entity.table()))
            })?;
            match apply_row(&mut batch, event.entity, record).await? {
                Applied::Written(id) => ChangeApplied::Written(id),
                Applied::Kept => ChangeApplied::Kept,
            }
        }
        ChangeKind::Delete => {
            let remote_id = event.old_record.as_ref().and_then(row_id).ok_or_else(|| {
                SyncError::Mapping(format!("{} delete without old record id", event.entity.table()))
            })?;
            match batch.delete(event.entity, remote_id).await? {
                Some(local_id) => ChangeApplied::Deleted(local_id),
                None => ChangeApplied::Ignored,
            }
        }
    };
    batch.commit().await?;
    debug!(entity = %event.entity, kind = ?event.kind, result = ?applied, "Realtime change applied");
    Ok(applied)
}

// =============================================================================
// Channel Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub url: Url,
    pub heartbeat: Duration,
    pub connect_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RealtimeConfig {
    pub fn new(remote: &RemoteSettings, settings: &RealtimeSettings) -> SyncResult<Self> {
        Ok(RealtimeConfig {
            url: remote.realtime_url()?,
            heartbeat: Duration::from_secs(settings.heartbeat_secs.max(1)),
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_secs(settings.max_backoff_secs),
        })
    }
}

// =============================================================================
// Channel Handle
// =============================================================================

/// Control handle for a running channel.
#[derive(Clone)]
pub struct RealtimeHandle {
    state: Arc<RwLock<ConnectionState>>,
    shutdown_tx: mpsc::Sender<()>,
}

impl RealtimeHandle {
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::Channel("realtime channel already stopped".into()))
    }
}

// =============================================================================
// Realtime Channel
// =============================================================================

/// Websocket listener with automatic reconnection.
pub struct RealtimeChannel {
    config: RealtimeConfig,
    engine: Arc<SyncEngine>,
    state: Arc<RwLock<ConnectionState>>,
    shutdown_rx: mpsc::Receiver<()>,
    next_ref: u64,
}

impl RealtimeChannel {
    /// Spawns the listener task.
    pub fn spawn(config: RealtimeConfig, engine: Arc<SyncEngine>) -> RealtimeHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));

        let channel = RealtimeChannel {
            config,
            engine,
            state: state.clone(),
            shutdown_rx,
            next_ref: 0,
        };
        tokio::spawn(channel.run());

        RealtimeHandle { state, shutdown_tx }
    }

    async fn run(mut self) {
        info!(host = self.config.url.host_str().unwrap_or("?"), "Realtime channel starting");
        let mut backoff = self.create_backoff();

        loop {
            if self.shutdown_rx.try_recv().is_ok() {
                break;
            }

            *self.state.write().await = ConnectionState::Connecting;
            match self.connect_with_timeout().await {
                Ok(ws_stream) => {
                    info!("Realtime channel connected");
                    *self.state.write().await = ConnectionState::Connected;
                    backoff.reset();

                    match self.connection_loop(ws_stream).await {
                        Ok(true) => break,
                        Ok(false) => info!("Realtime channel closed by server"),
                        Err(e) => warn!(error = %e, "Realtime connection lost"),
                    }
                }
                Err(e) => error!(error = %e, "Realtime connect failed"),
            }

            *self.state.write().await = ConnectionState::Backoff;
            let Some(wait) = backoff.next_backoff() else {
                error!("Realtime backoff exhausted");
                break;
            };
            debug!(?wait, "Waiting before realtime reconnect");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    *self.state.write().await = ConnectionState::Reconnecting;
                }
                _ = self.shutdown_rx.recv() => break,
            }
        }

        *self.state.write().await = ConnectionState::Disconnected;
        info!("Realtime channel stopped");
    }

    async fn connect_with_timeout(&self) -> SyncResult<WebSocketStream<MaybeTlsStream<TcpStream>>> {
        match timeout(self.config.connect_timeout, connect_async(self.config.url.as_str())).await {
            Ok(Ok((ws_stream, response))) => {
                debug!(status = ?response.status(), "Websocket handshake complete");
                Ok(ws_stream)
            }
            Ok(Err(e)) => Err(SyncError::from(e)),
            Err(_) => Err(SyncError::Timeout(self.config.connect_timeout.as_secs())),
        }
    }

    fn next_ref(&mut self) -> u64 {
        self.next_ref += 1;
        self.next_ref
    }

    /// Runs until the socket closes. `Ok(true)` means shutdown was requested.
    async fn connection_loop(&mut self, ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> SyncResult<bool> {
        let (mut write, mut read) = ws_stream.split();

        for entity in SyncEntity::ALL {
            let join = PhoenixMessage::join(entity, self.next_ref());
            write.send(WsMessage::Text(serde_json::to_string(&join)?.into())).await?;
            debug!(topic = %join.topic, "Joined realtime topic");
        }

        let mut heartbeat = tokio::time::interval(self.config.heartbeat);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = read.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => self.handle_text(&text).await,
                        Some(Ok(WsMessage::Ping(data))) => write.send(WsMessage::Pong(data)).await?,
                        Some(Ok(WsMessage::Close(frame))) => {
                            info!(?frame, "Received close frame");
                            return Ok(false);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(SyncError::from(e)),
                        None => return Ok(false),
                    }
                }

                _ = heartbeat.tick() => {
                    let beat = PhoenixMessage::heartbeat(self.next_ref());
                    write.send(WsMessage::Text(serde_json::to_string(&beat)?.into())).await?;
                }

                _ = self.shutdown_rx.recv() => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(true);
                }
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        let message = match serde_json::from_str::<PhoenixMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Unparseable realtime frame");
                return;
            }
        };

        if message.event == "phx_error" || (message.event == "system" && message.payload["status"] == "error") {
            warn!(topic = %message.topic, payload = %message.payload, "Realtime channel error");
            return;
        }

        let Some(event) = ChangeEvent::decode(&message) else {
            return;
        };
        // Failures already reach the observer; the next cycle reconciles.
        if let Ok(applied) = self.engine.apply_change(&event).await {
            debug!(entity = %event.entity, ?applied, "Realtime change");
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kicks_db::DbConfig;

    fn frame(text: &str) -> PhoenixMessage {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_join_frame_shape() {
        let join = serde_json::to_value(PhoenixMessage::join(SyncEntity::Sale, 1)).unwrap();
        assert_eq!(join["topic"], "realtime:public:sales");
        assert_eq!(join["event"], "phx_join");
        assert_eq!(join["ref"], "1");
        assert_eq!(join["payload"]["config"]["postgres_changes"][0]["table"], "sales");
    }

    #[test]
    fn test_decode_postgres_changes_envelope() {
        let message = frame(
            r#"{"topic":"realtime:public:products","event":"postgres_changes","ref":null,
                "payload":{"data":{"type":"UPDATE","table":"products","schema":"public",
                "record":{"id":4,"name":"NMD","price":120.0,"stock":2},"old_record":{"id":4}}}}"#,
        );
        let event = ChangeEvent::decode(&message).unwrap();
        assert_eq!(event.entity, SyncEntity::Product);
        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.remote_id(), Some(4));
    }

    #[test]
    fn test_decode_legacy_delete() {
        let message = frame(
            r#"{"topic":"realtime:public:expenses","event":"DELETE",
                "payload":{"table":"expenses","type":"DELETE","record":null,"old_record":{"id":12}}}"#,
        );
        let event = ChangeEvent::decode(&message).unwrap();
        assert_eq!(event.kind, ChangeKind::Delete);
        assert!(event.record.is_none());
        assert_eq!(event.remote_id(), Some(12));
    }

    #[test]
    fn test_replies_are_not_changes() {
        let reply = frame(r#"{"topic":"phoenix","event":"phx_reply","payload":{"status":"ok"},"ref":"2"}"#);
        assert!(ChangeEvent::decode(&reply).is_none());
        let other = frame(
            r#"{"topic":"realtime:public:users","event":"INSERT","payload":{"table":"users","record":{"id":1}}}"#,
        );
        assert!(ChangeEvent::decode(&other).is_none());
    }

    #[tokio::test]
    async fn test_insert_then_delete_round() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let insert = ChangeEvent {
            entity: SyncEntity::Expense,
            kind: ChangeKind::Insert,
            record: Some(json!({ "id": 12, "amount": 3.5, "description": "Tags", "timestamp": "2024-07-01T08:00:00Z" })),
            old_record: None,
        };
        let ChangeApplied::Written(local_id) = apply_change(&db, &insert).await.unwrap() else {
            panic!("insert must write");
        };
        assert!(db.expenses().get_by_id(local_id).await.unwrap().is_some());

        let delete = ChangeEvent {
            entity: SyncEntity::Expense,
            kind: ChangeKind::Delete,
            record: None,
            old_record: Some(json!({ "id": 12 })),
        };
        assert_eq!(apply_change(&db, &delete).await.unwrap(), ChangeApplied::Deleted(local_id));
        assert!(db.expenses().get_by_id(local_id).await.unwrap().is_none());
        assert_eq!(apply_change(&db, &delete).await.unwrap(), ChangeApplied::Ignored);
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Backoff.to_string(), "backoff");
    }
}
