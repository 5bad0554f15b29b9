//! # Commands
//!
//! One-shot admin commands. Each returns a JSON value that `run` prints, so
//! the output can be piped into other tools.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use kicks_db::Database;
use kicks_pos::Till;
use kicks_sync::{connect_remote, pending_count, CycleOutcome, SyncConfig, SyncEngine, SyncError, SyncTrigger};

use crate::cli::Command;
use crate::error::{TillError, TillResult};

/// A till opened for commands: services plus the resolved sync config.
#[derive(Clone)]
pub struct App {
    till: Till,
    config: SyncConfig,
}

impl App {
    /// Resolves configuration (file, settings table, environment) and builds
    /// the engine. The remote store is connected lazily by the commands that
    /// need it.
    pub async fn open(db: Database, config_path: Option<PathBuf>) -> TillResult<App> {
        let config = SyncConfig::resolve(config_path, &db).await?;
        Ok(App::from_parts(db, config))
    }

    pub fn from_parts(db: Database, config: SyncConfig) -> App {
        let engine = Arc::new(SyncEngine::new(db, config.sync.clone()));
        App {
            till: Till::new(engine),
            config,
        }
    }

    pub fn till(&self) -> &Till {
        &self.till
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        self.till.engine()
    }

    /// Connects the configured remote store, keeping one already set.
    async fn connect(&self) -> TillResult<()> {
        if let Some(settings) = self.config.remote_settings() {
            self.engine().set_remote(Some(connect_remote(&settings)?)).await;
        } else if self.engine().remote().await.is_none() {
            return Err(SyncError::NotConfigured.into());
        }
        Ok(())
    }

    pub async fn execute(&self, command: Command) -> TillResult<Value> {
        match command {
            Command::Status => self.status().await,
            Command::Sync => self.sync().await,
            Command::ForcePush => self.force_push().await,
            Command::BootstrapAdmin { name, pin } => {
                let admin = self.till.users().bootstrap_admin(&name, &pin).await?;
                Ok(json!({ "created": admin.name, "role": admin.role.to_string() }))
            }
            Command::SetRemote { url, key, pin } => {
                let admin = self.till.users().login(&pin).await?;
                let saved = self.till.settings().set_remote(&admin, &url, &key).await?;
                Ok(json!({ "remote": saved.url, "applies": "next start of the till daemon" }))
            }
            Command::ClearRemote { pin } => {
                let admin = self.till.users().login(&pin).await?;
                self.till.settings().clear_remote(&admin).await?;
                Ok(json!({ "remote": null }))
            }
            Command::Dashboard { days } => {
                let summary = self.till.dashboard().last_days(days).await?;
                Ok(serde_json::to_value(summary)?)
            }
            Command::Kardex { product_id } => self.kardex(product_id).await,
            Command::Run | Command::Help => Err(TillError::usage("not a one-shot command")),
        }
    }

    async fn status(&self) -> TillResult<Value> {
        let db = self.till.database();
        Ok(json!({
            "remote": self.config.remote_settings().map(|r| r.url),
            "device": self.config.device_id(),
            "pending": pending_count(db).await?,
            "products": db.products().list().await?.len(),
            "sales": db.sales().count().await?,
        }))
    }

    async fn sync(&self) -> TillResult<Value> {
        self.connect().await?;
        match self.engine().run_cycle(SyncTrigger::Manual).await? {
            CycleOutcome::Completed(report) => Ok(serde_json::to_value(report)?),
            CycleOutcome::Skipped => Ok(json!({ "skipped": true })),
            CycleOutcome::NotConfigured => Err(SyncError::NotConfigured.into()),
        }
    }

    async fn force_push(&self) -> TillResult<Value> {
        self.connect().await?;
        let report = self.engine().force_push().await?;
        info!(
            pushed = report.total_pushed(),
            failures = report.failures.len(),
            "Force push finished"
        );
        Ok(serde_json::to_value(report)?)
    }

    async fn kardex(&self, product_id: i64) -> TillResult<Value> {
        let product = self.till.catalog().get(product_id).await?;
        let movements = self.till.inventory().history(product_id).await?;
        let broken_at = self.till.inventory().audit(product_id).await?;
        Ok(json!({
            "product": product.name,
            "stock": product.stock,
            "consistent": broken_at.is_none(),
            "brokenAt": broken_at,
            "movements": movements,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kicks_core::{Actor, NewProduct, SyncEntity};
    use kicks_db::DbConfig;
    use kicks_sync::MemoryRemote;

    async fn app() -> App {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        App::from_parts(db, SyncConfig::default())
    }

    async fn add_product(app: &App, name: &str, stock: i64) -> i64 {
        let new = NewProduct {
            name: name.to_string(),
            price_cents: 8999,
            stock,
            ..Default::default()
        };
        let (product, _) = app
            .till()
            .database()
            .stock()
            .create_product(&new, &Actor::system())
            .await
            .unwrap();
        product.id
    }

    #[tokio::test]
    async fn test_status_counts_pending() {
        let app = app().await;
        add_product(&app, "Gazelle 41", 2).await;

        let status = app.execute(Command::Status).await.unwrap();
        assert_eq!(status["pending"], json!(1));
        assert_eq!(status["products"], json!(1));
        assert_eq!(status["remote"], Value::Null);
    }

    #[tokio::test]
    async fn test_sync_needs_remote() {
        let app = app().await;
        let err = app.execute(Command::Sync).await.unwrap_err();
        assert!(matches!(err, TillError::Sync(SyncError::NotConfigured)));
        assert!(matches!(
            app.execute(Command::ForcePush).await,
            Err(TillError::Sync(SyncError::NotConfigured))
        ));
    }

    #[tokio::test]
    async fn test_sync_uploads_with_injected_remote() {
        let app = app().await;
        add_product(&app, "Superstar 40", 3).await;
        let remote = Arc::new(MemoryRemote::new());
        app.engine().set_remote(Some(remote.clone())).await;

        let report = app.execute(Command::Sync).await.unwrap();
        assert_eq!(report["products"]["pushed"], json!(1));
        assert_eq!(remote.rows(SyncEntity::Product).len(), 1);

        let status = app.execute(Command::Status).await.unwrap();
        assert_eq!(status["pending"], json!(0));
    }

    #[tokio::test]
    async fn test_remote_settings_need_admin_pin() {
        let app = app().await;
        app.execute(Command::BootstrapAdmin {
            name: "Marta".into(),
            pin: "1234".into(),
        })
        .await
        .unwrap();

        let wrong = app
            .execute(Command::SetRemote {
                url: "https://shop.example.co".into(),
                key: "anon".into(),
                pin: "9999".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(wrong.code(), "FORBIDDEN");

        let saved = app
            .execute(Command::SetRemote {
                url: "https://shop.example.co".into(),
                key: "anon".into(),
                pin: "1234".into(),
            })
            .await
            .unwrap();
        assert_eq!(saved["remote"], json!("https://shop.example.co"));
        assert!(app.till().settings().remote().await.unwrap().is_some());

        app.execute(Command::ClearRemote { pin: "1234".into() }).await.unwrap();
        assert!(app.till().settings().remote().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_kardex_reports_consistency() {
        let app = app().await;
        let id = add_product(&app, "Forum Low 42", 5).await;

        let kardex = app.execute(Command::Kardex { product_id: id }).await.unwrap();
        assert_eq!(kardex["stock"], json!(5));
        assert_eq!(kardex["consistent"], json!(true));
        assert_eq!(kardex["movements"].as_array().unwrap().len(), 1);

        let missing = app.execute(Command::Kardex { product_id: 999 }).await.unwrap_err();
        assert_eq!(missing.code(), "NOT_FOUND");
    }
}
