//! # kicks-pos: Till Services
//!
//! The operations behind the till screens. Every operation writes to the
//! Local Store first; the remote store is only ever asked afterwards, and a
//! failure there never undoes the local record.
//!
//! ## Service Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               Till                                      │
//! │                                                                         │
//! │   checkout() ──► sale row ──► stock per line ──► push_now(sale)         │
//! │   refunds()  ──► refunded flag ──► return movements ──► push_now(sale)  │
//! │   layaways() ──► reserve / installments (synthetic sales) / cancel      │
//! │   expenses() ──► expense row ──► push_now(expense)                      │
//! │                                                                         │
//! │   inventory() ── kardex + best-effort remote stock mirror               │
//! │   catalog()   ── products (admin)                                       │
//! │   users()     ── PIN login, admin-managed accounts                      │
//! │   settings()  ── remote endpoint and key                                │
//! │   dashboard() ── revenue / expenses for a period                        │
//! │                                                                         │
//! │   All of them share one Database and one SyncEngine.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Roles
//! Users carry a [`kicks_core::UserRole`]. Catalog edits, user management and
//! settings require `admin`; selling, layaways and expenses are open to every
//! logged-in user.

pub mod catalog;
pub mod checkout;
pub mod dashboard;
pub mod error;
pub mod expenses;
pub mod inventory;
pub mod layaway;
pub mod outcome;
pub mod refund;
pub mod settings;
pub mod users;

use std::sync::Arc;

use kicks_core::User;
use kicks_db::Database;
use kicks_sync::SyncEngine;

pub use catalog::{CatalogService, ProductUpdate};
pub use checkout::{Cart, CheckoutOutcome, CheckoutRequest, CheckoutService};
pub use dashboard::DashboardService;
pub use error::{PosError, PosResult};
pub use expenses::{ExpenseOutcome, ExpenseService};
pub use inventory::{Adjusted, InventoryLedger};
pub use layaway::{LayawayOutcome, LayawayService, PaymentOutcome};
pub use outcome::{RemoteMirror, StockFailure};
pub use refund::{RefundOutcome, RefundService};
pub use settings::SettingsService;
pub use users::UserService;

/// Entry point to every till service.
///
/// Cheap to clone; clones share the engine and the database pool.
#[derive(Clone)]
pub struct Till {
    engine: Arc<SyncEngine>,
}

impl Till {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Till { engine }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn database(&self) -> &Database {
        self.engine.database()
    }

    pub fn inventory(&self) -> InventoryLedger {
        InventoryLedger::new(self.engine.clone())
    }

    pub fn checkout(&self) -> CheckoutService {
        CheckoutService::new(self.engine.clone())
    }

    pub fn refunds(&self) -> RefundService {
        RefundService::new(self.engine.clone())
    }

    pub fn layaways(&self) -> LayawayService {
        LayawayService::new(self.engine.clone())
    }

    pub fn expenses(&self) -> ExpenseService {
        ExpenseService::new(self.engine.clone())
    }

    pub fn catalog(&self) -> CatalogService {
        CatalogService::new(self.engine.clone())
    }

    pub fn users(&self) -> UserService {
        UserService::new(self.database().clone())
    }

    pub fn settings(&self) -> SettingsService {
        SettingsService::new(self.database().clone())
    }

    pub fn dashboard(&self) -> DashboardService {
        DashboardService::new(self.database().clone())
    }
}

/// Refuses the operation unless `user` is an admin.
pub(crate) fn require_admin(user: &User, action: &str) -> PosResult<()> {
    if user.is_admin() {
        Ok(())
    } else {
        tracing::warn!(user_id = user.id, action, "Admin-only operation refused");
        Err(PosError::forbidden(format!("only an admin can {action}")))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use kicks_core::{NewProduct, Product, User, UserRole};
    use kicks_db::{Database, DbConfig};
    use kicks_sync::{MemoryRemote, SyncEngine, SyncSettings};

    use crate::Till;

    /// A till wired to an in-memory database and remote store.
    pub async fn till() -> (Till, Arc<MemoryRemote>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = Arc::new(SyncEngine::new(db, SyncSettings::default()));
        let remote = Arc::new(MemoryRemote::new());
        engine.set_remote(Some(remote.clone())).await;
        (Till::new(engine), remote)
    }

    /// A till with no remote store configured.
    pub async fn offline_till() -> Till {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        Till::new(Arc::new(SyncEngine::new(db, SyncSettings::default())))
    }

    pub fn product(name: &str, stock: i64) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            price_cents: 12000,
            brand: Some("Nike".to_string()),
            size: Some("42".to_string()),
            stock,
            ..Default::default()
        }
    }

    /// Creates a product through the kardex, bypassing role checks.
    pub async fn add_product(till: &Till, new: NewProduct) -> Product {
        let (product, _) = till
            .database()
            .stock()
            .create_product(&new, &kicks_core::Actor::system())
            .await
            .unwrap();
        product
    }

    pub async fn admin(till: &Till) -> User {
        till.database().users().insert("Marta", "1234", UserRole::Admin).await.unwrap()
    }

    pub async fn clerk(till: &Till) -> User {
        till.database().users().insert("Luis", "5678", UserRole::Sales).await.unwrap()
    }
}
