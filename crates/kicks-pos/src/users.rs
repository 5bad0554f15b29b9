//! # Users
//!
//! PIN login and admin-managed accounts.
//!
//! ```text
//!  login(pin) ──► validate_pin ──► find_by_pin ──► touch last_active ──► User
//!
//!  create / delete            admin only
//!  delete                     never removes the last admin
//!  bootstrap_admin            only while the user table is empty
//! ```
//!
//! Users stay on the device; the remote store only ever sees salesperson
//! names on sales.

use chrono::Utc;
use tracing::{info, warn};

use kicks_core::validation::{validate_pin, validate_user_name};
use kicks_core::{User, UserRole, ValidationError};
use kicks_db::Database;

use crate::error::{PosError, PosResult};
use crate::require_admin;

#[derive(Debug, Clone)]
pub struct UserService {
    db: Database,
}

impl UserService {
    pub fn new(db: Database) -> Self {
        UserService { db }
    }

    /// Logs a user in by PIN and stamps their last activity.
    pub async fn login(&self, pin: &str) -> PosResult<User> {
        validate_pin(pin)?;

        let Some(user) = self.db.users().find_by_pin(pin).await? else {
            warn!("Login attempt with unknown PIN");
            return Err(PosError::forbidden("unknown PIN"));
        };
        self.db.users().touch_last_active(user.id, Utc::now()).await?;
        let user = self.db.users().require(user.id).await?;

        info!(user_id = user.id, name = %user.name, role = %user.role, "User logged in");
        Ok(user)
    }

    /// Creates an account.
    ///
    /// ## Errors
    /// - `Forbidden` unless `acting` is an admin
    /// - `Validation` for a bad name or PIN, or a PIN already in use
    pub async fn create(&self, acting: &User, name: &str, pin: &str, role: UserRole) -> PosResult<User> {
        require_admin(acting, "create users")?;
        self.insert(name, pin, role).await
    }

    /// Creates the first admin on a fresh till.
    pub async fn bootstrap_admin(&self, name: &str, pin: &str) -> PosResult<User> {
        if !self.db.users().list().await?.is_empty() {
            return Err(PosError::business("users already exist, ask an admin for an account"));
        }
        self.insert(name, pin, UserRole::Admin).await
    }

    pub async fn list(&self) -> PosResult<Vec<User>> {
        Ok(self.db.users().list().await?)
    }

    /// Removes an account.
    ///
    /// ## Errors
    /// - `Forbidden` unless `acting` is an admin
    /// - `Business` when the target is the only admin left
    pub async fn delete(&self, acting: &User, user_id: i64) -> PosResult<()> {
        require_admin(acting, "delete users")?;

        let target = self.db.users().require(user_id).await?;
        if target.is_admin() && self.db.users().count_admins().await? <= 1 {
            return Err(PosError::business("cannot delete the last admin"));
        }

        self.db.users().delete(user_id).await?;
        info!(user_id, name = %target.name, by = %acting.name, "User deleted");
        Ok(())
    }

    async fn insert(&self, name: &str, pin: &str, role: UserRole) -> PosResult<User> {
        validate_user_name(name)?;
        validate_pin(pin)?;

        if self.db.users().find_by_pin(pin).await?.is_some() {
            return Err(ValidationError::Duplicate {
                field: "pin".to_string(),
                value: "****".to_string(),
            }
            .into());
        }

        let user = self.db.users().insert(name.trim(), pin, role).await?;
        info!(user_id = user.id, name = %user.name, role = %user.role, "User created");
        Ok(user)
    }
}
