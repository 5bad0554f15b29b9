//! # Remote Settings
//!
//! The admin dashboard's "connect to the shop's store" form. Values are kept
//! in the settings table; [`kicks_sync::SyncConfig::resolve`] picks them up at
//! start-up and the returned [`RemoteSettings`] lets the running app swap the
//! engine's remote store on the spot (which triggers a full resync).

use tracing::info;

use kicks_core::User;
use kicks_db::{setting_keys, Database};
use kicks_sync::RemoteSettings;

use crate::error::{PosError, PosResult};
use crate::require_admin;

#[derive(Debug, Clone)]
pub struct SettingsService {
    db: Database,
}

impl SettingsService {
    pub fn new(db: Database) -> Self {
        SettingsService { db }
    }

    /// Stored endpoint and key, when both are set.
    pub async fn remote(&self) -> PosResult<Option<RemoteSettings>> {
        let settings = self.db.settings();
        let url = settings.get(setting_keys::REMOTE_URL).await?;
        let key = settings.get(setting_keys::REMOTE_KEY).await?;
        Ok(match (url, key) {
            (Some(url), Some(key)) if !url.trim().is_empty() && !key.trim().is_empty() => {
                Some(RemoteSettings::new(url.trim(), key.trim()))
            }
            _ => None,
        })
    }

    /// Stores a new endpoint and key.
    ///
    /// ## Errors
    /// - `Forbidden` unless `acting` is an admin
    /// - `Business` for an empty key
    /// - `Remote` for a URL the client could not use
    pub async fn set_remote(&self, acting: &User, url: &str, key: &str) -> PosResult<RemoteSettings> {
        require_admin(acting, "change the remote store")?;

        let remote = RemoteSettings::new(url.trim(), key.trim());
        if remote.key.is_empty() {
            return Err(PosError::business("remote key is required"));
        }
        remote.base_url()?;

        let settings = self.db.settings();
        settings.set(setting_keys::REMOTE_URL, &remote.url).await?;
        settings.set(setting_keys::REMOTE_KEY, &remote.key).await?;

        info!(url = %remote.url, by = %acting.name, "Remote store settings changed");
        Ok(remote)
    }

    /// Forgets the remote store; the till goes local-only.
    pub async fn clear_remote(&self, acting: &User) -> PosResult<()> {
        require_admin(acting, "change the remote store")?;
        let settings = self.db.settings();
        settings.remove(setting_keys::REMOTE_URL).await?;
        settings.remove(setting_keys::REMOTE_KEY).await?;
        info!(by = %acting.name, "Remote store settings cleared");
        Ok(())
    }
}
