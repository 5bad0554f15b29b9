//! # PostgREST Client
//!
//! [`RemoteStore`] over the REST interface of a hosted Postgres
//! (`/rest/v1/{table}`).
//!
//! ```text
//!  fetch_page    GET    /rest/v1/sales?select=*&order=id.asc&offset=0&limit=1000
//!  fetch_recent  GET    /rest/v1/sales?select=*&order=id.desc&limit=100
//!  exists        GET    /rest/v1/sales?select=id&id=eq.4821
//!  insert        POST   /rest/v1/sales                 Prefer: return=representation
//!  update        PATCH  /rest/v1/sales?id=eq.4821      Prefer: return=representation
//!  delete        DELETE /rest/v1/sales?id=eq.4821      Prefer: return=representation
//! ```
//!
//! Every request carries the access key twice: as `apikey` and as a bearer
//! token.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use kicks_core::SyncEntity;

use super::RemoteStore;
use crate::config::RemoteSettings;
use crate::error::{SyncError, SyncResult};

const RETURN_REPRESENTATION: &str = "return=representation";

/// HTTP client for the hosted store.
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    client: Client,
    rest_base: Url,
}

impl PostgrestClient {
    /// Builds a client; fails on a malformed URL or key.
    pub fn new(settings: &RemoteSettings) -> SyncResult<Self> {
        let rest_base = settings.base_url()?.join("rest/v1/")?;

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&settings.key)
            .map_err(|_| SyncError::InvalidConfig("remote key contains invalid characters".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", settings.key))
            .map_err(|_| SyncError::InvalidConfig("remote key contains invalid characters".into()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.request_timeout)
            .build()?;

        Ok(PostgrestClient { client, rest_base })
    }

    fn table_url(&self, entity: SyncEntity) -> SyncResult<Url> {
        Ok(self.rest_base.join(entity.table())?)
    }

    fn by_id(&self, builder: RequestBuilder, id: i64) -> RequestBuilder {
        builder.query(&[("id", format!("eq.{}", id))])
    }

    async fn rows(&self, request: RequestBuilder) -> SyncResult<Vec<Value>> {
        let response = check(request.send().await?).await?;
        Ok(response.json::<Vec<Value>>().await?)
    }
}

/// Maps non-2xx answers to [`SyncError::RemoteRejected`] with the body text.
async fn check(response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), body = %body, "Remote store rejected request");
    Err(SyncError::RemoteRejected {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RemoteStore for PostgrestClient {
    fn label(&self) -> String {
        self.rest_base.host_str().unwrap_or("remote").to_string()
    }

    async fn fetch_page(&self, entity: SyncEntity, offset: usize, limit: usize) -> SyncResult<Vec<Value>> {
        debug!(table = entity.table(), offset, limit, "Fetching remote page");
        let request = self.client.get(self.table_url(entity)?).query(&[
            ("select", "*".to_string()),
            ("order", "id.asc".to_string()),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ]);
        self.rows(request).await
    }

    async fn fetch_recent(&self, entity: SyncEntity, limit: usize) -> SyncResult<Vec<Value>> {
        let request = self.client.get(self.table_url(entity)?).query(&[
            ("select", "*".to_string()),
            ("order", "id.desc".to_string()),
            ("limit", limit.to_string()),
        ]);
        self.rows(request).await
    }

    async fn exists(&self, entity: SyncEntity, id: i64) -> SyncResult<bool> {
        let request = self
            .by_id(self.client.get(self.table_url(entity)?), id)
            .query(&[("select", "id")]);
        Ok(!self.rows(request).await?.is_empty())
    }

    async fn insert(&self, entity: SyncEntity, row: &Value) -> SyncResult<Value> {
        let request = self
            .client
            .post(self.table_url(entity)?)
            .header("Prefer", RETURN_REPRESENTATION)
            .json(row);
        self.rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::Mapping(format!("insert into {} returned no row", entity.table())))
    }

    async fn update(&self, entity: SyncEntity, id: i64, patch: &Value) -> SyncResult<()> {
        let request = self
            .by_id(self.client.patch(self.table_url(entity)?), id)
            .header("Prefer", RETURN_REPRESENTATION)
            .json(patch);
        if self.rows(request).await?.is_empty() {
            return Err(SyncError::RemoteNotFound {
                table: entity.table().to_string(),
                id,
            });
        }
        Ok(())
    }

    async fn delete(&self, entity: SyncEntity, id: i64) -> SyncResult<bool> {
        let request = self
            .by_id(self.client.delete(self.table_url(entity)?), id)
            .header("Prefer", RETURN_REPRESENTATION);
        Ok(!self.rows(request).await?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_urls() {
        let client = PostgrestClient::new(&RemoteSettings::new("https://shop.example.co", "anon")).unwrap();
        assert_eq!(
            client.table_url(SyncEntity::Sale).unwrap().as_str(),
            "https://shop.example.co/rest/v1/sales"
        );
        assert_eq!(client.label(), "shop.example.co");
    }

    #[test]
    fn test_rejects_bad_settings() {
        assert!(PostgrestClient::new(&RemoteSettings::new("not a url", "anon")).is_err());
        assert!(PostgrestClient::new(&RemoteSettings::new("https://shop.example.co", "bad\nkey")).is_err());
    }
}
