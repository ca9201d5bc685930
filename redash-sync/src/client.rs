#![doc = "Redash HTTP client: implements the core `RemoteStore` trait over the Redash REST API."]
//
//! # Redash client (CLI <-> Core)
//!
//! This module bridges the [`RemoteStore`] abstraction in `redash-sync-core`
//! to a real Redash server. All requests carry the user API key in an
//! `Authorization: Key <key>` header; non-2xx responses become errors.
//!
//! - Construct a [`RedashClient`] with the server URL and API key (see
//!   [`crate::load_config`] for where those come from).
//! - Every method logs the request it makes; failures are logged before they
//!   are returned.

use async_trait::async_trait;
use redash_sync_core::contract::{DataSource, NewWidget, Page, RemoteError, RemoteStore};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

pub struct RedashClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl RedashClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        tracing::info!(
            base_url = %base_url,
            api_key_set = !api_key.is_empty(),
            "Initialized RedashClient"
        );
        RedashClient {
            http: Client::new(),
            base_url,
            api_key: api_key.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path such as `api/queries/1`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("Authorization", format!("Key {}", self.api_key))
    }

    async fn execute(&self, request: RequestBuilder, path: &str) -> Result<Response, RemoteError> {
        let response = request.send().await.map_err(|e| {
            tracing::error!(error = ?e, path, "Request to Redash failed");
            e
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, path, body = %body, "Redash API returned error");
            return Err(format!("Redash API error {status} on {path}: {body}").into());
        }
        Ok(response)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, path: &str) -> Result<T, RemoteError> {
        let response = self.execute(request, path).await?;
        Ok(response.json::<T>().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
        tracing::debug!(path, "GET");
        self.send(self.request(Method::GET, path), path).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, RemoteError> {
        tracing::debug!(path, "POST");
        self.send(self.request(Method::POST, path).json(body), path)
            .await
    }
}

#[async_trait]
impl RemoteStore for RedashClient {
    async fn list_data_sources(&self) -> Result<Vec<DataSource>, RemoteError> {
        let sources: Vec<DataSource> = self.get("api/data_sources").await?;
        tracing::info!(count = sources.len(), "Listed data sources");
        Ok(sources)
    }

    async fn query_page(&self, page: u32, page_size: u32) -> Result<Page, RemoteError> {
        self.get(&format!("api/queries?page={page}&page_size={page_size}"))
            .await
    }

    async fn get_query(&self, id: i64) -> Result<Value, RemoteError> {
        self.get(&format!("api/queries/{id}")).await
    }

    async fn create_query(&self, query: &Value) -> Result<Value, RemoteError> {
        let created = self.post("api/queries", query).await?;
        tracing::info!(id = ?created.get("id"), "Created query");
        Ok(created)
    }

    async fn update_query(&self, id: i64, query: &Value) -> Result<Value, RemoteError> {
        self.post(&format!("api/queries/{id}"), query).await
    }

    async fn create_visualization(&self, visualization: &Value) -> Result<Value, RemoteError> {
        self.post("api/visualizations", visualization).await
    }

    async fn update_visualization(
        &self,
        id: i64,
        visualization: &Value,
    ) -> Result<Value, RemoteError> {
        self.post(&format!("api/visualizations/{id}"), visualization)
            .await
    }

    async fn dashboard_page(&self, page: u32, page_size: u32) -> Result<Page, RemoteError> {
        self.get(&format!("api/dashboards?page={page}&page_size={page_size}"))
            .await
    }

    async fn get_dashboard(&self, id: i64) -> Result<Value, RemoteError> {
        self.get(&format!("api/dashboards/{id}")).await
    }

    async fn create_dashboard(&self, name: &str) -> Result<Value, RemoteError> {
        let created = self.post("api/dashboards", &json!({ "name": name })).await?;
        tracing::info!(name, id = ?created.get("id"), "Created dashboard");
        Ok(created)
    }

    async fn update_dashboard(&self, id: i64, settings: &Value) -> Result<Value, RemoteError> {
        self.post(&format!("api/dashboards/{id}"), settings).await
    }

    async fn create_widget(&self, widget: NewWidget) -> Result<Value, RemoteError> {
        let body = serde_json::to_value(&widget)?;
        self.post("api/widgets", &body).await
    }

    async fn delete_widget(&self, id: i64) -> Result<(), RemoteError> {
        let path = format!("api/widgets/{id}");
        tracing::debug!(path = %path, "DELETE");
        self.execute(self.request(Method::DELETE, &path), &path).await?;
        tracing::info!(widget_id = id, "Deleted widget");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = RedashClient::new("http://localhost:5000/", "key");
        assert_eq!(client.base_url(), "http://localhost:5000");
        assert_eq!(client.url("api/queries/3"), "http://localhost:5000/api/queries/3");
        assert_eq!(client.url("/api/widgets"), "http://localhost:5000/api/widgets");
    }
}
