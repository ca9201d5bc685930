//! # contract: interface to the Redash server
//!
//! This module defines the [`RemoteStore`] trait and its supporting types. The
//! fetch pipeline, the upload engine and the dashboard reconciler only ever
//! talk to the server through this trait, so they can run against the real
//! HTTP client in the `redash-sync` binary or against a mock in tests.
//!
//! ## Payloads
//! - Queries, visualizations and dashboards are passed as raw JSON values.
//!   The engine only touches the fields it needs; everything else the server
//!   sends is carried through untouched.
//! - Data sources and list pages are small and stable, so they are typed.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; `MockRemoteStore` is exported under
//!   the `test-export-mocks` feature for integration tests.
//!
//! ## Pagination
//! - [`paginate_queries`] and [`paginate_dashboards`] walk the list endpoints
//!   page by page and return every summary record.

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Error type for all remote operations (boxed, as transport errors vary).
pub type RemoteError = Box<dyn std::error::Error + Send + Sync>;

/// Page size used when listing queries and dashboards.
pub const PAGE_SIZE: u32 = 100;

/// A data source (database connection) as listed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: i64,
    pub name: String,
    /// Connection type, e.g. `pg`; used as the folder name for its queries.
    #[serde(rename = "type")]
    pub kind: String,
    /// Query syntax, e.g. `sql`; used as the query body file extension.
    #[serde(default = "default_syntax")]
    pub syntax: String,
}

fn default_syntax() -> String {
    "sql".to_string()
}

/// One page of a paginated list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub count: u64,
    pub page: u32,
    pub page_size: u32,
    pub results: Vec<Value>,
}

/// The data needed to place a widget on a dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewWidget {
    pub dashboard_id: i64,
    /// `None` for text widgets.
    pub visualization_id: Option<i64>,
    pub text: String,
    pub options: Value,
    pub width: i64,
}

/// CRUD access to a Redash server.
///
/// All methods are async and block the caller's flow until the server has
/// answered; callers await them one at a time.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List all data sources.
    async fn list_data_sources(&self) -> Result<Vec<DataSource>, RemoteError>;

    /// Fetch one page of query summaries (1-based page number).
    async fn query_page(&self, page: u32, page_size: u32) -> Result<Page, RemoteError>;

    /// Fetch a full query, including its visualizations.
    async fn get_query(&self, id: i64) -> Result<Value, RemoteError>;

    async fn create_query(&self, query: &Value) -> Result<Value, RemoteError>;

    async fn update_query(&self, id: i64, query: &Value) -> Result<Value, RemoteError>;

    async fn create_visualization(&self, visualization: &Value) -> Result<Value, RemoteError>;

    async fn update_visualization(
        &self,
        id: i64,
        visualization: &Value,
    ) -> Result<Value, RemoteError>;

    /// Fetch one page of dashboard summaries (1-based page number).
    async fn dashboard_page(&self, page: u32, page_size: u32) -> Result<Page, RemoteError>;

    /// Fetch a full dashboard, including its widgets.
    async fn get_dashboard(&self, id: i64) -> Result<Value, RemoteError>;

    /// Create an empty dashboard with the given name.
    async fn create_dashboard(&self, name: &str) -> Result<Value, RemoteError>;

    async fn update_dashboard(&self, id: i64, settings: &Value) -> Result<Value, RemoteError>;

    async fn create_widget(&self, widget: NewWidget) -> Result<Value, RemoteError>;

    async fn delete_widget(&self, id: i64) -> Result<(), RemoteError>;
}

#[derive(Debug, Clone, Copy)]
enum Listing {
    Queries,
    Dashboards,
}

async fn paginate<R: RemoteStore + ?Sized>(
    remote: &R,
    listing: Listing,
) -> Result<Vec<Value>, RemoteError> {
    let mut items = Vec::new();
    let mut page = 1;
    loop {
        let response = match listing {
            Listing::Queries => remote.query_page(page, PAGE_SIZE).await?,
            Listing::Dashboards => remote.dashboard_page(page, PAGE_SIZE).await?,
        };
        let received = response.results.len();
        items.extend(response.results);
        debug!(?listing, page, received, total = response.count, "Fetched list page");
        if received == 0 || items.len() as u64 >= response.count {
            break;
        }
        page += 1;
    }
    Ok(items)
}

/// Summaries of every query on the server.
pub async fn paginate_queries<R: RemoteStore + ?Sized>(remote: &R) -> Result<Vec<Value>, RemoteError> {
    paginate(remote, Listing::Queries).await
}

/// Summaries of every dashboard on the server.
pub async fn paginate_dashboards<R: RemoteStore + ?Sized>(
    remote: &R,
) -> Result<Vec<Value>, RemoteError> {
    paginate(remote, Listing::Dashboards).await
}

/// The numeric `id` of a server record, if present.
pub fn record_id(record: &Value) -> Option<i64> {
    record.get("id").and_then(Value::as_i64)
}

/// The `name` of a server record, if present.
pub fn record_name(record: &Value) -> Option<&str> {
    record.get("name").and_then(Value::as_str)
}
