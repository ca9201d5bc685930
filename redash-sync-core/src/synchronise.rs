//! High-level pipelines: fetch (server → files) and push (files → server).
//!
//! # Fetch
//! Loads a full snapshot of the server, then writes queries and dashboards
//! through [`LocalStore`], merging into any documents that already exist.
//!
//! # Push
//! 1. Select the target data source (fails before any remote change).
//! 2. Load remote dashboards and create the missing ones, so links in
//!    visualizations can be resolved to their ids.
//! 3. Upload every saved query of the data source's type, dependencies first.
//! 4. Replace the widgets of every saved dashboard.
//!
//! # Error Handling
//! Transport, file and cycle errors stop the run immediately. Widgets that
//! cannot be resolved are collected in the returned [`SyncReport`].

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::{error, info};

use crate::contract::{paginate_dashboards, paginate_queries, record_name, RemoteStore};
use crate::dashboards::{create_missing_dashboards, update_dashboards};
use crate::datasource::select_data_source;
use crate::error::SyncError;
use crate::fetch::{load_snapshot, require_id, save_dashboards, save_queries, FetchSummary};
use crate::ids::DashboardSlugs;
use crate::local::LocalStore;
use crate::report::{Outcome, SyncReport};
use crate::upload::QueryUploader;

/// Pull every query and dashboard from the server into `store`.
pub async fn fetch<R: RemoteStore + ?Sized>(
    remote: &R,
    store: &LocalStore,
) -> Result<FetchSummary, SyncError> {
    info!(root = %store.root().display(), "[FETCH] Starting fetch");
    let snapshot = load_snapshot(remote).await?;

    let mut summary = save_queries(store, &snapshot.data_sources, &snapshot.queries)?;
    summary.dashboards_saved = save_dashboards(store, &snapshot.dashboards)?;

    info!(
        queries = summary.queries_saved,
        skipped = summary.queries_skipped,
        dashboards = summary.dashboards_saved,
        "[FETCH] Fetch complete"
    );
    Ok(summary)
}

/// Full dashboard records keyed by name.
async fn existing_dashboards<R: RemoteStore + ?Sized>(
    remote: &R,
) -> Result<BTreeMap<String, Value>, SyncError> {
    let mut dashboards = BTreeMap::new();
    for summary in paginate_dashboards(remote).await? {
        let dashboard = remote.get_dashboard(require_id(&summary, "dashboard")?).await?;
        if let Some(name) = record_name(&dashboard) {
            dashboards.insert(name.to_string(), dashboard);
        }
    }
    Ok(dashboards)
}

/// Full query records keyed by name.
async fn existing_queries<R: RemoteStore + ?Sized>(
    remote: &R,
) -> Result<HashMap<String, Value>, SyncError> {
    let mut queries = HashMap::new();
    for summary in paginate_queries(remote).await? {
        let query = remote.get_query(require_id(&summary, "query")?).await?;
        if let Some(name) = record_name(&query) {
            queries.insert(name.to_string(), query);
        }
    }
    Ok(queries)
}

/// Push the files in `store` to the server.
///
/// `data_source_name` selects the data source to attach queries to; it may be
/// omitted when the server has only one.
pub async fn push<R: RemoteStore + ?Sized>(
    remote: &R,
    store: &LocalStore,
    data_source_name: Option<&str>,
) -> Result<SyncReport, SyncError> {
    info!(root = %store.root().display(), "[PUSH] Starting push");

    let data_source = select_data_source(remote.list_data_sources().await?, data_source_name)?;
    info!(data_source = %data_source.name, kind = %data_source.kind, "[PUSH] Selected data source");

    let mut dashboards = existing_dashboards(remote).await?;
    let saved_dashboards = store.load_saved_dashboards()?;
    create_missing_dashboards(remote, &saved_dashboards, &mut dashboards).await?;
    let slugs = DashboardSlugs::from_records(dashboards.values());

    let queries = existing_queries(remote).await?;
    let saved_queries = store.load_saved_queries(&data_source)?;

    let mut uploader = QueryUploader::new(remote, &saved_queries, data_source.id, queries, &slugs);
    uploader.upload_all().await?;
    let uploads = uploader.into_state();

    let mut report = SyncReport {
        queries_uploaded: uploads.queries_uploaded(),
        visualizations_uploaded: uploads.visualizations_uploaded(),
        ..Default::default()
    };
    update_dashboards(remote, &saved_dashboards, &dashboards, &uploads, &mut report).await?;

    match report.outcome() {
        Outcome::Ok => info!(
            queries = report.queries_uploaded,
            dashboards = report.dashboards_updated,
            widgets = report.widgets_created,
            "[PUSH] Push complete"
        ),
        Outcome::Failed => error!(
            failures = report.failures.len(),
            "[PUSH] Push finished with unresolved widgets"
        ),
    }
    Ok(report)
}
