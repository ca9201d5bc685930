//! Fetch pipeline: normalise server records and merge them into local files.
//!
//! Queries are handled in two passes. The whole query list is loaded and
//! indexed first, because a query's parameters can refer to any other query by
//! id and those ids have to be turned into names before anything is written.

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::contract::{
    paginate_dashboards, paginate_queries, record_id, record_name, DataSource, RemoteStore,
};
use crate::error::SyncError;
use crate::ids::{parameters_to_names, rewrite_link_columns, LinkDirection, QueryIndex};
use crate::local::LocalStore;
use crate::merge::{assign_if_changed, merge_fields, Document};

/// Query fields copied into the metadata document.
pub const QUERY_META_FIELDS: &[&str] = &[
    "name",
    "description",
    "is_archived",
    "is_draft",
    "is_favourite",
    "options",
    "schedule",
    "tags",
];

/// Visualization fields that change on every save and are never persisted.
pub const VISUALIZATION_IGNORE_FIELDS: &[&str] = &["id", "updated_at", "created_at"];

/// Dashboard fields copied into the dashboard document.
pub const DASHBOARD_FIELDS: &[&str] = &[
    "slug",
    "name",
    "layout",
    "dashboard_filters_enabled",
    "options",
    "is_archived",
    "is_draft",
    "tags",
];

/// Widget fields tied to one server instance, stripped before persistence.
pub const WIDGET_IGNORE_FIELDS: &[&str] = &[
    "dashboard_id",
    "id",
    "updated_at",
    "created_at",
    "query",
    "visualization",
];

/// Name of the visualization Redash adds to every new query.
pub const DEFAULT_TABLE_NAME: &str = "Table";

/// Everything fetch needs from the server, loaded up front.
#[derive(Debug, Clone, Default)]
pub struct RemoteSnapshot {
    pub data_sources: Vec<DataSource>,
    /// Full query records, including visualizations.
    pub queries: Vec<Value>,
    /// Full dashboard records, including widgets.
    pub dashboards: Vec<Value>,
}

/// What a fetch run wrote.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    pub queries_saved: usize,
    pub queries_skipped: usize,
    pub dashboards_saved: usize,
}

/// Load data sources, every query and every dashboard from the server.
pub async fn load_snapshot<R: RemoteStore + ?Sized>(remote: &R) -> Result<RemoteSnapshot, SyncError> {
    let data_sources = remote.list_data_sources().await?;
    info!(count = data_sources.len(), "[FETCH] Listed data sources");

    let mut queries = Vec::new();
    for summary in paginate_queries(remote).await? {
        let id = require_id(&summary, "query")?;
        queries.push(remote.get_query(id).await?);
    }
    info!(count = queries.len(), "[FETCH] Loaded queries");

    let mut dashboards = Vec::new();
    for summary in paginate_dashboards(remote).await? {
        let id = require_id(&summary, "dashboard")?;
        dashboards.push(remote.get_dashboard(id).await?);
    }
    info!(count = dashboards.len(), "[FETCH] Loaded dashboards");

    Ok(RemoteSnapshot {
        data_sources,
        queries,
        dashboards,
    })
}

pub(crate) fn require_id(record: &Value, kind: &str) -> Result<i64, SyncError> {
    record_id(record)
        .ok_or_else(|| SyncError::MissingRemote(format!("{kind} record without an id: {record}")))
}

/// True for the visualization Redash creates by default, as long as nobody changed it.
///
/// Churn fields aside, the record must be exactly the pristine table: any
/// other key means it was customised and is worth keeping.
pub fn is_default_table(visualization: &Value) -> bool {
    let Some(fields) = visualization.as_object() else {
        return false;
    };
    let mut stripped = fields.clone();
    for field in VISUALIZATION_IGNORE_FIELDS {
        stripped.shift_remove(*field);
    }
    Value::Object(stripped)
        == json!({ "type": "TABLE", "name": DEFAULT_TABLE_NAME, "options": {}, "description": "" })
}

/// Strip churn fields, anonymise links, drop the default table and sort by name.
pub fn normalize_visualizations(visualizations: &[Value]) -> Vec<Value> {
    let mut kept: Vec<Value> = visualizations
        .iter()
        .cloned()
        .map(|mut viz| {
            if let Some(fields) = viz.as_object_mut() {
                for field in VISUALIZATION_IGNORE_FIELDS {
                    fields.shift_remove(*field);
                }
            }
            rewrite_link_columns(&mut viz, LinkDirection::Fetch);
            viz
        })
        .filter(|viz| !is_default_table(viz))
        .collect();
    kept.sort_by(|a, b| record_name(a).cmp(&record_name(b)));
    kept
}

/// Merge a fetched query into its existing metadata document.
pub fn merge_query_metadata(
    stored: &mut Document,
    query: &Value,
    index: &QueryIndex,
) -> Result<usize, SyncError> {
    let mut query = query.clone();
    let name = record_name(&query).unwrap_or_default().to_string();
    if let Some(options) = query.get_mut("options") {
        parameters_to_names(&name, options, index)?;
    }
    let Value::Object(incoming) = &query else {
        return Err(SyncError::MissingRemote(format!("query '{name}' is not an object")));
    };

    let mut changed = merge_fields(stored, incoming, QUERY_META_FIELDS);
    if let Some(visualizations) = incoming.get("visualizations").and_then(Value::as_array) {
        let normalized = Value::Array(normalize_visualizations(visualizations));
        if assign_if_changed(stored, "visualizations", normalized) {
            changed += 1;
        }
    }
    Ok(changed)
}

/// Write body and metadata files for every query.
pub fn save_queries(
    store: &LocalStore,
    data_sources: &[DataSource],
    queries: &[Value],
) -> Result<FetchSummary, SyncError> {
    let sources: HashMap<i64, &DataSource> = data_sources.iter().map(|s| (s.id, s)).collect();
    let index = QueryIndex::from_records(queries);
    if index.is_empty() {
        info!("[FETCH] Server has no queries");
    } else {
        debug!(indexed = index.len(), "[FETCH] Built query index");
    }

    let mut summary = FetchSummary::default();
    for query in queries {
        let name = record_name(query).unwrap_or_default();
        let source = query
            .get("data_source_id")
            .and_then(Value::as_i64)
            .and_then(|id| sources.get(&id));
        let Some(source) = source else {
            warn!(query = %name, "[FETCH] Query has no known data source, skipping");
            summary.queries_skipped += 1;
            continue;
        };

        let body_path = store.query_body_path(source, name);
        let body = query.get("query").and_then(Value::as_str).unwrap_or_default();
        store.write_query_body(&body_path, body)?;

        let meta_path = LocalStore::metadata_path(&body_path);
        let mut metadata = store.read_document(&meta_path)?;
        let changed = merge_query_metadata(&mut metadata, query, &index)?;
        store.write_document(&meta_path, &metadata)?;

        info!(query = %name, path = %body_path.display(), changed, "[FETCH] Saved query");
        summary.queries_saved += 1;
    }
    Ok(summary)
}

fn widget_position(widget: &Value) -> (i64, i64) {
    let position = widget.get("options").and_then(|o| o.get("position"));
    let coordinate = |key: &str| {
        position
            .and_then(|p| p.get(key))
            .and_then(Value::as_i64)
            .unwrap_or(0)
    };
    (coordinate("row"), coordinate("col"))
}

/// Sort widgets by (row, col), strip churn fields and reduce visualizations to names.
pub fn normalize_widgets(widgets: &[Value]) -> Vec<Value> {
    let mut sorted: Vec<&Value> = widgets.iter().collect();
    sorted.sort_by_key(|widget| widget_position(widget));

    sorted
        .into_iter()
        .map(|widget| {
            let mut kept = Document::new();
            if let Some(fields) = widget.as_object() {
                for (key, value) in fields {
                    if !WIDGET_IGNORE_FIELDS.contains(&key.as_str()) {
                        kept.insert(key.clone(), value.clone());
                    }
                }
            }
            if let Some(viz) = widget.get("visualization").filter(|v| !v.is_null()) {
                let query_name = viz
                    .get("query")
                    .and_then(record_name)
                    .map(|n| Value::String(n.to_string()))
                    .unwrap_or(Value::Null);
                let mut reference = Document::new();
                reference.insert(
                    "name".to_string(),
                    viz.get("name").cloned().unwrap_or(Value::Null),
                );
                reference.insert("queryName".to_string(), query_name);
                kept.insert("visualization".to_string(), Value::Object(reference));
            }
            Value::Object(kept)
        })
        .collect()
}

/// Merge a fetched dashboard into its existing document.
pub fn merge_dashboard(stored: &mut Document, dashboard: &Value) -> usize {
    let Some(incoming) = dashboard.as_object() else {
        return 0;
    };
    let mut changed = merge_fields(stored, incoming, DASHBOARD_FIELDS);
    let widgets = incoming
        .get("widgets")
        .and_then(Value::as_array)
        .map(|w| normalize_widgets(w))
        .unwrap_or_default();
    if assign_if_changed(stored, "widgets", Value::Array(widgets)) {
        changed += 1;
    }
    changed
}

/// Write one document per dashboard.
pub fn save_dashboards(store: &LocalStore, dashboards: &[Value]) -> Result<usize, SyncError> {
    let mut saved = 0;
    for dashboard in dashboards {
        let name = record_name(dashboard).unwrap_or_default();
        let path = store.dashboard_path(name);
        let mut document = store.read_document(&path)?;
        let changed = merge_dashboard(&mut document, dashboard);
        store.write_document(&path, &document)?;
        info!(dashboard = %name, path = %path.display(), changed, "[FETCH] Saved dashboard");
        saved += 1;
    }
    Ok(saved)
}
