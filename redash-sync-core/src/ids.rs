//! Translation between server ids and stable names.
//!
//! Server ids differ between Redash instances, so files only ever refer to
//! queries by name and to dashboards by slug. This module holds the lookup
//! tables for one run and the rewrites applied to query parameters and to
//! dashboard links inside visualization columns.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use crate::contract::{record_id, record_name};
use crate::error::SyncError;

/// Id written into dashboard links on disk in place of the real one.
pub const PLACEHOLDER_DASHBOARD_ID: i64 = 0;

static DASHBOARD_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/dashboards/([0-9]+)-([a-z0-9-]+)(\?.*)?$").expect("valid regex")
});

/// Query name <-> id lookup for every query known in the current run.
#[derive(Debug, Default, Clone)]
pub struct QueryIndex {
    by_id: HashMap<i64, String>,
    by_name: HashMap<String, i64>,
}

impl QueryIndex {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut index = QueryIndex::default();
        for record in records {
            if let (Some(id), Some(name)) = (record_id(record), record_name(record)) {
                index.insert(id, name);
            }
        }
        index
    }

    pub fn insert(&mut self, id: i64, name: &str) {
        self.by_id.insert(id, name.to_string());
        self.by_name.insert(name.to_string(), id);
    }

    pub fn name_of(&self, id: i64) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn id_of(&self, name: &str) -> Option<i64> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Dashboard slug -> id lookup.
#[derive(Debug, Default, Clone)]
pub struct DashboardSlugs {
    by_slug: HashMap<String, i64>,
}

impl DashboardSlugs {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut slugs = DashboardSlugs::default();
        for record in records {
            let slug = record.get("slug").and_then(Value::as_str);
            if let (Some(id), Some(slug)) = (record_id(record), slug) {
                slugs.insert(id, slug);
            }
        }
        slugs
    }

    pub fn insert(&mut self, id: i64, slug: &str) {
        self.by_slug.insert(slug.to_string(), id);
    }

    pub fn id_of(&self, slug: &str) -> Option<i64> {
        self.by_slug.get(slug).copied()
    }
}

/// Replace the dashboard id in a `/dashboards/<id>-<slug>` link with the placeholder.
///
/// Anything that is not such a link is returned unchanged.
pub fn anonymize_dashboard_link(url: &str) -> String {
    match DASHBOARD_LINK.captures(url) {
        Some(caps) => format!(
            "/dashboards/{}-{}{}",
            PLACEHOLDER_DASHBOARD_ID,
            &caps[2],
            caps.get(3).map_or("", |m| m.as_str())
        ),
        None => url.to_string(),
    }
}

/// Put the real dashboard id back into a link by looking up its slug.
///
/// An unknown slug is not fatal: the link is kept as it is and a warning logged.
pub fn resolve_dashboard_link(url: &str, dashboards: &DashboardSlugs) -> String {
    let Some(caps) = DASHBOARD_LINK.captures(url) else {
        return url.to_string();
    };
    let slug = &caps[2];
    match dashboards.id_of(slug) {
        Some(id) => format!(
            "/dashboards/{}-{}{}",
            id,
            slug,
            caps.get(3).map_or("", |m| m.as_str())
        ),
        None => {
            warn!(slug, url, "Could not find dashboard with slug; keeping link unchanged");
            url.to_string()
        }
    }
}

/// Which way link templates are being rewritten.
#[derive(Debug, Clone, Copy)]
pub enum LinkDirection<'a> {
    /// Server to disk: ids become the placeholder.
    Fetch,
    /// Disk to server: placeholders become the ids of these dashboards.
    Push(&'a DashboardSlugs),
}

/// Rewrite `linkUrlTemplate` of every `displayAs: link` column of a visualization.
pub fn rewrite_link_columns(visualization: &mut Value, direction: LinkDirection<'_>) {
    let Some(columns) = visualization
        .get_mut("options")
        .and_then(|options| options.get_mut("columns"))
        .and_then(Value::as_array_mut)
    else {
        return;
    };

    for column in columns.iter_mut() {
        if column.get("displayAs").and_then(Value::as_str) != Some("link") {
            continue;
        }
        let Some(template) = column.get("linkUrlTemplate").and_then(Value::as_str) else {
            continue;
        };
        let rewritten = match direction {
            LinkDirection::Fetch => anonymize_dashboard_link(template),
            LinkDirection::Push(dashboards) => resolve_dashboard_link(template, dashboards),
        };
        column["linkUrlTemplate"] = Value::String(rewritten);
    }
}

fn query_parameters_mut(options: &mut Value) -> impl Iterator<Item = &mut Map<String, Value>> {
    options
        .get_mut("parameters")
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object_mut)
        .filter(|param| param.get("type").and_then(Value::as_str) == Some("query"))
}

/// Swap `queryId` for `queryName` on every query-typed parameter.
pub fn parameters_to_names(
    query_name: &str,
    options: &mut Value,
    index: &QueryIndex,
) -> Result<(), SyncError> {
    for param in query_parameters_mut(options) {
        let Some(id) = param.get("queryId").and_then(Value::as_i64) else {
            continue;
        };
        let name = index.name_of(id).ok_or_else(|| {
            SyncError::MissingRemote(format!(
                "query '{query_name}' has a parameter referring to unknown query id {id}"
            ))
        })?;
        param.shift_remove("queryId");
        param.insert("queryName".to_string(), Value::String(name.to_string()));
    }
    Ok(())
}

/// Names of the queries that query-typed parameters refer to, in parameter order.
pub fn referenced_query_names(options: &Value) -> Vec<String> {
    options
        .get("parameters")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|param| param.get("type").and_then(Value::as_str) == Some("query"))
        .filter_map(|param| param.get("queryName").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// Swap `queryName` for `queryId` on every query-typed parameter.
///
/// Every referenced query must already have an id in `uploaded`.
pub fn parameters_to_ids(
    query_name: &str,
    options: &mut Value,
    uploaded: &QueryIndex,
) -> Result<(), SyncError> {
    for param in query_parameters_mut(options) {
        let Some(name) = param.get("queryName").and_then(Value::as_str) else {
            continue;
        };
        let id = uploaded.id_of(name).ok_or_else(|| SyncError::MissingQuery {
            name: name.to_string(),
            referenced_by: query_name.to_string(),
        })?;
        param.shift_remove("queryName");
        param.insert("queryId".to_string(), Value::from(id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn link_round_trips_through_placeholder() {
        let fetched = anonymize_dashboard_link("/dashboards/3-class-summary?p_class=1");
        assert_eq!(fetched, "/dashboards/0-class-summary?p_class=1");

        let slugs = DashboardSlugs::from_records(&[json!({ "id": 7, "slug": "class-summary" })]);
        assert_eq!(
            resolve_dashboard_link(&fetched, &slugs),
            "/dashboards/7-class-summary?p_class=1"
        );
    }

    #[test]
    fn link_without_query_string_is_rewritten() {
        assert_eq!(anonymize_dashboard_link("/dashboards/12-sales"), "/dashboards/0-sales");
    }

    #[test]
    fn unknown_slug_keeps_link() {
        let slugs = DashboardSlugs::default();
        assert_eq!(
            resolve_dashboard_link("/dashboards/0-gone?x=1", &slugs),
            "/dashboards/0-gone?x=1"
        );
    }

    #[test]
    fn other_links_are_untouched() {
        assert_eq!(anonymize_dashboard_link("https://example.com/a"), "https://example.com/a");
        assert_eq!(anonymize_dashboard_link("/queries/3-x"), "/queries/3-x");
    }

    #[test]
    fn only_link_columns_are_rewritten() {
        let mut viz = json!({
            "options": { "columns": [
                { "name": "a", "displayAs": "link", "linkUrlTemplate": "/dashboards/4-kpi?p={{ a }}" },
                { "name": "b", "displayAs": "string", "linkUrlTemplate": "/dashboards/4-kpi" }
            ]}
        });
        rewrite_link_columns(&mut viz, LinkDirection::Fetch);
        assert_eq!(viz["options"]["columns"][0]["linkUrlTemplate"], "/dashboards/0-kpi?p={{ a }}");
        assert_eq!(viz["options"]["columns"][1]["linkUrlTemplate"], "/dashboards/4-kpi");
    }

    #[test]
    fn query_index_maps_both_ways() {
        let index = QueryIndex::from_records(&[json!({ "id": 5, "name": "Customers" })]);
        assert_eq!(index.name_of(5), Some("Customers"));
        assert_eq!(index.id_of("Customers"), Some(5));
        assert_eq!(index.id_of("Orders"), None);
    }

    #[test]
    fn parameters_swap_between_id_and_name() {
        let index = QueryIndex::from_records(&[json!({ "id": 5, "name": "Customers" })]);
        let mut options = json!({ "parameters": [
            { "name": "customer", "type": "query", "queryId": 5 },
            { "name": "from", "type": "date" }
        ]});

        parameters_to_names("Orders", &mut options, &index).unwrap();
        assert_eq!(options["parameters"][0]["queryName"], "Customers");
        assert!(options["parameters"][0].get("queryId").is_none());
        assert_eq!(referenced_query_names(&options), vec!["Customers".to_string()]);

        let mut uploaded = QueryIndex::default();
        uploaded.insert(42, "Customers");
        parameters_to_ids("Orders", &mut options, &uploaded).unwrap();
        assert_eq!(options["parameters"][0]["queryId"], 42);
        assert!(options["parameters"][0].get("queryName").is_none());
    }

    #[test]
    fn unknown_parameter_query_id_is_an_error() {
        let mut options = json!({ "parameters": [{ "type": "query", "queryId": 9 }] });
        let err = parameters_to_names("Orders", &mut options, &QueryIndex::default());
        assert!(matches!(err, Err(SyncError::MissingRemote(_))));
    }
}
