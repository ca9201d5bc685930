//! Dependency-ordered upload of saved queries and their visualizations.
//!
//! A query whose parameters take their values from another query can only be
//! sent once that other query has a server id. [`QueryUploader::upload_query`]
//! therefore works out the chain of not-yet-uploaded dependencies first, fails
//! on cycles, and uploads the chain leaves first. Every id it obtains is kept in
//! [`UploadState`], so each query is created/updated at most once per run no
//! matter how many other queries depend on it.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, info};

use crate::contract::{record_id, record_name, RemoteStore};
use crate::error::SyncError;
use crate::fetch::{require_id, DEFAULT_TABLE_NAME};
use crate::ids::{
    parameters_to_ids, referenced_query_names, rewrite_link_columns, DashboardSlugs, LinkDirection,
    QueryIndex,
};
use crate::local::SavedQuery;

/// Ids obtained from the server during one push run.
#[derive(Debug, Default, Clone)]
pub struct UploadState {
    query_ids: QueryIndex,
    visualization_ids: HashMap<(String, String), i64>,
    default_tables: HashMap<String, i64>,
}

impl UploadState {
    pub fn query_id(&self, query_name: &str) -> Option<i64> {
        self.query_ids.id_of(query_name)
    }

    /// Id of a saved visualization, falling back to the server's default
    /// "Table" visualization when that name was never customised and saved.
    pub fn resolve_visualization(&self, query_name: &str, visualization_name: &str) -> Option<i64> {
        self.visualization_ids
            .get(&(query_name.to_string(), visualization_name.to_string()))
            .copied()
            .or_else(|| {
                (visualization_name == DEFAULT_TABLE_NAME)
                    .then(|| self.default_tables.get(query_name).copied())
                    .flatten()
            })
    }

    pub fn queries_uploaded(&self) -> usize {
        self.query_ids.len()
    }

    pub fn visualizations_uploaded(&self) -> usize {
        self.visualization_ids.len()
    }
}

/// Uploads saved queries to the server, dependencies first.
pub struct QueryUploader<'a, R: RemoteStore + ?Sized> {
    remote: &'a R,
    saved: &'a BTreeMap<String, SavedQuery>,
    data_source_id: i64,
    /// Full server records keyed by name; grows as queries are created.
    existing: HashMap<String, Value>,
    dashboards: &'a DashboardSlugs,
    state: UploadState,
}

impl<'a, R: RemoteStore + ?Sized> QueryUploader<'a, R> {
    pub fn new(
        remote: &'a R,
        saved: &'a BTreeMap<String, SavedQuery>,
        data_source_id: i64,
        existing: HashMap<String, Value>,
        dashboards: &'a DashboardSlugs,
    ) -> Self {
        Self {
            remote,
            saved,
            data_source_id,
            existing,
            dashboards,
            state: UploadState::default(),
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn into_state(self) -> UploadState {
        self.state
    }

    /// Upload every saved query.
    pub async fn upload_all(&mut self) -> Result<(), SyncError> {
        let saved = self.saved;
        for name in saved.keys() {
            self.upload_query(name).await?;
        }
        info!(
            queries = self.state.queries_uploaded(),
            visualizations = self.state.visualizations_uploaded(),
            "[PUSH] Uploaded queries"
        );
        Ok(())
    }

    /// Upload one query and everything it depends on; returns its server id.
    ///
    /// Returns immediately if the query was already uploaded in this run.
    pub async fn upload_query(&mut self, name: &str) -> Result<i64, SyncError> {
        if let Some(id) = self.state.query_id(name) {
            debug!(query = %name, id, "[PUSH] Query already uploaded");
            return Ok(id);
        }
        for pending in self.dependency_order(name)? {
            self.upload_one(&pending).await?;
        }
        self.state
            .query_id(name)
            .ok_or_else(|| SyncError::MissingRemote(format!("query '{name}' was not uploaded")))
    }

    /// Not-yet-uploaded queries needed for `root`, dependencies before dependents.
    pub fn dependency_order(&self, root: &str) -> Result<Vec<String>, SyncError> {
        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut path = Vec::new();
        self.visit(root, None, &mut path, &mut done, &mut order)?;
        Ok(order)
    }

    fn visit(
        &self,
        name: &str,
        referenced_by: Option<&str>,
        path: &mut Vec<String>,
        done: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<(), SyncError> {
        if done.contains(name) || self.state.query_id(name).is_some() {
            return Ok(());
        }
        if let Some(start) = path.iter().position(|p| p == name) {
            let mut chain = path[start..].to_vec();
            chain.push(name.to_string());
            return Err(SyncError::CyclicDependency { chain });
        }
        let query = self.saved.get(name).ok_or_else(|| SyncError::MissingQuery {
            name: name.to_string(),
            referenced_by: referenced_by.unwrap_or(name).to_string(),
        })?;

        path.push(name.to_string());
        if let Some(options) = query.metadata.get("options") {
            for dependency in referenced_query_names(options) {
                self.visit(&dependency, Some(name), path, done, order)?;
            }
        }
        path.pop();

        done.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }

    /// The request body for creating/updating a saved query.
    fn query_payload(&self, saved: &SavedQuery) -> Result<Value, SyncError> {
        let mut payload = saved.metadata.clone();
        payload.shift_remove("visualizations");
        if let Some(options) = payload.get_mut("options") {
            parameters_to_ids(&saved.name, options, &self.state.query_ids)?;
        }
        payload.insert("query".to_string(), Value::String(saved.body.clone()));
        payload.insert("data_source_id".to_string(), Value::from(self.data_source_id));
        Ok(Value::Object(payload))
    }

    async fn upload_one(&mut self, name: &str) -> Result<i64, SyncError> {
        let saved_queries = self.saved;
        let saved = saved_queries.get(name).ok_or_else(|| SyncError::MissingQuery {
            name: name.to_string(),
            referenced_by: name.to_string(),
        })?;
        let payload = self.query_payload(saved)?;

        if !self.existing.contains_key(name) {
            info!(query = %name, "[PUSH] Creating query");
            let created = self.remote.create_query(&payload).await?;
            self.existing.insert(name.to_string(), created);
        }

        // Update even right after creating, so the draft/published state matches the file.
        let remote_query = &self.existing[name];
        let query_id = require_id(remote_query, "query")?;
        info!(query = %name, id = query_id, "[PUSH] Updating query");
        self.remote.update_query(query_id, &payload).await?;
        self.state.query_ids.insert(query_id, name);

        let existing_visualizations: HashMap<String, i64> = remote_query
            .get("visualizations")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|viz| Some((record_name(viz)?.to_string(), record_id(viz)?)))
            .collect();

        let saved_visualizations = saved
            .metadata
            .get("visualizations")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for mut visualization in saved_visualizations {
            let viz_name = record_name(&visualization).unwrap_or_default().to_string();
            visualization["query_id"] = Value::from(query_id);
            rewrite_link_columns(&mut visualization, LinkDirection::Push(self.dashboards));

            let uploaded = match existing_visualizations.get(&viz_name) {
                Some(&viz_id) => {
                    info!(query = %name, visualization = %viz_name, "[PUSH] Updating visualization");
                    self.remote.update_visualization(viz_id, &visualization).await?
                }
                None => {
                    info!(query = %name, visualization = %viz_name, "[PUSH] Creating visualization");
                    self.remote.create_visualization(&visualization).await?
                }
            };
            let viz_id = require_id(&uploaded, "visualization")?;
            self.state
                .visualization_ids
                .insert((name.to_string(), viz_name), viz_id);
        }

        if let Some(&table_id) = existing_visualizations.get(DEFAULT_TABLE_NAME) {
            self.state.default_tables.insert(name.to_string(), table_id);
        }

        Ok(query_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockRemoteStore;
    use serde_json::json;

    fn saved(name: &str, depends_on: &[&str]) -> SavedQuery {
        let parameters: Vec<Value> = depends_on
            .iter()
            .map(|dep| json!({ "name": dep, "type": "query", "queryName": dep }))
            .collect();
        let Value::Object(metadata) = json!({
            "name": name,
            "options": { "parameters": parameters },
            "visualizations": []
        }) else {
            unreachable!()
        };
        SavedQuery {
            name: name.to_string(),
            body: "select 1\n".to_string(),
            metadata,
        }
    }

    fn saved_set(queries: Vec<SavedQuery>) -> BTreeMap<String, SavedQuery> {
        queries.into_iter().map(|q| (q.name.clone(), q)).collect()
    }

    #[test]
    fn dependencies_come_first() {
        let remote = MockRemoteStore::new();
        let slugs = DashboardSlugs::default();
        let queries = saved_set(vec![
            saved("a", &["b", "c"]),
            saved("b", &["c"]),
            saved("c", &[]),
        ]);
        let uploader = QueryUploader::new(&remote, &queries, 1, HashMap::new(), &slugs);
        assert_eq!(uploader.dependency_order("a").unwrap(), vec!["c", "b", "a"]);
    }

    #[test]
    fn cycles_are_reported() {
        let remote = MockRemoteStore::new();
        let slugs = DashboardSlugs::default();
        let queries = saved_set(vec![saved("a", &["b"]), saved("b", &["a"])]);
        let uploader = QueryUploader::new(&remote, &queries, 1, HashMap::new(), &slugs);
        match uploader.dependency_order("a") {
            Err(SyncError::CyclicDependency { chain }) => assert_eq!(chain, vec!["a", "b", "a"]),
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn missing_dependency_is_reported() {
        let remote = MockRemoteStore::new();
        let slugs = DashboardSlugs::default();
        let queries = saved_set(vec![saved("a", &["ghost"])]);
        let uploader = QueryUploader::new(&remote, &queries, 1, HashMap::new(), &slugs);
        assert!(matches!(
            uploader.dependency_order("a"),
            Err(SyncError::MissingQuery { ref name, ref referenced_by }) if name == "ghost" && referenced_by == "a"
        ));
    }

    #[test]
    fn default_table_resolves_through_fallback() {
        let mut state = UploadState::default();
        state.default_tables.insert("q".to_string(), 77);
        state
            .visualization_ids
            .insert(("q".to_string(), "Chart".to_string()), 5);

        assert_eq!(state.resolve_visualization("q", "Chart"), Some(5));
        assert_eq!(state.resolve_visualization("q", "Table"), Some(77));
        assert_eq!(state.resolve_visualization("q", "Pie"), None);
        assert_eq!(state.resolve_visualization("other", "Table"), None);
    }
}
