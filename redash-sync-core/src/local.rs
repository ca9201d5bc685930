//! On-disk layout of fetched queries and dashboards.
//!
//! ```text
//! <root>/queries/<data source type>/<name>.<syntax>            query body
//! <root>/queries/<data source type>/<name>.<syntax>.meta.yaml  query metadata
//! <root>/dashboards/<name>.yaml                                dashboard
//! ```
//!
//! Documents that do not exist yet read as an empty mapping, so the first fetch
//! and every later one go through the same merge path. Writes go through
//! [`crate::yaml::splice`], so comments an operator added to a document survive
//! every later fetch.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::contract::DataSource;
use crate::error::SyncError;
use crate::filename::make_filename;
use crate::merge::Document;
use crate::yaml;

pub const METAFILE_SUFFIX: &str = ".meta.yaml";
pub const QUERIES_DIR: &str = "queries";
pub const DASHBOARDS_DIR: &str = "dashboards";

/// A query as saved by fetch, ready to be pushed.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedQuery {
    pub name: String,
    /// Query text from the body file.
    pub body: String,
    /// Contents of the `.meta.yaml` side-car.
    pub metadata: Document,
}

/// Reads and writes the query and dashboard files under one root directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn queries_dir(&self, source: &DataSource) -> PathBuf {
        self.root.join(QUERIES_DIR).join(&source.kind)
    }

    pub fn dashboards_dir(&self) -> PathBuf {
        self.root.join(DASHBOARDS_DIR)
    }

    /// Path of a query's body file.
    pub fn query_body_path(&self, source: &DataSource, query_name: &str) -> PathBuf {
        self.queries_dir(source)
            .join(format!("{}.{}", make_filename(query_name), source.syntax))
    }

    /// Path of the metadata side-car belonging to a body file.
    pub fn metadata_path(body_path: &Path) -> PathBuf {
        let mut path = body_path.as_os_str().to_owned();
        path.push(METAFILE_SUFFIX);
        PathBuf::from(path)
    }

    pub fn dashboard_path(&self, dashboard_name: &str) -> PathBuf {
        self.dashboards_dir()
            .join(format!("{}.yaml", make_filename(dashboard_name)))
    }

    /// Write a query body verbatim, adding a trailing newline if missing.
    pub fn write_query_body(&self, path: &Path, body: &str) -> Result<(), SyncError> {
        ensure_parent(path)?;
        let mut contents = body.to_string();
        if !contents.ends_with('\n') {
            contents.push('\n');
        }
        fs::write(path, contents).map_err(SyncError::io(path))?;
        debug!(path = %path.display(), "Wrote query body");
        Ok(())
    }

    /// Read a YAML document. A missing file is an empty document.
    pub fn read_document(&self, path: &Path) -> Result<Document, SyncError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No existing document, starting empty");
                return Ok(Document::new());
            }
            Err(e) => return Err(SyncError::io(path)(e)),
        };
        parse_document(path, &text)
    }

    /// Write a YAML document, keeping the comments and layout of the file it replaces.
    ///
    /// Only top-level entries whose value changed are rendered again; a file
    /// whose content is already `document` is left untouched.
    pub fn write_document(&self, path: &Path, document: &Document) -> Result<(), SyncError> {
        ensure_parent(path)?;
        let previous = match fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(SyncError::io(path)(e)),
        };

        let spliced = previous
            .as_deref()
            .and_then(|text| yaml::splice(text, document));
        let text = match spliced {
            Some(text) => text,
            None => {
                if previous.as_deref().is_some_and(|text| !yaml::is_blank(text)) {
                    warn!(path = %path.display(), "Could not keep document layout, rewriting it in full");
                }
                yaml::render(document).map_err(|source| SyncError::Yaml {
                    path: path.to_path_buf(),
                    source,
                })?
            }
        };

        if previous.as_deref() == Some(text.as_str()) {
            debug!(path = %path.display(), "Document unchanged");
            return Ok(());
        }
        fs::write(path, text).map_err(SyncError::io(path))?;
        debug!(path = %path.display(), "Wrote document");
        Ok(())
    }

    /// Load every query saved for the given data source's type, keyed by name.
    pub fn load_saved_queries(
        &self,
        source: &DataSource,
    ) -> Result<BTreeMap<String, SavedQuery>, SyncError> {
        let dir = self.queries_dir(source);
        let mut queries = BTreeMap::new();
        for meta_path in list_files(&dir)? {
            let Some(file_name) = meta_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(body_name) = file_name.strip_suffix(METAFILE_SUFFIX) else {
                continue;
            };
            let body_path = dir.join(body_name);
            let metadata = self.read_document(&meta_path)?;
            let body = fs::read_to_string(&body_path).map_err(SyncError::io(&body_path))?;
            let name = document_name(&meta_path, &metadata)?;
            debug!(query = %name, path = %body_path.display(), "Loaded saved query");
            queries.insert(
                name.clone(),
                SavedQuery {
                    name,
                    body,
                    metadata,
                },
            );
        }
        info!(data_source_type = %source.kind, count = queries.len(), "Loaded saved queries");
        Ok(queries)
    }

    /// Load every saved dashboard, keyed by name.
    pub fn load_saved_dashboards(&self) -> Result<BTreeMap<String, Document>, SyncError> {
        let mut dashboards = BTreeMap::new();
        for path in list_files(&self.dashboards_dir())? {
            let document = self.read_document(&path)?;
            let name = document_name(&path, &document)?;
            dashboards.insert(name, document);
        }
        info!(count = dashboards.len(), "Loaded saved dashboards");
        Ok(dashboards)
    }
}

fn parse_document(path: &Path, text: &str) -> Result<Document, SyncError> {
    if yaml::is_blank(text) {
        return Ok(Document::new());
    }
    let value: Value = serde_yaml::from_str(text).map_err(|source| SyncError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Document::new()),
        other => Err(SyncError::InvalidDocument {
            path: path.to_path_buf(),
            reason: format!("expected a mapping at the top level, found {other}"),
        }),
    }
}

fn document_name(path: &Path, document: &Document) -> Result<String, SyncError> {
    document
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SyncError::InvalidDocument {
            path: path.to_path_buf(),
            reason: "missing 'name'".to_string(),
        })
}

fn ensure_parent(path: &Path) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(SyncError::io(parent))?;
    }
    Ok(())
}

/// Regular files in `dir`, sorted by path. A missing directory has no files.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %dir.display(), "Directory does not exist, nothing to load");
            return Ok(Vec::new());
        }
        Err(e) => return Err(SyncError::io(dir)(e)),
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(SyncError::io(dir))?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn postgres() -> DataSource {
        DataSource {
            id: 1,
            name: "main".into(),
            kind: "pg".into(),
            syntax: "sql".into(),
        }
    }

    #[test]
    fn paths_follow_layout() {
        let store = LocalStore::new("/repo");
        let body = store.query_body_path(&postgres(), "Daily Orders");
        assert_eq!(body, PathBuf::from("/repo/queries/pg/daily_orders.sql"));
        assert_eq!(
            LocalStore::metadata_path(&body),
            PathBuf::from("/repo/queries/pg/daily_orders.sql.meta.yaml")
        );
        assert_eq!(
            store.dashboard_path("Sales KPIs"),
            PathBuf::from("/repo/dashboards/sales_kpis.yaml")
        );
    }

    #[test]
    fn missing_document_reads_empty() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let doc = store.read_document(&dir.path().join("nope.yaml")).unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn malformed_document_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "- just\n- a list\n").unwrap();
        let store = LocalStore::new(dir.path());
        assert!(matches!(
            store.read_document(&path),
            Err(SyncError::InvalidDocument { .. })
        ));
    }

    #[test]
    fn rewrite_keeps_operator_comments() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let path = store.dashboard_path("Sales");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "# owned by finance team\nname: Sales\nslug: sales\n").unwrap();

        let mut document = store.read_document(&path).unwrap();
        document.insert("widgets".to_string(), json!([]));
        store.write_document(&path, &document).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "# owned by finance team\nname: Sales\nslug: sales\nwidgets: []\n"
        );
    }

    #[test]
    fn comment_only_document_reads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("new.yaml");
        fs::write(&path, "# to be filled by fetch\n").unwrap();
        let store = LocalStore::new(dir.path());
        assert!(store.read_document(&path).unwrap().is_empty());
    }

    #[test]
    fn body_gets_trailing_newline() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let path = store.query_body_path(&postgres(), "q");
        store.write_query_body(&path, "select 1").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "select 1\n");
        store.write_query_body(&path, "select 2\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "select 2\n");
    }

    #[test]
    fn saved_queries_load_by_name() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let body_path = store.query_body_path(&postgres(), "Daily Orders");
        store.write_query_body(&body_path, "select * from orders").unwrap();
        let meta = json!({ "name": "Daily Orders", "options": {} });
        let Value::Object(meta) = meta else { unreachable!() };
        store
            .write_document(&LocalStore::metadata_path(&body_path), &meta)
            .unwrap();

        let saved = store.load_saved_queries(&postgres()).unwrap();
        let query = &saved["Daily Orders"];
        assert_eq!(query.body, "select * from orders\n");
        assert_eq!(query.metadata["options"], json!({}));
    }

    #[test]
    fn missing_query_folder_loads_nothing() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(store.load_saved_queries(&postgres()).unwrap().is_empty());
        assert!(store.load_saved_dashboards().unwrap().is_empty());
    }
}
