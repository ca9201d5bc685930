use std::path::PathBuf;

use crate::contract::RemoteError;

/// Every failure that aborts a fetch or push run.
///
/// Widget resolution problems are not represented here: they are collected in
/// [`crate::report::SyncReport`] and do not stop the run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("remote request failed: {0}")]
    Remote(RemoteError),

    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid document {path:?}: {reason}")]
    InvalidDocument { path: PathBuf, reason: String },

    #[error("data source selection failed: {0}")]
    DataSource(String),

    #[error("cyclic query dependency: {}", .chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },

    #[error("query '{referenced_by}' depends on query '{name}', which is not saved locally")]
    MissingQuery { name: String, referenced_by: String },

    #[error("unexpected server response: {0}")]
    MissingRemote(String),
}

impl From<RemoteError> for SyncError {
    fn from(e: RemoteError) -> Self {
        SyncError::Remote(e)
    }
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> SyncError {
        let path = path.into();
        move |source| SyncError::Io { path, source }
    }

    /// Configuration errors are reported to the operator with exit code 1
    /// rather than as a crash.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SyncError::DataSource(_))
    }
}
