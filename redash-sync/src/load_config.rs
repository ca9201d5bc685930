/// `load_config` module: turns parsed command-line arguments (with their
/// environment fallbacks) into a validated [`SyncConfig`].
///
/// # Responsibilities
/// - Trim the server URL and reject an empty one
/// - Reject an empty API key
/// - Parse the log level, accepting the usual names in any case plus `CRITICAL`
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{bail, Result};
use std::path::PathBuf;
use tracing::{error, info, Level};

use crate::cli::ConnectionArgs;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub redash_url: String,
    pub api_key: String,
    pub root: PathBuf,
    pub data_source_name: Option<String>,
}

/// Parse a log level name such as `info`, `DEBUG` or `critical`.
pub fn parse_log_level(raw: &str) -> Result<Level> {
    let level = match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" | "critical" => Level::ERROR,
        other => bail!("Invalid log level: {other}"),
    };
    Ok(level)
}

/// Validate connection arguments into a run configuration.
pub fn load_config(args: &ConnectionArgs, data_source_name: Option<String>) -> Result<SyncConfig> {
    let redash_url = args.redash_url.trim().trim_end_matches('/').to_string();
    if redash_url.is_empty() {
        error!("Redash URL is empty");
        bail!("Redash URL must not be empty (set --redash-url or REDASH_URL)");
    }
    if args.api_key.trim().is_empty() {
        error!("API key is empty");
        bail!("API key must not be empty (set --api-key or REDASH_API_KEY)");
    }

    let data_source_name = data_source_name.filter(|name| !name.trim().is_empty());
    info!(
        redash_url = %redash_url,
        root = %args.root.display(),
        data_source = data_source_name.as_deref().unwrap_or("<auto>"),
        "Config loaded"
    );

    Ok(SyncConfig {
        redash_url,
        api_key: args.api_key.trim().to_string(),
        root: args.root.clone(),
        data_source_name,
    })
}
