///
/// This module implements the CLI surface of redash-sync: argument parsing,
/// environment fallbacks and the async [`run`] entrypoint shared by `main` and
/// the integration tests.
///
/// All synchronisation logic lives in the `redash-sync-core` crate; this module
/// only wires configuration, the HTTP client and the local store together.
///
/// ## Exit codes
/// `run` returns the process exit code: `0` on success, `1` when a push left
/// widgets unresolved or no data source could be selected.
use crate::client::RedashClient;
use crate::load_config::load_config;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use redash_sync_core::local::LocalStore;
use redash_sync_core::synchronise::{fetch, push};
use std::path::PathBuf;

/// CLI for redash-sync: keep Redash queries and dashboards in version control.
#[derive(Parser)]
#[clap(
    name = "redash-sync",
    version,
    about = "Fetch Redash queries and dashboards into files, and push them back"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Log level (TRACE, DEBUG, INFO, WARNING, ERROR, CRITICAL)
    #[clap(long, global = true, default_value = "INFO")]
    pub log_level: String,
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// The base URL of the redash server, for example http://localhost:5000/
    #[clap(long = "redash-url", env = "REDASH_URL")]
    pub redash_url: String,

    /// User API Key
    #[clap(long = "api-key", env = "REDASH_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Directory holding the `queries` and `dashboards` folders
    #[clap(long, default_value = ".")]
    pub root: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download all queries and dashboards from the server into files
    Fetch {
        #[clap(flatten)]
        connection: ConnectionArgs,
    },
    /// Upload saved queries and dashboards to the server
    Push {
        #[clap(flatten)]
        connection: ConnectionArgs,

        /// Name of the redash data source to attach the queries to. All saved
        /// queries of its type are uploaded. Not required if the server has
        /// only a single data source.
        #[clap(long = "data-source-name", env = "REDASH_DATA_SOURCE")]
        data_source_name: Option<String>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main().
///
/// Returns the exit code the process should end with.
pub async fn run(cli: Cli) -> Result<i32> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Fetch { connection } => {
            let config = load_config(&connection, None)?;
            let client = RedashClient::new(&config.redash_url, &config.api_key);
            let store = LocalStore::new(&config.root);
            tracing::info!(command = "fetch", "Starting fetch");
            match fetch(&client, &store).await {
                Ok(summary) => {
                    tracing::info!(command = "fetch", ?summary, "Fetch complete");
                    Ok(0)
                }
                Err(e) => {
                    tracing::error!(command = "fetch", error = %e, "Fetch failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
        Commands::Push {
            connection,
            data_source_name,
        } => {
            let config = load_config(&connection, data_source_name)?;
            let client = RedashClient::new(&config.redash_url, &config.api_key);
            let store = LocalStore::new(&config.root);
            tracing::info!(command = "push", "Starting push");
            match push(&client, &store, config.data_source_name.as_deref()).await {
                Ok(report) => {
                    for failure in &report.failures {
                        tracing::error!(command = "push", %failure, "Widget not restored");
                    }
                    tracing::info!(command = "push", ?report, "Push complete");
                    Ok(report.outcome().exit_code())
                }
                Err(e) if e.is_configuration() => {
                    tracing::error!(command = "push", error = %e, "No data source found");
                    Ok(1)
                }
                Err(e) => {
                    tracing::error!(command = "push", error = %e, "Push failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
    }
}
