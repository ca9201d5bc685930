#![doc = "redash-sync-core: synchronisation engine for redash-sync."]

//! This crate holds the logic that moves Redash queries, visualizations and
//! dashboards between a server and a directory of version-controlled files.
//! HTTP transport lives in the `redash-sync` binary crate; everything here talks
//! to the server through the [`contract::RemoteStore`] trait.
//!
//! # Usage
//! Call [`synchronise::fetch`] to pull server state into files and
//! [`synchronise::push`] to upload the files back.

pub mod contract;
pub mod dashboards;
pub mod datasource;
pub mod error;
pub mod fetch;
pub mod filename;
pub mod ids;
pub mod local;
pub mod merge;
pub mod report;
pub mod synchronise;
pub mod upload;
pub mod yaml;

pub use error::SyncError;
