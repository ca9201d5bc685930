//! Dashboard reconciliation for push.
//!
//! Dashboards are matched by name. Missing ones are created, then every saved
//! dashboard gets its settings written. Widgets have no stable identity on the
//! server, so they are never patched: all remote widgets of a dashboard are
//! deleted and the saved ones are created again in their saved order.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{error, info};

use crate::contract::{record_name, NewWidget, RemoteStore};
use crate::error::SyncError;
use crate::fetch::{require_id, DEFAULT_TABLE_NAME};
use crate::merge::Document;
use crate::report::{SyncReport, WidgetFailure};
use crate::upload::UploadState;

/// Dashboard settings written on every push.
pub const DASHBOARD_SETTINGS_FIELDS: &[&str] = &["is_draft", "tags", "dashboard_filters_enabled"];

/// Create saved dashboards that the server does not have, then update the
/// settings of every saved dashboard.
///
/// Created dashboards are added to `existing` so later steps can find them.
pub async fn create_missing_dashboards<R: RemoteStore + ?Sized>(
    remote: &R,
    saved: &BTreeMap<String, Document>,
    existing: &mut BTreeMap<String, Value>,
) -> Result<usize, SyncError> {
    let mut created = 0;
    for (name, document) in saved {
        if !existing.contains_key(name) {
            info!(dashboard = %name, "[PUSH] Creating dashboard");
            let dashboard = remote.create_dashboard(name).await?;
            existing.insert(name.clone(), dashboard);
            created += 1;
        } else {
            info!(dashboard = %name, "[PUSH] Updating dashboard");
        }

        let id = existing
            .get(name)
            .map(|d| require_id(d, "dashboard"))
            .transpose()?
            .ok_or_else(|| SyncError::MissingRemote(format!("dashboard '{name}' missing")))?;

        let mut settings = Document::new();
        for field in DASHBOARD_SETTINGS_FIELDS {
            if let Some(value) = document.get(*field) {
                settings.insert(field.to_string(), value.clone());
            }
        }
        remote.update_dashboard(id, &Value::Object(settings)).await?;
    }
    Ok(created)
}

/// Replace the widgets of every saved dashboard.
///
/// Widgets whose visualization cannot be resolved are recorded in `report` and
/// skipped; every other widget and dashboard is still processed.
pub async fn update_dashboards<R: RemoteStore + ?Sized>(
    remote: &R,
    saved: &BTreeMap<String, Document>,
    existing: &BTreeMap<String, Value>,
    uploads: &UploadState,
    report: &mut SyncReport,
) -> Result<(), SyncError> {
    for (name, document) in saved {
        info!(dashboard = %name, "[PUSH] Updating dashboard widgets");
        let remote_dashboard = existing.get(name).ok_or_else(|| {
            SyncError::MissingRemote(format!("dashboard '{name}' does not exist on the server"))
        })?;
        let dashboard_id = require_id(remote_dashboard, "dashboard")?;

        remove_widgets(remote, remote_dashboard, report).await?;

        let saved_widgets = document
            .get("widgets")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for widget in saved_widgets {
            add_widget(remote, name, dashboard_id, widget, uploads, report).await?;
        }
        report.dashboards_updated += 1;
    }

    if report.has_failures() {
        info!(failures = report.failures.len(), "Dashboards loaded with errors. See above for details.");
    } else {
        info!("Dashboards loaded");
    }
    Ok(())
}

async fn remove_widgets<R: RemoteStore + ?Sized>(
    remote: &R,
    dashboard: &Value,
    report: &mut SyncReport,
) -> Result<(), SyncError> {
    let widgets = dashboard
        .get("widgets")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for widget in widgets {
        let id = require_id(widget, "widget")?;
        let visualization = widget.get("visualization");
        info!(
            widget_id = id,
            visualization = visualization.and_then(record_name).unwrap_or("<text>"),
            query = visualization
                .and_then(|v| v.get("query"))
                .and_then(record_name)
                .unwrap_or("<none>"),
            "[PUSH] Removing widget"
        );
        remote.delete_widget(id).await?;
        report.widgets_deleted += 1;
    }
    Ok(())
}

async fn add_widget<R: RemoteStore + ?Sized>(
    remote: &R,
    dashboard_name: &str,
    dashboard_id: i64,
    widget: &Value,
    uploads: &UploadState,
    report: &mut SyncReport,
) -> Result<(), SyncError> {
    let reference = widget.get("visualization").filter(|v| !v.is_null());
    let visualization_id = match reference {
        None => None,
        Some(reference) => {
            let query_name = reference.get("queryName").and_then(Value::as_str).unwrap_or_default();
            let visualization_name = record_name(reference).unwrap_or_default();
            info!(
                dashboard = %dashboard_name,
                visualization = %visualization_name,
                query = %query_name,
                "[PUSH] Adding widget"
            );
            match uploads.resolve_visualization(query_name, visualization_name) {
                Some(id) => Some(id),
                None => {
                    error!(
                        "Could not find visualisation '{}' on query '{}'",
                        visualization_name, query_name
                    );
                    if visualization_name == DEFAULT_TABLE_NAME {
                        error!("Note that the default 'Table' visualisation is not saved unless you edit it manually.");
                    }
                    report.record_failure(WidgetFailure {
                        dashboard: dashboard_name.to_string(),
                        query_name: query_name.to_string(),
                        visualization_name: visualization_name.to_string(),
                    });
                    return Ok(());
                }
            }
        }
    };

    let new_widget = NewWidget {
        dashboard_id,
        visualization_id,
        text: widget
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        options: widget
            .get("options")
            .cloned()
            .unwrap_or_else(|| Value::Object(Document::new())),
        width: widget.get("width").and_then(Value::as_i64).unwrap_or(1),
    };
    remote.create_widget(new_widget).await?;
    report.widgets_created += 1;
    Ok(())
}
