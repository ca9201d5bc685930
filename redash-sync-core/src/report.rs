//! Outcome of a push run.
//!
//! Widgets that cannot be matched to an uploaded visualization are recorded
//! here instead of aborting the run. The report turns into a single pass/fail
//! [`Outcome`] once everything else has been processed.

use std::fmt;

/// A widget that was skipped because its visualization could not be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetFailure {
    pub dashboard: String,
    pub query_name: String,
    pub visualization_name: String,
}

impl fmt::Display for WidgetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dashboard '{}': could not find visualisation '{}' on query '{}'",
            self.dashboard, self.visualization_name, self.query_name
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Failed,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Ok => 0,
            Outcome::Failed => 1,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub queries_uploaded: usize,
    pub visualizations_uploaded: usize,
    pub dashboards_updated: usize,
    pub widgets_created: usize,
    pub widgets_deleted: usize,
    pub failures: Vec<WidgetFailure>,
}

impl SyncReport {
    pub fn record_failure(&mut self, failure: WidgetFailure) {
        self.failures.push(failure);
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn outcome(&self) -> Outcome {
        if self.has_failures() {
            Outcome::Failed
        } else {
            Outcome::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_passes() {
        let report = SyncReport::default();
        assert_eq!(report.outcome(), Outcome::Ok);
        assert_eq!(report.outcome().exit_code(), 0);
    }

    #[test]
    fn any_failure_fails_the_run() {
        let mut report = SyncReport {
            widgets_created: 4,
            ..Default::default()
        };
        report.record_failure(WidgetFailure {
            dashboard: "Sales".into(),
            query_name: "Orders".into(),
            visualization_name: "Table".into(),
        });
        assert_eq!(report.outcome(), Outcome::Failed);
        assert_eq!(report.outcome().exit_code(), 1);
        assert_eq!(
            report.failures[0].to_string(),
            "dashboard 'Sales': could not find visualisation 'Table' on query 'Orders'"
        );
    }
}
