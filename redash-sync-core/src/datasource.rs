//! Choosing the data source that pushed queries are attached to.

use tracing::error;

use crate::contract::DataSource;
use crate::error::SyncError;

/// Pick the data source to push to.
///
/// With a name, the source with that name is used. Without one, the server must
/// have exactly one data source. Any other case logs the valid choices and fails
/// before anything on the server is touched.
pub fn select_data_source(
    sources: Vec<DataSource>,
    name: Option<&str>,
) -> Result<DataSource, SyncError> {
    let failure = match name {
        Some(wanted) => {
            if let Some(found) = sources.iter().find(|s| s.name == wanted) {
                return Ok(found.clone());
            }
            format!("no data source named '{wanted}'")
        }
        None if sources.len() == 1 => return Ok(sources[0].clone()),
        None if sources.is_empty() => "the server has no data sources".to_string(),
        None => "more than one data source exists, choose one".to_string(),
    };

    error!("You must choose a datasource:");
    for source in &sources {
        error!("  --data-source-name \"{}\" ({})", source.name, source.kind);
    }
    Err(SyncError::DataSource(failure))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: i64, name: &str, kind: &str) -> DataSource {
        DataSource {
            id,
            name: name.into(),
            kind: kind.into(),
            syntax: "sql".into(),
        }
    }

    #[test]
    fn single_source_is_chosen_without_name() {
        let chosen = select_data_source(vec![source(1, "main", "pg")], None).unwrap();
        assert_eq!(chosen.id, 1);
    }

    #[test]
    fn name_selects_among_many() {
        let sources = vec![source(1, "main", "pg"), source(2, "events", "bigquery")];
        assert_eq!(select_data_source(sources, Some("events")).unwrap().id, 2);
    }

    #[test]
    fn ambiguous_or_unknown_is_a_configuration_error() {
        let sources = vec![source(1, "main", "pg"), source(2, "events", "bigquery")];
        let err = select_data_source(sources.clone(), None).unwrap_err();
        assert!(err.is_configuration());
        assert!(select_data_source(sources, Some("nope")).unwrap_err().is_configuration());
        assert!(select_data_source(Vec::new(), None).unwrap_err().is_configuration());
    }
}
