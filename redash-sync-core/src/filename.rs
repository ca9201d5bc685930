//! Filesystem-safe names for queries and dashboards.

use regex::Regex;
use std::sync::LazyLock;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("valid regex"));

/// Makes a filename-safe stub from an arbitrary title.
///
/// `"My Life (And Hard Times)"` becomes `my_life_and_hard_times`. The mapping is
/// stable, so the same name always lands on the same path.
pub fn make_filename(name: &str) -> String {
    NON_ALPHANUMERIC
        .replace_all(name, "_")
        .trim_matches('_')
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_punctuation_and_lowercases() {
        assert_eq!(make_filename("My Life (And Hard Times)"), "my_life_and_hard_times");
    }

    #[test]
    fn trims_leading_and_trailing_separators() {
        assert_eq!(make_filename("  -- Daily KPIs! "), "daily_kpis");
    }

    #[test]
    fn non_ascii_is_replaced() {
        assert_eq!(make_filename("Café Orders"), "caf_orders");
    }
}
