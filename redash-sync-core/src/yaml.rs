//! Comment-preserving rewrites of YAML documents.
//!
//! Operators annotate fetched files by hand, so a document that already exists
//! on disk is never rendered again from scratch. Its text is split into
//! top-level entries, each owning the comment and blank lines above it.
//! Entries whose value did not change are copied byte for byte, changed ones
//! are rendered again in place, new ones are appended after the last entry.
//! Comments inside a value that changed go away with the old value.
//!
//! [`splice`] gives up (returns `None`) when the text cannot be split into
//! independent entries, e.g. an alias pointing into another entry or a flow
//! mapping at the top level. The result is always parsed back and compared
//! with the wanted document before it is returned.

use serde_json::Value;

use crate::merge::Document;

#[derive(Debug)]
struct Entry {
    /// Comment and blank lines directly above the key.
    leading: String,
    /// The key line and every line belonging to its value.
    body: String,
    key: String,
    value: Value,
}

#[derive(Debug, Default)]
struct Layout {
    /// Comments of a document that has no entries at all.
    preamble: String,
    entries: Vec<Entry>,
    trailing: String,
}

impl Layout {
    fn document(&self) -> Document {
        self.entries
            .iter()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect()
    }
}

/// Render a document with no previous text to keep.
pub fn render(document: &Document) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(document)
}

/// Rewrite `previous` so it holds `document`, touching only the entries that changed.
pub fn splice(previous: &str, document: &Document) -> Option<String> {
    let layout = split(previous)?;
    if !layout.entries.is_empty() {
        let Value::Object(parsed) = serde_yaml::from_str::<Value>(previous).ok()? else {
            return None;
        };
        if parsed != layout.document() {
            return None;
        }
    }

    let mut out = String::new();
    push_block(&mut out, &layout.preamble);
    for entry in &layout.entries {
        push_block(&mut out, &entry.leading);
        match document.get(&entry.key) {
            Some(value) if *value == entry.value => push_block(&mut out, &entry.body),
            Some(value) => push_block(&mut out, &render_entry(&entry.key, value).ok()?),
            None => {}
        }
    }
    for (key, value) in document {
        if !layout.entries.iter().any(|entry| entry.key == *key) {
            push_block(&mut out, &render_entry(key, value).ok()?);
        }
    }
    push_block(&mut out, &layout.trailing);

    let written: Value = serde_yaml::from_str(&out).ok()?;
    (written == Value::Object(document.clone())).then_some(out)
}

fn render_entry(key: &str, value: &Value) -> Result<String, serde_yaml::Error> {
    let mut single = Document::new();
    single.insert(key.to_string(), value.clone());
    serde_yaml::to_string(&single)
}

fn push_block(out: &mut String, block: &str) {
    if block.is_empty() {
        return;
    }
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(block);
}

/// True when `text` holds nothing but comments, blank lines and document markers.
pub fn is_blank(text: &str) -> bool {
    text.lines().all(|line| is_trivia(line) || is_document_marker(line))
}

fn is_trivia(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn is_document_marker(line: &str) -> bool {
    let trimmed = line.trim_end();
    trimmed == "---" || trimmed == "..." || trimmed.starts_with("--- ")
}

/// A line at column zero that opens a new top-level key.
fn starts_entry(line: &str) -> bool {
    match line.chars().next() {
        None => false,
        Some(c) if c.is_whitespace() => false,
        Some('#' | '-' | '.' | '}' | ']' | ',') => false,
        Some(_) => true,
    }
}

fn split(source: &str) -> Option<Layout> {
    let mut raw: Vec<(String, String)> = Vec::new();
    let mut current: Option<(String, String)> = None;
    let mut pending = String::new();

    for line in source.split_inclusive('\n') {
        if is_document_marker(line) {
            if current.is_some() {
                return None;
            }
            pending.push_str(line);
        } else if is_trivia(line) {
            pending.push_str(line);
        } else if starts_entry(line) {
            raw.extend(current.take());
            current = Some((std::mem::take(&mut pending), line.to_string()));
        } else {
            let (_, body) = current.as_mut()?;
            body.push_str(&std::mem::take(&mut pending));
            body.push_str(line);
        }
    }
    raw.extend(current.take());

    let mut layout = Layout::default();
    if raw.is_empty() {
        layout.preamble = pending;
        return Some(layout);
    }
    layout.trailing = pending;

    for (leading, body) in raw {
        let Value::Object(parsed) = serde_yaml::from_str::<Value>(&body).ok()? else {
            return None;
        };
        if parsed.len() != 1 {
            return None;
        }
        let (key, value) = parsed.into_iter().next()?;
        if layout.entries.iter().any(|entry| entry.key == key) {
            return None;
        }
        layout.entries.push(Entry {
            leading,
            body,
            key,
            value,
        });
    }
    Some(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(text: &str) -> Document {
        serde_yaml::from_str(text).expect("valid yaml")
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    const ANNOTATED: &str = "\
# Sales dashboard, owned by finance
name: Sales  # display name
tags:
- finance

# keep filters on for the CFO
dashboard_filters_enabled: true
";

    #[test]
    fn unchanged_document_is_kept_byte_for_byte() {
        assert_eq!(splice(ANNOTATED, &parse(ANNOTATED)).as_deref(), Some(ANNOTATED));
    }

    #[test]
    fn changed_entry_keeps_comments_around_it() {
        let wanted = doc(json!({
            "name": "Sales",
            "tags": ["finance", "kpi"],
            "dashboard_filters_enabled": true
        }));

        let text = splice(ANNOTATED, &wanted).expect("layout can be kept");

        assert!(text.starts_with("# Sales dashboard, owned by finance\nname: Sales  # display name\n"));
        assert!(text.ends_with("\n# keep filters on for the CFO\ndashboard_filters_enabled: true\n"));
        assert_eq!(parse(&text), wanted);
    }

    #[test]
    fn new_keys_go_after_the_last_entry() {
        let previous = "# owned by finance team\nname: Sales\nslug: sales\n";
        let wanted = doc(json!({ "name": "Sales", "slug": "sales", "widgets": [] }));
        assert_eq!(
            splice(previous, &wanted).as_deref(),
            Some("# owned by finance team\nname: Sales\nslug: sales\nwidgets: []\n")
        );
    }

    #[test]
    fn missing_final_newline_is_repaired_before_appending() {
        let wanted = doc(json!({ "name": "a", "b": 1 }));
        assert_eq!(splice("name: a", &wanted).as_deref(), Some("name: a\nb: 1\n"));
    }

    #[test]
    fn comment_only_file_keeps_its_header() {
        let wanted = doc(json!({ "name": "a" }));
        assert_eq!(
            splice("# generated by fetch\n", &wanted).as_deref(),
            Some("# generated by fetch\nname: a\n")
        );
    }

    #[test]
    fn comments_alone_are_blank() {
        assert!(is_blank("---\n# nothing yet\n\n"));
        assert!(!is_blank("# header\nname: a\n"));
    }

    #[test]
    fn aliases_across_entries_are_not_spliced() {
        let previous = "base: &shared\n  x: 1\nother: *shared\n";
        let wanted = doc(json!({ "base": { "x": 1 }, "other": { "x": 1 }, "new": true }));
        assert_eq!(splice(previous, &wanted), None);
    }

    #[test]
    fn render_matches_spliced_entries() {
        let wanted = doc(json!({ "name": "Sales", "tags": ["a"], "options": {} }));
        let fresh = render(&wanted).unwrap();
        assert_eq!(splice(&fresh, &wanted).as_deref(), Some(fresh.as_str()));
    }
}
