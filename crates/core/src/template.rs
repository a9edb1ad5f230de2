//! `{{Variable}}` placeholders in rich-text report templates.

use std::collections::BTreeSet;

use profiles::{InputSchemaEntry, NonEmptyText, SchemaFieldType};

use crate::value::ValueMap;

/// A placeholder occurrence: byte range of the whole `{{ ... }}` and its trimmed identifier.
struct Placeholder<'a> {
    start: usize,
    end: usize,
    identifier: &'a str,
}

/// Scan `html` for `{{identifier}}` occurrences, left to right.
///
/// An opening `{{` with no closing `}}` ends the scan. Blank identifiers are skipped.
fn placeholders(html: &str) -> Vec<Placeholder<'_>> {
    let mut found = Vec::new();
    let mut cursor = 0;

    while let Some(open) = html[cursor..].find("{{") {
        let start = cursor + open;
        let inner_start = start + 2;
        let Some(close) = html[inner_start..].find("}}") else {
            break;
        };
        let inner_end = inner_start + close;
        let identifier = html[inner_start..inner_end].trim();
        cursor = inner_end + 2;
        if !identifier.is_empty() {
            found.push(Placeholder {
                start,
                end: cursor,
                identifier,
            });
        }
    }

    found
}

/// Derive an input schema from a template: one `text` entry per distinct identifier, in order
/// of first appearance, labelled with the identifier itself.
pub fn extract_variables(html: &str) -> Vec<InputSchemaEntry> {
    let mut seen = BTreeSet::new();
    placeholders(html)
        .into_iter()
        .filter(|p| seen.insert(p.identifier))
        .filter_map(|p| {
            let key = NonEmptyText::new(p.identifier).ok()?;
            Some(InputSchemaEntry {
                key,
                label: p.identifier.to_owned(),
                field_type: SchemaFieldType::Text,
            })
        })
        .collect()
}

/// Render a template by substituting each placeholder with its HTML-escaped value.
///
/// Placeholders without a value render as an empty string.
pub fn fill_template(html: &str, values: &ValueMap) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;

    for p in placeholders(html) {
        out.push_str(&html[last..p.start]);
        if let Some(value) = values.get(p.identifier) {
            push_escaped(&mut out, &value.display());
        }
        last = p.end;
    }
    out.push_str(&html[last..]);
    out
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldValue;

    fn keys(entries: &[InputSchemaEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.key.as_str()).collect()
    }

    #[test]
    fn extracts_distinct_variables_in_order() {
        let entries =
            extract_variables("<p>{{Hemoglobin}}: {{Hemoglobin}} g/dL, {{WBC}}</p>");
        assert_eq!(keys(&entries), vec!["Hemoglobin", "WBC"]);
        assert_eq!(entries[0].label, "Hemoglobin");
        assert_eq!(entries[0].field_type, SchemaFieldType::Text);
    }

    #[test]
    fn identifiers_are_trimmed() {
        let entries = extract_variables("{{ Hb }} and {{Hb}} and {{  }}");
        assert_eq!(keys(&entries), vec!["Hb"]);
    }

    #[test]
    fn unterminated_placeholder_stops_scan() {
        let entries = extract_variables("{{A}} then {{B and {{C}}");
        assert_eq!(keys(&entries), vec!["A", "B and {{C"]);
        assert!(extract_variables("no variables here").is_empty());
        assert!(extract_variables("{{open").is_empty());
    }

    #[test]
    fn fills_values_with_escaping() {
        let values: ValueMap = [
            ("Hb".to_string(), FieldValue::Number(12.0)),
            ("Note".to_string(), FieldValue::from("<b>&</b>")),
        ]
        .into_iter()
        .collect();
        let html = fill_template("<p>{{Hb}} g/dL {{ Note }} {{Missing}}.</p>", &values);
        assert_eq!(html, "<p>12 g/dL &lt;b&gt;&amp;&lt;/b&gt; .</p>");
    }
}
