//! `{key}` placeholder scanning for calculated-field formulas.

/// Returns every `{identifier}` placeholder in `formula`, trimmed, in order of appearance.
///
/// A placeholder is any run of characters between a `{` and the next `}`. Duplicates are
/// kept; an unterminated `{` ends the scan. Empty placeholders (`{}`) are returned as `""`
/// so that callers treat them as unresolvable rather than silently dropping them.
pub fn formula_placeholders(formula: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = formula;

    while let Some(open) = rest.find('{') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            break;
        };
        found.push(after_open[..close].trim());
        rest = &after_open[close + 1..];
    }

    found
}
