//! Turning verbose runner output into comparable JSON documents.

use serde_json::{Map, Value};
use similar::TextDiff;

/// Tag the query runner puts in front of each line of the first response it prints
pub const RESPONSE_PREFIX: &str = "ID 0:";

/// Rebuild the JSON text of the response in `output`
///
/// The runner prints the response with every line tagged by `prefix`, except for the document's
/// opening brace, which is put back here. Untagged lines are ignored. Returns `None` when the
/// output contains no tagged line.
pub fn reconstruct_response(output: &str, prefix: &str) -> Option<String> {
    let mut lines = output
        .lines()
        .filter_map(|line| line.strip_prefix(prefix))
        .peekable();

    let first = *lines.peek()?;
    let mut document = Vec::new();
    if first.trim() == "{" {
        lines.next();
    }
    document.push("{");
    document.extend(lines);
    Some(document.join("\n"))
}

/// Replace the column names of every result series with their count
///
/// Backends name the columns of equivalent results differently; only the number of columns is
/// comparable. Documents without `response.results[].series[]` are left untouched.
pub fn normalize(response: &mut Value) {
    let Some(results) = response
        .pointer_mut("/response/results")
        .and_then(Value::as_array_mut)
    else {
        return;
    };

    for result in results {
        let Some(series) = result.get_mut("series").and_then(Value::as_array_mut) else {
            continue;
        };
        for s in series.iter_mut().filter_map(Value::as_object_mut) {
            if let Some(columns) = s.remove("columns") {
                let count = columns.as_array().map_or(0, Vec::len);
                s.insert("column_count".to_owned(), Value::from(count));
            }
        }
    }
}

/// Recursively order object keys so equal documents serialize identically
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect::<Map<_, _>>(),
            )
        }
        Value::Array(values) => Value::Array(values.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Pretty printed canonical form, one scalar or bracket per line
pub fn to_canonical_string(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(&canonicalize(value.clone()))
        .unwrap_or_else(|_| value.to_string());
    text.push('\n');
    text
}

/// Unified line diff of two canonical documents, empty when they are equal
pub fn diff(old_name: &str, old: &str, new_name: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(old_name, new_name)
        .to_string()
}
