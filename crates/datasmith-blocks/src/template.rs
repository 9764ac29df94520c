//! Minimal `{{ field }}` template rendering against the accumulated context.
//!
//! Placeholders name a context field, optionally traversing nested objects
//! with dots (`metadata.topic`) and applying one filter: `{{ value | json }}`
//! pretty-prints, `{{ value | truncate }}` caps the text at 100 characters.
//! Unknown fields, unknown filters, and unclosed placeholders are template
//! errors naming the offending fragment.

use serde_json::Value;

use datasmith_types::{Context, DatasmithError, Result};

/// Longest string the `truncate` filter passes through unchanged.
const TRUNCATE_LIMIT: usize = 100;

/// Render `template`, substituting every `{{ ... }}` placeholder from
/// `context`. Text outside placeholders is copied verbatim.
pub fn render(template: &str, context: &Context) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err(DatasmithError::Template(format!(
                "unclosed placeholder starting at '{}'",
                snippet(&rest[start..])
            )));
        };
        rendered.push_str(&apply_placeholder(after[..end].trim(), context)?);
        rest = &after[end + 2..];
    }
    rendered.push_str(rest);
    Ok(rendered)
}

fn apply_placeholder(expr: &str, context: &Context) -> Result<String> {
    let (path, filter) = match expr.split_once('|') {
        Some((path, filter)) => (path.trim_end(), Some(filter.trim())),
        None => (expr, None),
    };
    if path.is_empty() {
        return Err(DatasmithError::Template("empty placeholder".to_string()));
    }
    let value = lookup(path, context)
        .ok_or_else(|| DatasmithError::Template(format!("unknown field '{path}'")))?;
    match filter {
        None => Ok(stringify(value)),
        Some("json") => serde_json::to_string_pretty(value)
            .map_err(|e| DatasmithError::Template(format!("cannot serialize '{path}': {e}"))),
        Some("truncate") => Ok(truncate(&stringify(value))),
        Some(other) => Err(DatasmithError::Template(format!("unknown filter '{other}'"))),
    }
}

/// Resolve a dotted path against the context, descending into objects.
fn lookup<'a>(path: &str, context: &'a Context) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut value = context.get(segments.next()?)?;
    for segment in segments {
        value = value.as_object()?.get(segment)?;
    }
    Some(value)
}

/// Strings substitute verbatim; other values as compact JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= TRUNCATE_LIMIT {
        return text.to_string();
    }
    let head: String = text.chars().take(TRUNCATE_LIMIT).collect();
    format!("{head}...")
}

/// First 20 characters of `text`, cut on a char boundary.
fn snippet(text: &str) -> &str {
    match text.char_indices().nth(20) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
