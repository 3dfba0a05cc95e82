//! Placeholder resolution against a run context.
//!
//! Step configs reference earlier results with `{{ path.to.value }}`
//! placeholders. A template string is parsed into literal and placeholder
//! segments; each placeholder path is walked directly over the structured
//! context, so resolved values are never re-scanned for placeholders.
//!
//! Resolution is total: a path that cannot be followed leaves the
//! placeholder text in place.

use procflow_types::workflow::RunContext;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Template AST
// ---------------------------------------------------------------------------

/// One step of a placeholder path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment<'a> {
    Key(&'a str),
    /// Numeric segment. Indexes arrays; on objects it is looked up as a key.
    Index(usize),
}

/// A piece of a parsed template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Placeholder {
        /// Full source text including the braces, kept for unresolved output.
        raw: &'a str,
        path: Vec<PathSegment<'a>>,
    },
}

/// Split a template into literal and placeholder segments.
///
/// Malformed placeholders (empty path, empty segment, embedded whitespace)
/// are kept as literals. An unterminated `{{` makes the rest of the string
/// literal.
pub fn parse_template(template: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = template;
    let mut offset = 0;

    while let Some(open) = rest.find("{{") {
        let Some(close_rel) = rest[open + 2..].find("}}") else {
            break;
        };
        let close = open + 2 + close_rel;
        if open > 0 {
            segments.push(Segment::Literal(&template[offset..offset + open]));
        }
        let raw = &template[offset + open..offset + close + 2];
        match parse_path(rest[open + 2..close].trim()) {
            Some(path) => segments.push(Segment::Placeholder { raw, path }),
            None => segments.push(Segment::Literal(raw)),
        }
        offset += close + 2;
        rest = &template[offset..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    segments
}

fn parse_path(expr: &str) -> Option<Vec<PathSegment<'_>>> {
    if expr.is_empty() {
        return None;
    }
    expr.split('.')
        .map(|part| {
            if part.is_empty() || part.chars().any(char::is_whitespace) {
                None
            } else if let Ok(index) = part.parse::<usize>() {
                Some(PathSegment::Index(index))
            } else {
                Some(PathSegment::Key(part))
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// Walk `path` through the context. `None` when any step cannot be followed.
pub fn lookup<'v>(context: &'v RunContext, path: &[PathSegment<'_>]) -> Option<&'v Value> {
    let (first, tail) = path.split_first()?;
    let mut current = match first {
        PathSegment::Key(key) => context.get(*key)?,
        PathSegment::Index(index) => context.get(&index.to_string())?,
    };
    for segment in tail {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(*key)?,
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index)?,
            (PathSegment::Index(index), Value::Object(map)) => map.get(&index.to_string())?,
            _ => return None,
        };
    }
    Some(current)
}

/// Look up a dot-separated path such as `items.0.name`.
pub fn lookup_path<'v>(context: &'v RunContext, path: &str) -> Option<&'v Value> {
    let segments = parse_path(path.trim())?;
    lookup(context, &segments)
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve every placeholder in `value`, recursing through objects and arrays.
///
/// Object keys are never templated. Every templated string stays a string:
/// strings are inserted verbatim, objects and arrays as compact JSON, and
/// numbers, booleans and null by string conversion.
pub fn resolve(value: &Value, context: &RunContext) -> Value {
    map_strings(value, &|s| Value::String(resolve_template(s, context)))
}

/// Like `resolve`, except that a string consisting of exactly one resolvable
/// placeholder is replaced by the value it points at, keeping its type.
///
/// For free-form data slots (record data, compare operands, column values)
/// where the target is a JSON value rather than text.
pub fn resolve_typed(value: &Value, context: &RunContext) -> Value {
    map_strings(value, &|s| resolve_exact(s, context))
}

fn map_strings(value: &Value, f: &dyn Fn(&str) -> Value) -> Value {
    match value {
        Value::String(s) => f(s),
        Value::Array(items) => Value::Array(items.iter().map(|v| map_strings(v, f)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), map_strings(v, f)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Resolve a single template string, always producing a string.
pub fn resolve_template(template: &str, context: &RunContext) -> String {
    let segments = parse_template(template);
    render(&segments, context)
}

fn resolve_exact(template: &str, context: &RunContext) -> Value {
    let segments = parse_template(template);
    if let [Segment::Placeholder { path, .. }] = segments.as_slice() {
        if let Some(found) = lookup(context, path) {
            return found.clone();
        }
    }
    Value::String(render(&segments, context))
}

fn render(segments: &[Segment<'_>], context: &RunContext) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Placeholder { raw, path } => match lookup(context, path) {
                Some(found) => out.push_str(&value_to_string(found)),
                None => out.push_str(raw),
            },
        }
    }
    out
}

/// Convert a JSON value to its inline text form.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
