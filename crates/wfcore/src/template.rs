//! `{{dotted.path}}` substitution against the accumulated run state.
//!
//! The grammar is deliberately small: a token opens with `{{`, closes with
//! the next `}}`, and may not contain another `{{`. The body is a dotted path
//! of non-empty segments. Single braces are ordinary text, so JSON bodies can
//! carry tokens without escaping.

use crate::value::ValueExt;
use crate::TemplateError;
use serde_json::Value;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq)]
enum Piece<'a> {
    Text(&'a str),
    Token { path: &'a str },
}

fn parse(template: &str) -> Result<Vec<Piece<'_>>, TemplateError> {
    let mut pieces = Vec::new();
    let mut rest = template;
    let mut base = 0;

    while let Some(start) = rest.find(OPEN) {
        if start > 0 {
            pieces.push(Piece::Text(&rest[..start]));
        }
        let offset = base + start;
        let after_open = &rest[start + OPEN.len()..];
        let end = after_open
            .find(CLOSE)
            .ok_or(TemplateError::Unclosed { offset })?;
        let body = &after_open[..end];
        if body.contains(OPEN) {
            return Err(TemplateError::Nested { offset });
        }

        let path = body.trim();
        if path.is_empty() {
            return Err(TemplateError::Empty { offset });
        }
        let bad_segment = |s: &str| {
            s.is_empty() || s.contains(|c: char| c.is_whitespace() || c == '{' || c == '}')
        };
        if path.split('.').any(bad_segment) {
            return Err(TemplateError::InvalidPath {
                path: path.to_string(),
                offset,
            });
        }
        pieces.push(Piece::Token { path });

        let consumed = start + OPEN.len() + end + CLOSE.len();
        rest = &rest[consumed..];
        base += consumed;
    }

    if !rest.is_empty() {
        pieces.push(Piece::Text(rest));
    }
    Ok(pieces)
}

fn render(
    template: &str,
    state: &Value,
    format: impl Fn(&Value) -> String,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    for piece in parse(template)? {
        match piece {
            Piece::Text(text) => out.push_str(text),
            Piece::Token { path } => {
                let value = state.lookup(path).unwrap_or(&Value::Null);
                out.push_str(&format(value));
            }
        }
    }
    Ok(out)
}

/// Replace each token with the JSON-stringified value at its path.
///
/// Missing paths render as `null`.
pub fn resolve(template: &str, state: &Value) -> Result<String, TemplateError> {
    render(template, state, |v| v.to_string())
}

/// Like [`resolve`], but string values are inserted without JSON quotes.
/// Used for URLs, header values and prompts.
pub fn resolve_text(template: &str, state: &Value) -> Result<String, TemplateError> {
    render(template, state, |v| v.to_text())
}

/// Resolve every string inside a JSON value.
///
/// A string that consists of exactly one token is replaced by the referenced
/// value itself, so `"{{form.age}}"` stays a number.
pub fn resolve_value(value: &Value, state: &Value) -> Result<Value, TemplateError> {
    match value {
        Value::String(s) => {
            let pieces = parse(s)?;
            if let [Piece::Token { path }] = pieces.as_slice() {
                return Ok(state.lookup(path).cloned().unwrap_or(Value::Null));
            }
            resolve_text(s, state).map(Value::String)
        }
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, state))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                resolved.insert(key.clone(), resolve_value(item, state)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Paths referenced by a template, in order of appearance.
pub fn tokens(template: &str) -> Result<Vec<String>, TemplateError> {
    Ok(parse(template)?
        .into_iter()
        .filter_map(|piece| match piece {
            Piece::Token { path } => Some(path.to_string()),
            Piece::Text(_) => None,
        })
        .collect())
}

/// Check every string leaf of a JSON value for malformed tokens.
pub fn check_value(value: &Value) -> Result<(), TemplateError> {
    match value {
        Value::String(s) => parse(s).map(|_| ()),
        Value::Array(items) => items.iter().try_for_each(check_value),
        Value::Object(map) => map.values().try_for_each(check_value),
        _ => Ok(()),
    }
}
