use serde_json::Value;

/// Helpers for working with the JSON values that flow through a run.
pub trait ValueExt {
    /// Look up a dotted path (`a.b.0.c`). Numeric segments index arrays.
    fn lookup(&self, path: &str) -> Option<&Value>;

    /// Loose truthiness used for edge conditions.
    fn is_truthy(&self) -> bool;

    /// JSON type name, as used in schema messages.
    fn type_name(&self) -> &'static str;

    /// Render as a string without JSON quoting for string values.
    fn to_text(&self) -> String;
}

impl ValueExt for Value {
    fn lookup(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => {
                    let index: usize = segment.parse().ok()?;
                    items.get(index)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(_) => true,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    fn to_text(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Parse a response body as JSON, keeping it as a string when it isn't JSON.
pub fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
