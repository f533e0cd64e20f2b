//! Values flowing through the evaluation stack
//!
//!     The engine uses [`serde_json::Value`] as its dynamic value. `Null` is "no value": the
//!     result of an unresolved reference, a denied attribute, a failed execution or an empty
//!     stack.

pub use serde_json::Value;

/// Collapse the values a host stores under one field name.
///
/// No values is no value, one value is that value, several stay a list.
pub fn collapse(mut values: Vec<Value>) -> Value {
    match values.len() {
        0 => Value::Null,
        1 => values.remove(0),
        _ => Value::Array(values),
    }
}

/// Render a value as the text that replaces an injection.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// The map key a value stands for when used by `assoc`.
///
/// Lists and maps cannot be keys.
pub fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::Array(_) | Value::Object(_) => None,
        scalar => Some(render(scalar)),
    }
}

/// Unwrap a quoted string, reverting escaped quotes and backslashes.
pub fn unquote(quoted: &str) -> String {
    let inner = quoted
        .strip_prefix('=')
        .and_then(|rest| rest.strip_suffix('='))
        .unwrap_or(quoted);

    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some(next @ ('=' | '\\')) => result.push(next),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}
