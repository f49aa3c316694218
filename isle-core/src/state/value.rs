//! Dynamic values held by reactive state.

use std::fmt;

use serde_json::Number;

use super::{Function, ObjectHandle, ObjectId};

/// A value stored in, or read from, reactive state.
///
/// Objects and functions are handles: equality on them is identity.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(ObjectHandle),
    Function(Function),
    /// A derived property whose getter has not been installed yet.
    /// Directives skip it instead of rendering it.
    Pending,
}

impl Value {
    /// Convert JSON into a value. Objects and arrays become reactive objects
    /// owned by `namespace`.
    pub fn from_json(namespace: Option<&str>, json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                Value::Object(ObjectHandle::from_json(namespace, json))
            }
        }
    }

    /// Snapshot as JSON without tracking. Functions, `undefined` and the
    /// pending marker become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null | Value::Function(_) | Value::Pending => {
                serde_json::Value::Null
            }
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Object(object) => object.to_json(),
        }
    }

    /// JavaScript truthiness. The pending marker is falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null | Value::Pending => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) | Value::Function(_) => true,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Value::Pending)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(function) => Some(function),
            _ => None,
        }
    }

    /// String form used when a value is written into the UI tree.
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined | Value::Pending => "undefined".into(),
            Value::Null => "null".into(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Object(object) if object.is_array() => object
                .items()
                .iter()
                .map(|item| if item.is_nullish() { String::new() } else { item.to_js_string() })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".into(),
            Value::Function(_) => "function".into(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(object) if object.is_array() => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Pending => "pending",
        }
    }

    /// Hashable identity used to key list items.
    pub fn key(&self) -> ValueKey {
        match self {
            Value::Undefined => ValueKey::Undefined,
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Number(n) => {
                let normalized = if *n == 0.0 { 0.0 } else if n.is_nan() { f64::NAN } else { *n };
                ValueKey::Number(normalized.to_bits())
            }
            Value::String(s) => ValueKey::String(s.clone()),
            Value::Object(object) => ValueKey::Object(object.id()),
            Value::Function(function) => ValueKey::Function(function.identity()),
            Value::Pending => ValueKey::Pending,
        }
    }
}

/// Format a number the way JavaScript's `String(n)` does for the common
/// cases: integers without a fractional part, `NaN`, `Infinity`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".into() } else { "-Infinity".into() }
    } else if n == 0.0 {
        "0".into()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

/// Identity of a value for keyed list rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Undefined,
    Null,
    Bool(bool),
    Number(u64),
    String(String),
    Object(ObjectId),
    Function(usize),
    Pending,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined)
            | (Value::Null, Value::Null)
            | (Value::Pending, Value::Pending) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(object) => write!(f, "{object:?}"),
            Value::Function(_) => f.write_str("[function]"),
            Value::Pending => f.write_str("[pending]"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<ObjectHandle> for Value {
    fn from(value: ObjectHandle) -> Self {
        Value::Object(value)
    }
}

impl From<Function> for Value {
    fn from(value: Function) -> Self {
        Value::Function(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(Value::Undefined, false)]
    #[case(Value::Null, false)]
    #[case(Value::Pending, false)]
    #[case(Value::Number(0.0), false)]
    #[case(Value::Number(f64::NAN), false)]
    #[case(Value::String(String::new()), false)]
    #[case(Value::Bool(true), true)]
    #[case(Value::Number(-1.0), true)]
    #[case(Value::from("0"), true)]
    fn truthiness(#[case] value: Value, #[case] truthy: bool) {
        assert_eq!(value.is_truthy(), truthy);
    }

    #[rstest]
    #[case(1.0, "1")]
    #[case(-0.0, "0")]
    #[case(2.5, "2.5")]
    #[case(f64::INFINITY, "Infinity")]
    #[case(-42.0, "-42")]
    #[case(1e20, "100000000000000000000")]
    #[case(-9.5e18, "-9500000000000000000")]
    #[case(1e21, "1000000000000000000000")]
    fn numbers_format_like_js(#[case] n: f64, #[case] expected: &str) {
        assert_eq!(format_number(n), expected);
    }

    #[test]
    fn json_round_trip_keeps_shape() {
        let source = json!({"a": 1, "list": [true, "x", null], "nested": {"b": 2.5}});
        let value = Value::from_json(Some("ns"), &source);
        assert_eq!(value.type_name(), "object");
        assert_eq!(value.to_json(), source);
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = Value::from_json(None, &json!({"x": 1}));
        let b = Value::from_json(None, &json!({"x": 1}));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a.key(), b.key());
        assert_eq!(Value::Number(0.0).key(), Value::Number(-0.0).key());
    }
}
