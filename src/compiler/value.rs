//! Runtime values flowing through template evaluation

use std::fmt;

use indexmap::IndexMap;

/// A data-context value
///
/// Coercion rules (text, numbers, truthiness, equality) follow the scripting
/// conventions template authors expect: `undefined` and `null` are distinct,
/// numbers are `f64`, and objects keep insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    /// Empty object, the usual root context
    pub fn object() -> Self {
        Value::Object(IndexMap::new())
    }

    /// Kind name used in log messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// `false`, `0`, `NaN`, `""`, `null` and `undefined` are falsy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    /// Numeric coercion
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => parse_number(s),
            Value::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => single.to_number(),
                _ => f64::NAN,
            },
            Value::Object(_) => f64::NAN,
        }
    }

    /// Property lookup: object keys, array indices and `length`
    ///
    /// `key` is coerced to text for objects and to an index for arrays and
    /// strings.
    pub fn property(&self, key: &Value) -> Option<Value> {
        match self {
            Value::Object(map) => map.get(&key.to_string()).cloned(),
            Value::Array(items) => match key {
                Value::String(s) if s == "length" => Some(Value::Number(items.len() as f64)),
                _ => index_of(key).and_then(|i| items.get(i)).cloned(),
            },
            Value::String(text) => match key {
                Value::String(s) if s == "length" => {
                    Some(Value::Number(text.chars().count() as f64))
                }
                _ => index_of(key)
                    .and_then(|i| text.chars().nth(i))
                    .map(|c| Value::String(c.to_string())),
            },
            _ => None,
        }
    }

    /// `===`: same kind and same value
    pub fn strict_equals(&self, other: &Value) -> bool {
        self == other
    }

    /// `==`: `null` and `undefined` match each other, primitives of
    /// different kinds compare numerically
    pub fn loose_equals(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Undefined | Null, Undefined | Null) => true,
            (Undefined | Null, _) | (_, Undefined | Null) => false,
            (String(a), String(b)) => a == b,
            (Array(_) | Object(_), Array(_) | Object(_)) => self == other,
            (Array(_) | Object(_), _) => String(self.to_string()).loose_equals(other),
            (_, Array(_) | Object(_)) => self.loose_equals(&String(other.to_string())),
            _ => self.to_number() == other.to_number(),
        }
    }
}

/// Array index from a numeric or numeric-string key
fn index_of(key: &Value) -> Option<usize> {
    let n = match key {
        Value::Number(n) => *n,
        Value::String(s) => s.parse::<f64>().ok()?,
        _ => return None,
    };
    (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => trimmed.parse().unwrap_or(f64::NAN),
    }
}

fn format_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        write!(f, "NaN")
    } else if n.is_infinite() {
        write!(f, "{}", if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == 0.0 {
        // covers -0
        write!(f, "0")
    } else {
        write!(f, "{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => format_number(*n, f),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    // holes print empty
                    if !matches!(item, Value::Undefined | Value::Null) {
                        write!(f, "{}", item)?;
                    }
                }
                Ok(())
            }
            Value::Object(_) => write!(f, "[object Object]"),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<toml::Value> for Value {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Number(i as f64),
            toml::Value::Float(n) => Value::Number(n),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::String(dt.to_string()),
            toml::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            toml::Value::Table(table) => Value::Object(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Object(map)
    }
}
