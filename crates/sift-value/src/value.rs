//! The universal value type.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map as JsonMap, Number};

use crate::capability::{ArrayValue, ByteStreamHandle, MapValue};
use crate::error::ValueError;
use crate::iter::IteratorHandle;
use crate::link::Link;
use crate::stream::LazyStream;

/// Every datum a filter can see.
///
/// Values fall into three categories (see [`Category`]):
/// - scalar: `Null`, `Bool`, `Int`, `Float`, `Byte`, `Bytes`, `Text`
/// - compound: `Sequence`, `Mapping`, `Dict`
/// - complex, defined by behaviour: `Link`, `Map`, `Array`, `Iterator`,
///   `Bytestream`, `Stream`
///
/// Complex variants are handles. Cloning one shares the underlying state and
/// equality between them is identity.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Byte(u8),
    Bytes(Vec<u8>),
    Text(String),
    /// Ordered sequence of values.
    Sequence(Vec<Value>),
    /// Mapping from text keys to values.
    Mapping(BTreeMap<String, Value>),
    /// Mapping from arbitrary value keys to values.
    Dict(Vec<(Value, Value)>),
    Link(Link),
    Map(Arc<dyn MapValue>),
    Array(Arc<dyn ArrayValue>),
    Iterator(IteratorHandle),
    Bytestream(ByteStreamHandle),
    /// A lazy stream produced while a filter runs. Filters flatten these
    /// into sequences before handing results back.
    Stream(LazyStream),
}

/// The three value categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Scalar,
    Compound,
    Complex,
}

/// Classifies `value`. Every complex value is also compound in nature, but
/// reports [`Category::Complex`].
pub fn classify(value: &Value) -> Category {
    match value {
        Value::Null
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Float(_)
        | Value::Byte(_)
        | Value::Bytes(_)
        | Value::Text(_) => Category::Scalar,
        Value::Sequence(_) | Value::Mapping(_) | Value::Dict(_) => Category::Compound,
        Value::Link(_)
        | Value::Map(_)
        | Value::Array(_)
        | Value::Iterator(_)
        | Value::Bytestream(_)
        | Value::Stream(_) => Category::Complex,
    }
}

impl Value {
    pub fn category(&self) -> Category {
        classify(self)
    }

    /// A short lowercase name for the variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Byte(_) => "byte",
            Value::Bytes(_) => "bytes",
            Value::Text(_) => "text",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
            Value::Dict(_) => "dict",
            Value::Link(_) => "link",
            Value::Map(_) => "map",
            Value::Array(_) => "array",
            Value::Iterator(_) => "iterator",
            Value::Bytestream(_) => "bytestream",
            Value::Stream(_) => "stream",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of integer, float and byte values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            Value::Byte(b) => Some(f64::from(*b)),
            _ => None,
        }
    }

    /// Converts to JSON.
    ///
    /// Resolved links are replaced by their target. Unresolved links,
    /// capability values, iterators, byte streams and streams have no JSON
    /// form.
    pub fn to_json(&self) -> Result<serde_json::Value, ValueError> {
        use serde_json::Value as Json;
        Ok(match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(n) => Json::Number(Number::from(*n)),
            Value::Float(f) => Number::from_f64(*f)
                .map(Json::Number)
                .ok_or(ValueError::NotRepresentable("non-finite float"))?,
            Value::Byte(b) => Json::Number(Number::from(*b)),
            Value::Bytes(bytes) => {
                Json::Array(bytes.iter().map(|b| Json::Number(Number::from(*b))).collect())
            }
            Value::Text(s) => Json::String(s.clone()),
            Value::Sequence(items) => {
                Json::Array(items.iter().map(Value::to_json).collect::<Result<_, _>>()?)
            }
            Value::Mapping(map) => {
                let mut out = JsonMap::new();
                for (key, value) in map {
                    out.insert(key.clone(), value.to_json()?);
                }
                Json::Object(out)
            }
            Value::Dict(entries) => {
                let mut out = JsonMap::new();
                for (key, value) in entries {
                    match key {
                        Value::Text(k) => out.insert(k.clone(), value.to_json()?),
                        other => return Err(ValueError::NonTextKey(other.type_name())),
                    };
                }
                Json::Object(out)
            }
            Value::Link(link) => match link.cached() {
                Some(target) => target.to_json()?,
                None => return Err(ValueError::NotRepresentable("unresolved link")),
            },
            other => return Err(ValueError::NotRepresentable(other.type_name())),
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Sequence(a), Value::Sequence(b)) => a == b,
            (Value::Mapping(a), Value::Mapping(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Link(a), Value::Link(b)) => a.same(b),
            (Value::Map(a), Value::Map(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            (Value::Array(a), Value::Array(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Value::Iterator(a), Value::Iterator(b)) => a.same(b),
            (Value::Bytestream(a), Value::Bytestream(b)) => a.same(b),
            (Value::Stream(a), Value::Stream(b)) => a.same(b),
            _ => false,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match v {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::Text(s),
            Json::Array(items) => Value::Sequence(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => {
                Value::Mapping(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<u8> for Value {
    fn from(b: u8) -> Self {
        Value::Byte(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(items)
    }
}

impl From<Link> for Value {
    fn from(link: Link) -> Self {
        Value::Link(link)
    }
}

impl From<IteratorHandle> for Value {
    fn from(it: IteratorHandle) -> Self {
        Value::Iterator(it)
    }
}

impl From<ByteStreamHandle> for Value {
    fn from(stream: ByteStreamHandle) -> Self {
        Value::Bytestream(stream)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json() {
            Ok(json) => write!(f, "{json}"),
            Err(_) => write!(f, "<{}>", self.type_name()),
        }
    }
}
