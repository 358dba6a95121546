//! The plain-value side of a payload.
//!
//! Everything that is not a byte stream is first classified into a
//! [`Value`]. Normalization then dispatches on the variant in one ordered
//! match instead of probing capabilities.

use std::fmt::{self, Write as _};
use std::sync::{Arc, PoisonError, RwLock};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use jiff::Timestamp;
use serde::Serialize;
use serde_json::{Map, Number, Value as Json};
use thiserror::Error;

/// A plain (non-stream) payload value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    /// An unsigned integer beyond `i64::MAX`. Still an ordinary JSON number.
    UInt(u64),
    Float(f64),
    BigInt(i128),
    /// A symbol with an optional description.
    Symbol(Option<String>),
    /// A callable, carried as its source text or signature.
    Function(String),
    Text(String),
    Error(ErrorValue),
    Date(Timestamp),
    Binary(Bytes),
    Array(Vec<Value>),
    /// Ordered key/value entries.
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    /// A regular expression, carried as its pattern source.
    Regex(String),
    /// Fields in insertion order.
    Object(Vec<(String, Value)>),
    /// A shared, mutable reference. The only way to build a cycle.
    Shared(Shared),
    /// A foreign value whose serializer failed, carried as its display text.
    Unserializable(String),
}

/// Why a value could not be encoded structurally.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("value contains a reference cycle")]
    Cycle,
    #[error("big integers have no structural encoding")]
    BigInt,
    #[error("value is not serializable: {0}")]
    Unserializable(String),
}

impl Value {
    /// Builds an object from `(key, value)` pairs, keeping their order.
    pub fn object<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn array<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }

    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn set<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::Set(items.into_iter().map(Into::into).collect())
    }

    /// Captures any serializable value.
    ///
    /// A serializer failure does not surface here: the value is kept as
    /// [`Value::Unserializable`] with its debug text, which later
    /// normalizes to plain text.
    pub fn from_serialize<T: Serialize + fmt::Debug>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => json.into(),
            Err(_) => Self::Unserializable(format!("{value:?}")),
        }
    }

    /// Whether the value is an object/collection rather than a scalar.
    pub(crate) fn is_container(&self) -> bool {
        matches!(
            self,
            Self::Array(_) | Self::Map(_) | Self::Set(_) | Self::Object(_) | Self::Shared(_)
        )
    }

    /// Structural (JSON) encoding.
    ///
    /// Functions and symbols are dropped from objects and become `null` in
    /// sequences; non-finite floats become `null`. Cycles, big integers and
    /// unserializable leaves fail the whole encoding.
    pub fn to_json(&self) -> Result<Json, EncodeError> {
        Ok(self.encode(&mut Vec::new())?.unwrap_or(Json::Null))
    }

    fn encode(&self, seen: &mut Vec<*const RwLock<Value>>) -> Result<Option<Json>, EncodeError> {
        let json = match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::Number((*i).into()),
            Self::UInt(u) => Json::Number((*u).into()),
            Self::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Self::BigInt(_) => return Err(EncodeError::BigInt),
            Self::Symbol(_) | Self::Function(_) => return Ok(None),
            Self::Text(s) | Self::Regex(s) => Json::String(s.clone()),
            Self::Error(e) => e.encode(seen),
            Self::Date(ts) => Json::String(iso_timestamp(*ts)),
            Self::Binary(b) => Json::String(STANDARD.encode(b)),
            Self::Array(items) | Self::Set(items) => Json::Array(encode_items(items, seen)?),
            Self::Map(entries) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    let k = k.encode(seen)?.unwrap_or(Json::Null);
                    let v = v.encode(seen)?.unwrap_or(Json::Null);
                    pairs.push(Json::Array(vec![k, v]));
                }
                Json::Array(pairs)
            }
            Self::Object(fields) => {
                let mut map = Map::with_capacity(fields.len());
                for (k, v) in fields {
                    if let Some(v) = v.encode(seen)? {
                        map.insert(k.clone(), v);
                    }
                }
                Json::Object(map)
            }
            Self::Shared(shared) => {
                let ptr = Arc::as_ptr(&shared.0);
                if seen.contains(&ptr) {
                    return Err(EncodeError::Cycle);
                }
                seen.push(ptr);
                let inner = shared.0.read().unwrap_or_else(PoisonError::into_inner);
                let result = inner.encode(seen);
                drop(inner);
                seen.pop();
                return result;
            }
            Self::Unserializable(text) => return Err(EncodeError::Unserializable(text.clone())),
        };
        Ok(Some(json))
    }

    fn render(&self, out: &mut String, seen: &mut Vec<*const RwLock<Value>>, nested: bool) {
        match self {
            Self::Null => out.push_str("null"),
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Int(i) => out.push_str(&i.to_string()),
            Self::UInt(u) => out.push_str(&u.to_string()),
            Self::Float(f) => out.push_str(&float_text(*f)),
            Self::BigInt(i) => out.push_str(&i.to_string()),
            Self::Symbol(desc) => {
                let _ = write!(out, "Symbol({})", desc.as_deref().unwrap_or(""));
            }
            Self::Function(src) | Self::Unserializable(src) => out.push_str(src),
            Self::Text(s) if nested => {
                let _ = write!(out, "{s:?}");
            }
            Self::Text(s) => out.push_str(s),
            Self::Error(e) => {
                let _ = write!(out, "{}: {}", e.name, e.message);
            }
            Self::Date(ts) => out.push_str(&iso_timestamp(*ts)),
            Self::Binary(b) => {
                out.push_str("<Buffer");
                for byte in b.iter() {
                    let _ = write!(out, " {byte:02x}");
                }
                out.push('>');
            }
            Self::Array(items) => {
                out.push('[');
                render_list(items.iter(), out, seen);
                out.push(']');
            }
            Self::Set(items) => {
                let _ = write!(out, "Set({}) {{", items.len());
                render_list(items.iter(), out, seen);
                out.push('}');
            }
            Self::Map(entries) => {
                let _ = write!(out, "Map({}) {{", entries.len());
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.render(out, seen, true);
                    out.push_str(" => ");
                    v.render(out, seen, true);
                }
                out.push('}');
            }
            Self::Regex(src) => {
                let _ = write!(out, "/{src}/");
            }
            Self::Object(fields) if fields.is_empty() => out.push_str("{}"),
            Self::Object(fields) => {
                out.push_str("{ ");
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{k}: ");
                    v.render(out, seen, true);
                }
                out.push_str(" }");
            }
            Self::Shared(shared) => {
                let ptr = Arc::as_ptr(&shared.0);
                if seen.contains(&ptr) {
                    out.push_str("[Circular]");
                    return;
                }
                seen.push(ptr);
                let inner = shared.0.read().unwrap_or_else(PoisonError::into_inner);
                inner.render(out, seen, nested);
                drop(inner);
                seen.pop();
            }
        }
    }
}

fn encode_items(items: &[Value], seen: &mut Vec<*const RwLock<Value>>) -> Result<Vec<Json>, EncodeError> {
    items.iter().map(|v| Ok(v.encode(seen)?.unwrap_or(Json::Null))).collect()
}

fn render_list<'a>(items: impl Iterator<Item = &'a Value>, out: &mut String, seen: &mut Vec<*const RwLock<Value>>) {
    for (i, v) in items.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        v.render(out, seen, true);
    }
}

/// Integral floats print without a fractional part, like `3` not `3.0`.
fn float_text(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_owned()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity".to_owned() } else { "-Infinity".to_owned() }
    } else if f.fract() == 0.0 && f.abs() < 1e21 {
        format!("{f:.0}")
    } else {
        f.to_string()
    }
}

/// ISO-8601 UTC with millisecond precision, e.g. `2024-01-02T03:04:05.678Z`.
pub(crate) fn iso_timestamp(ts: Timestamp) -> String {
    format!("{ts:.3}")
}

/// Renders the value as text. This is the fallback used whenever a value
/// has no structural encoding, so it never fails, cycles included.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.render(&mut out, &mut Vec::new(), false);
        f.write_str(&out)
    }
}

// ── ErrorValue ────────────────────────────────────────────────────────────────

/// An error-like value: name, message, optional stack, and extra fields.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorValue {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
    /// Extra own fields, merged after `name`/`message`/`stack` in order.
    pub extras: Vec<(String, Value)>,
}

impl ErrorValue {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        let name = name.into();
        let message = message.into();
        let stack = Some(format!("{name}: {message}"));
        Self { name, message, stack, extras: Vec::new() }
    }

    /// Captures a Rust error. The stack is the rendered source chain.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut value = Self::new("Error", err.to_string());
        let mut stack = format!("Error: {err}");
        let mut cause = err.source();
        while let Some(e) = cause {
            let _ = write!(stack, "\n    caused by: {e}");
            cause = e.source();
        }
        value.stack = Some(stack);
        value
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.push((key.into(), value.into()));
        self
    }

    /// The object shape `{ name, message, stack, ...extras }`. An extra
    /// that cannot be encoded is kept as its text rendering.
    pub fn to_json(&self) -> Json {
        self.encode(&mut Vec::new())
    }

    fn encode(&self, seen: &mut Vec<*const RwLock<Value>>) -> Json {
        let mut map = Map::new();
        map.insert("name".to_owned(), Json::String(self.name.clone()));
        map.insert("message".to_owned(), Json::String(self.message.clone()));
        if let Some(stack) = &self.stack {
            map.insert("stack".to_owned(), Json::String(stack.clone()));
        }
        for (k, v) in &self.extras {
            match v.encode(seen) {
                Ok(Some(json)) => {
                    map.insert(k.clone(), json);
                }
                Ok(None) => {}
                Err(_) => {
                    map.insert(k.clone(), Json::String(v.to_string()));
                }
            }
        }
        Json::Object(map)
    }
}

// ── Shared ────────────────────────────────────────────────────────────────────

/// A shared handle to a value. Clones point at the same slot.
#[derive(Clone)]
pub struct Shared(Arc<RwLock<Value>>);

impl Shared {
    pub fn new(value: impl Into<Value>) -> Self {
        Self(Arc::new(RwLock::new(value.into())))
    }

    /// Replaces the referenced value.
    pub fn set(&self, value: impl Into<Value>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = value.into();
    }

    /// A clone of the referenced value.
    pub fn get(&self) -> Value {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Identity comparison; a structural one could recurse forever.
impl PartialEq for Shared {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shared({:p})", Arc::as_ptr(&self.0))
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i.into())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i.into())
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        i64::try_from(i).map_or(Self::UInt(i), Self::Int)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Self::from(i as u64)
    }
}

impl From<i128> for Value {
    fn from(i: i128) -> Self {
        Self::BigInt(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Self::Binary(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(b.into())
    }
}

impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        Self::Date(ts)
    }
}

impl From<ErrorValue> for Value {
    fn from(e: ErrorValue) -> Self {
        Self::Error(e)
    }
}

impl From<Shared> for Value {
    fn from(s: Shared) -> Self {
        Self::Shared(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => Self::Text(s),
            Json::Array(items) => Self::Array(items.into_iter().map(Into::into).collect()),
            Json::Object(map) => Self::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}
