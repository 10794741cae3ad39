#![forbid(unsafe_code)]

//! Dynamic values and shared objects.
//!
//! The root object an application binds against is an arbitrary nested map.
//! [`ObjectRef`] is a reference-counted, interior-mutable map with *identity*:
//! two handles are the same object only if they point at the same allocation
//! ([`ObjectRef::ptr_eq`]). Change notifications are filtered by that identity.
//!
//! # Equality
//!
//! - `PartialEq` on [`Value`] is structural (objects compare by contents).
//! - [`Value::same`] is identity: scalars compare by value, lists and objects
//!   by reference. Writes use `same` to decide whether anything changed.
//!
//! # Unset
//!
//! A slot is *unset* when it holds [`Value::Missing`] or [`Value::Null`].
//! Defaults are only materialized into unset slots.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// A dynamically typed value stored in the object graph.
#[derive(Clone, Default)]
pub enum Value {
    /// No value present (absent key).
    #[default]
    Missing,
    /// Explicit null.
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// Shared immutable list; identity is the allocation.
    List(Rc<Vec<Value>>),
    /// Nested object.
    Object(ObjectRef),
}

impl Value {
    /// Build a list value.
    #[must_use]
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(Rc::new(items.into_iter().collect()))
    }

    /// Whether this value counts as unset (`Missing` or `Null`).
    #[must_use]
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Missing | Self::Null)
    }

    /// Truthiness in the loose sense used for annotations like `blur`.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Missing | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Text(s) => !s.is_empty(),
            Self::List(_) | Self::Object(_) => true,
        }
    }

    /// Identity comparison: scalars by value, lists and objects by reference.
    #[must_use]
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Missing, Self::Missing) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Short type name used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Object(_) => "object",
        }
    }

    /// Convert to a JSON value. `Missing` becomes `null` at the top level and
    /// is omitted inside objects.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Missing | Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Self::Object(o) => o.to_json(),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b) || a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => self.same(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("Missing"),
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::List(items) => f.debug_list().entries(items.iter()).finish(),
            Self::Object(o) => o.fmt(f),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Self::Object(v)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::Text(s.clone()),
            serde_json::Value::Array(items) => Self::list(items.iter().map(Value::from)),
            serde_json::Value::Object(map) => Self::Object(ObjectRef::from_json_map(map)),
        }
    }
}

// ---------------------------------------------------------------------------
// ObjectRef
// ---------------------------------------------------------------------------

/// Shared, mutable string-keyed map with reference identity.
///
/// Cloning an `ObjectRef` clones the handle, not the map.
#[derive(Clone, Default)]
pub struct ObjectRef {
    inner: Rc<RefCell<BTreeMap<String, Value>>>,
}

impl ObjectRef {
    /// Create a new empty object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an object from key/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let map = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            inner: Rc::new(RefCell::new(map)),
        }
    }

    /// Read a key. Absent keys read as [`Value::Missing`].
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        self.inner.borrow().get(key).cloned().unwrap_or_default()
    }

    /// Assign a key, returning the previous value if any.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.inner.borrow_mut().insert(key.into(), value.into())
    }

    /// Remove a key, returning the previous value if any.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.borrow_mut().remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.borrow().contains_key(key)
    }

    /// Snapshot of the current keys, in sorted order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Whether both handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stable identity of this object for the lifetime of any handle to it.
    #[must_use]
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    /// Return the nested object stored at `key`, creating an empty one if the
    /// slot is unset. Returns `None` (and leaves the slot untouched) if the
    /// slot holds a non-object value.
    pub fn child_object(&self, key: &str) -> Option<ObjectRef> {
        let mut map = self.inner.borrow_mut();
        match map.get(key) {
            Some(Value::Object(o)) => Some(o.clone()),
            Some(v) if !v.is_unset() => None,
            _ => {
                let child = ObjectRef::new();
                map.insert(key.to_owned(), Value::Object(child.clone()));
                Some(child)
            }
        }
    }

    /// Serialize the whole object graph to JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let map = self.inner.borrow();
        let mut out = serde_json::Map::with_capacity(map.len());
        for (k, v) in map.iter() {
            if matches!(v, Value::Missing) {
                continue;
            }
            out.insert(k.clone(), v.to_json());
        }
        serde_json::Value::Object(out)
    }

    /// Build an object graph from a JSON map.
    #[must_use]
    pub fn from_json_map(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        Self::from_pairs(map.iter().map(|(k, v)| (k.clone(), Value::from(v))))
    }

    /// Build an object from any JSON value; non-objects yield an empty object.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Object(map) => Self::from_json_map(map),
            _ => Self::new(),
        }
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.inner.borrow() == *other.inner.borrow()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(map) => f.debug_map().entries(map.iter()).finish(),
            Err(_) => f.write_str("{<borrowed>}"),
        }
    }
}
