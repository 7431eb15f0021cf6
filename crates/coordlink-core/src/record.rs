//! Dynamic record model for decoded messages and shared objects.

use std::sync::{Arc, RwLock};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::{Map, Value};

/// A decoded message or shared-object instance.
///
/// Records are schema-less field maps; the registry/catalog implementations
/// decide what a given type id's payload decodes into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Wrap an existing field map.
    #[must_use]
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Borrow the underlying field map.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Get a raw field value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Get a field as an unsigned integer.
    #[must_use]
    pub fn u64(&self, name: &str) -> Option<u64> {
        self.fields.get(name).and_then(Value::as_u64)
    }

    /// Get a field as a string slice.
    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Get a field as an array of values.
    #[must_use]
    pub fn array(&self, name: &str) -> Option<&Vec<Value>> {
        self.fields.get(name).and_then(Value::as_array)
    }

    /// Decode a base64-carried bytes field.
    #[must_use]
    pub fn bytes(&self, name: &str) -> Option<Vec<u8>> {
        self.str(name).and_then(|s| BASE64.decode(s).ok())
    }

    /// Replace this record's contents with another's.
    ///
    /// This is the stable-slot update: holders of the surrounding
    /// [`SharedObject`] observe the new contents without the handle changing.
    pub fn copy_from(&mut self, other: &Self) {
        self.fields = other.fields.clone();
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

/// Identity-preserving handle to a cached shared object.
///
/// The cache updates the record in place; treat the contents as read-only.
pub type SharedObject = Arc<RwLock<Record>>;

/// Wrap a record for cache storage.
#[must_use]
pub fn shared(record: Record) -> SharedObject {
    Arc::new(RwLock::new(record))
}

/// A single key-field value in canonical, hashable form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    /// Unsigned integer key field.
    Uint(u64),
    /// Signed integer key field.
    Int(i64),
    /// String key field.
    Str(String),
}

impl KeyValue {
    /// Canonicalize a JSON value into a key component.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .map(Self::Uint)
                .or_else(|| n.as_i64().map(Self::Int)),
            Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }
}

/// Ordered tuple of key-field values identifying a keyed shared object.
///
/// A single-field key is a one-element tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(pub Vec<KeyValue>);

impl ObjectKey {
    /// Extract a key from a record given its type's key-field names.
    ///
    /// Returns `None` if any field is missing or has an unkeyable shape.
    #[must_use]
    pub fn extract(record: &Record, fields: &[String]) -> Option<Self> {
        let mut parts = Vec::with_capacity(fields.len());
        for name in fields {
            parts.push(KeyValue::from_value(record.get(name)?)?);
        }
        Some(Self(parts))
    }
}

impl From<u64> for ObjectKey {
    fn from(id: u64) -> Self {
        Self(vec![KeyValue::Uint(id)])
    }
}
