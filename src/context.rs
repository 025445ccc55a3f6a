//! Diagnostic context capture — an insertion-ordered map whose values are
//! JSON-safe by construction.
//!
//! Values are sanitized at insert time: direct JSON encoding where possible,
//! a `Debug` string where not, and a bracketed type-name placeholder for
//! opaque things like connections and closures. Capture never fails, so
//! inspecting or serializing a stored context never fails either.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered `key -> JSON value` diagnostic context attached to an error record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorContext {
    entries: Map<String, Value>,
}

/// Bracketed type-name placeholder for values that cannot be captured.
fn placeholder<T: ?Sized>() -> Value {
    Value::String(format!("[{}]", std::any::type_name::<T>()))
}

impl ErrorContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a serializable value.
    ///
    /// JSON-native values are stored verbatim. If the encoder rejects the
    /// value (e.g. a map with non-string keys, or a failing `Serialize`
    /// impl), it degrades to the type-name placeholder instead of failing.
    pub fn insert<T: Serialize + ?Sized>(&mut self, key: impl Into<String>, value: &T) -> &mut Self {
        let value = serde_json::to_value(value).unwrap_or_else(|_| placeholder::<T>());
        self.entries.insert(key.into(), value);
        self
    }

    /// Insert a value by its `Debug` rendering — for types without `Serialize`.
    pub fn insert_debug<T: std::fmt::Debug + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> &mut Self {
        self.entries
            .insert(key.into(), Value::String(format!("{:?}", value)));
        self
    }

    /// Record that a value of type `T` was present without capturing it —
    /// for handles, connections, closures.
    pub fn insert_opaque<T: ?Sized>(&mut self, key: impl Into<String>) -> &mut Self {
        self.entries.insert(key.into(), placeholder::<T>());
        self
    }

    /// Chaining variant of [`insert`](Self::insert).
    pub fn with<T: Serialize + ?Sized>(mut self, key: impl Into<String>, value: &T) -> Self {
        self.insert(key, value);
        self
    }

    /// Chaining variant of [`insert_debug`](Self::insert_debug).
    pub fn with_debug<T: std::fmt::Debug + ?Sized>(
        mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Self {
        self.insert_debug(key, value);
        self
    }

    /// Chaining variant of [`insert_opaque`](Self::insert_opaque).
    pub fn with_opaque<T: ?Sized>(mut self, key: impl Into<String>) -> Self {
        self.insert_opaque::<T>(key);
        self
    }

    /// Look up a captured value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// The underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.entries
    }
}

impl From<Map<String, Value>> for ErrorContext {
    fn from(entries: Map<String, Value>) -> Self {
        Self { entries }
    }
}
