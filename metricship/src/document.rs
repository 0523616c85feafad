//! The structured document shipped to the sink.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single structured record, serialized as a JSON object.
///
/// Documents are built once by the [`RecordBuilder`](crate::record::RecordBuilder)
/// and never mutated afterwards; there are no mutable accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Wraps an already-built field map.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// All top-level fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Looks up a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Looks up a nested field by walking `path` through JSON objects.
    ///
    /// Returns `None` if any segment is missing or an intermediate value is
    /// not an object.
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.0.get(*first)?, |value, key| value.as_object()?.get(*key))
    }

    /// Consumes the document, returning its field map.
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

/// Recursively merges `overlay` into `target`.
///
/// Objects present on both sides are merged key by key; any other value in
/// `overlay` replaces the value in `target`.
pub(crate) fn merge_into(target: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => merge_into(existing, nested),
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}
