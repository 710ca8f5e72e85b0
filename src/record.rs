//! Immutable metadata snapshot with dotted-path lookup.
//!
//! A [`MetadataRecord`] wraps the arbitrary nested document owned by the
//! resource entity. The pipeline never mutates it: the mapper reads
//! descriptive fields out of it by dotted path, and the orchestrator reads the
//! declared file-id list. Files attached to the resource after the snapshot
//! was captured are invisible here until the snapshot is refreshed.

use serde_json::Value;

/// Snapshot of a resource's metadata document at publish time.
#[derive(Debug, Clone)]
pub struct MetadataRecord {
    document: Value,
}

impl MetadataRecord {
    pub fn new(document: Value) -> Self {
        MetadataRecord { document }
    }

    /// Look up a value by dotted path, e.g. `title.0.value`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        get_path(&self.document, path)
    }

    /// String at `path`, if present and a string.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Whether `path` resolves to a non-empty value.
    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some_and(|v| !is_empty(v))
    }

    /// Ids declared under `resource_files[].id`. Only these files take part
    /// in the upload phase.
    pub fn file_ids(&self) -> Vec<i64> {
        self.get("resource_files")
            .and_then(Value::as_array)
            .map(|files| {
                files
                    .iter()
                    .filter_map(|f| f.get("id").and_then(Value::as_i64))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Walk `value` along a dotted path. Numeric segments index into arrays.
pub fn get_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Emptiness as the source documents use it: missing values, `null`, `""`,
/// `[]`, `{}`, `false` and `0` all count as empty.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}
