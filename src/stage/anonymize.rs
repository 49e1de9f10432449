//! Redaction of personal data before loading
//!
//! Field paths are slash-delimited and start after the record root, so the
//! `email` member of the `personal` object of a record is `/personal/email`
//! and the first element of a `phones` array is `/phones/0`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Decides which values of a table must be redacted
pub trait Anonymizer: Send + Sync {
    fn is_sensitive(&self, table: &str, path: &str) -> bool;

    /// Whether any path of `table` can be sensitive; lets callers skip the walk
    fn applies_to(&self, _table: &str) -> bool {
        true
    }
}

/// Never redacts anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAnonymization;

impl Anonymizer for NoAnonymization {
    fn is_sensitive(&self, _table: &str, _path: &str) -> bool {
        false
    }

    fn applies_to(&self, _table: &str) -> bool {
        false
    }
}

/// Exact field paths to redact, per table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPaths {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl FieldPaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, table: impl Into<String>, path: impl Into<String>) -> Self {
        self.tables.entry(table.into()).or_default().insert(path.into());
        self
    }
}

impl Anonymizer for FieldPaths {
    fn is_sensitive(&self, table: &str, path: &str) -> bool {
        self.tables.get(table).map_or(false, |paths| paths.contains(path))
    }

    fn applies_to(&self, table: &str) -> bool {
        self.tables.get(table).map_or(false, |paths| !paths.is_empty())
    }
}

/// Return `record` with every sensitive scalar replaced: booleans by `false`,
/// numbers by `0`, strings by `""`. Nulls and containers are left alone.
pub fn redact(table: &str, record: Value, anonymizer: &dyn Anonymizer) -> Value {
    if !anonymizer.applies_to(table) {
        return record;
    }
    let mut path = String::new();
    redact_at(table, record, &mut path, anonymizer)
}

fn redact_at(table: &str, value: Value, path: &mut String, anonymizer: &dyn Anonymizer) -> Value {
    match value {
        Value::Bool(_) if anonymizer.is_sensitive(table, path) => Value::Bool(false),
        Value::Number(_) if anonymizer.is_sensitive(table, path) => Value::Number(0.into()),
        Value::String(_) if anonymizer.is_sensitive(table, path) => Value::String(String::new()),
        Value::Object(members) => {
            let mut redacted = Map::with_capacity(members.len());
            for (name, member) in members {
                let len = path.len();
                path.push('/');
                path.push_str(&name);
                let member = redact_at(table, member, path, anonymizer);
                path.truncate(len);
                redacted.insert(name, member);
            }
            Value::Object(redacted)
        }
        Value::Array(items) => {
            let mut redacted = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                let len = path.len();
                path.push('/');
                path.push_str(&index.to_string());
                redacted.push(redact_at(table, item, path, anonymizer));
                path.truncate(len);
            }
            Value::Array(redacted)
        }
        other => other,
    }
}
