//! Canonical member ordering for records
//!
//! Two records with the same fields and values canonicalize to byte-identical
//! text no matter what order their members arrived in. History merge relies on
//! this to detect change with a plain textual comparison.

use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Field that always sorts first in every object
pub const ID_FIELD: &str = "id";

/// Reorder object members recursively: `id` first, the rest by name.
/// Array elements keep their order.
pub fn canonicalize(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let mut members: Vec<(String, Value)> = std::mem::take(map).into_iter().collect();
            members.sort_by(|(a, _), (b, _)| member_order(a, b));

            let mut sorted = Map::with_capacity(members.len());
            for (name, mut member) in members {
                canonicalize(&mut member);
                sorted.insert(name, member);
            }
            *map = sorted;
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                canonicalize(item);
            }
        }
        _ => {}
    }
}

fn member_order(a: &str, b: &str) -> Ordering {
    match (a == ID_FIELD, b == ID_FIELD) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.cmp(b),
    }
}

/// Parse JSON text and return its canonical compact form
pub fn canonical_text(text: &str) -> serde_json::Result<String> {
    let mut value: Value = serde_json::from_str(text)?;
    canonicalize(&mut value);
    serde_json::to_string(&value)
}
