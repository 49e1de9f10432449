//! Column type inference
//!
//! Turns the counters gathered by [`FieldStats`](super::FieldStats) into one
//! [`ColumnType`] per field. When the evidence is mixed the string type wins:
//! it is the only type every value can be loaded into.

use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::canonical::ID_FIELD;
use crate::types::{ColumnSchema, ColumnType, Counts};

/// Columns every loading table carries regardless of the inferred schema
pub const FIXED_COLUMNS: [&str; 4] = ["sk", "id", "data", "tenant_id"];

/// Decides a column type from a field's statistics
pub trait TypeClassifier: Send + Sync {
    fn classify(&self, field: &str, counts: &Counts) -> ColumnType;
}

/// Unanimity-based classification: a specific type is chosen only when every
/// non-null occurrence supports it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl TypeClassifier for DefaultClassifier {
    fn classify(&self, field: &str, counts: &Counts) -> ColumnType {
        let non_null = counts.non_null();

        // Only nulls seen: nothing to go on
        if non_null == 0 {
            return ColumnType::Varchar;
        }

        if counts.boolean == non_null {
            return ColumnType::Boolean;
        }

        if counts.number == non_null {
            return if counts.floating > 0 {
                ColumnType::Numeric
            } else {
                ColumnType::BigInt
            };
        }

        if counts.string == non_null {
            if counts.uuid == counts.string && is_reference_name(field) {
                return ColumnType::Id;
            }
            if counts.date_time == counts.string {
                return ColumnType::Timestamptz;
            }
        }

        ColumnType::Varchar
    }
}

/// Field names like `userId` or `owner_id` point at another record
pub fn is_reference_name(field: &str) -> bool {
    field != ID_FIELD && (field.ends_with("Id") || field.ends_with("_id"))
}

/// Convert a source field name to a column name: `userId` -> `user_id`,
/// `HTTPStatus` -> `http_status`. Characters outside `[A-Za-z0-9_]` become `_`.
pub fn column_name(field: &str) -> String {
    let chars: Vec<char> = field.chars().collect();
    let mut name = String::with_capacity(field.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.map_or(false, |n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary && !name.ends_with('_') {
                name.push('_');
            }
            name.push(c.to_ascii_lowercase());
        } else if c.is_ascii_alphanumeric() || c == '_' {
            name.push(c);
        } else {
            name.push('_');
        }
    }

    name
}

/// Build the inferred column list for a table. Columns come out in source
/// field order, which for the counters is lexicographic.
pub fn infer_columns(
    table: &str,
    fields: BTreeMap<String, Counts>,
    classifier: &dyn TypeClassifier,
) -> Vec<ColumnSchema> {
    let mut taken: HashSet<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
    let mut columns = Vec::with_capacity(fields.len());

    for (field, counts) in fields {
        if field == ID_FIELD {
            continue;
        }

        let name = column_name(&field);
        let column_type = classifier.classify(&field, &counts);
        let column = ColumnSchema::new(name, field, column_type);

        let collides = taken.contains(&column.name)
            || (column_type == ColumnType::Id && taken.contains(&column.key_column_name()));
        if collides {
            warn!(
                table,
                field = column.source_name.as_str(),
                column = column.name.as_str(),
                "column name already in use, field is kept in data only"
            );
            continue;
        }

        taken.insert(column.name.clone());
        if column_type == ColumnType::Id {
            taken.insert(column.key_column_name());
        }

        debug!(
            table,
            column = column.name.as_str(),
            column_type = %column.column_type,
            "inferred column"
        );
        columns.push(column);
    }

    columns
}
