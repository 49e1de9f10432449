//! Encoding records as SQL tuples
//!
//! A tuple holds, in order: the record's surrogate key, its natural id, one
//! literal per inferred column (two for identifier references: the
//! referenced key, then the UUID text), the `data` payload, and the tenant.

use serde_json::Value;
use tracing::warn;

use crate::canonical::ID_FIELD;
use crate::types::{ColumnSchema, ColumnType, StageConfig, StageWarning, TableSchema};
use crate::warehouse::keys::{KeyStore, GLOBAL_NAMESPACE};
use crate::Result;

const NULL: &str = "NULL";

/// Column name used in warnings about the payload
pub const DATA_COLUMN: &str = "data";

/// One encoded row, ready to be appended to an insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    pub sk: i64,
    pub text: String,
}

/// Turns canonicalized records into tuples for one loading table
pub struct TupleEncoder<'a> {
    schema: &'a TableSchema,
    config: &'a StageConfig,
    keys: &'a dyn KeyStore,
    warnings: Vec<StageWarning>,
}

/// Identity of the record being encoded, for warnings
struct Located<'r> {
    sk: i64,
    id: &'r str,
}

impl<'a> TupleEncoder<'a> {
    pub fn new(schema: &'a TableSchema, config: &'a StageConfig, keys: &'a dyn KeyStore) -> Self {
        TupleEncoder {
            schema,
            config,
            keys,
            warnings: Vec::new(),
        }
    }

    /// Encode `record`, or `None` if it has no usable natural id
    pub fn encode(&mut self, record: &Value) -> Result<Option<Tuple>> {
        let schema = self.schema;
        let table = &schema.table_name;

        let id = match record.get(ID_FIELD) {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
            _ => {
                warn!(table = %table, "record without usable id skipped");
                self.warnings.push(StageWarning::MissingId {
                    table: table.clone(),
                });
                return Ok(None);
            }
        };

        // The id column is NOT NULL, so an oversized id cannot be nulled out
        if self.too_long(&id) {
            warn!(table = %table, len = id.len(), "record with oversized id skipped");
            self.warnings.push(StageWarning::MissingId {
                table: table.clone(),
            });
            return Ok(None);
        }

        let sk = self.keys.resolve(table, &id)?;
        let at = Located { sk, id: &id };

        let mut text = String::with_capacity(256);
        text.push('(');
        text.push_str(&sk.to_string());
        text.push(',');
        text.push_str(&self.config.dialect.encode_string(&id));

        for column in &schema.columns {
            text.push(',');
            let literal = self.column_literal(column, record.get(&column.source_name), &at)?;
            text.push_str(&literal);
        }

        text.push(',');
        let payload = self.payload(record, &at)?;
        text.push_str(&payload);
        text.push(',');
        text.push_str(&self.config.tenant_id.to_string());
        text.push(')');

        Ok(Some(Tuple { sk, text }))
    }

    /// Warnings raised so far, leaving none behind
    pub fn take_warnings(&mut self) -> Vec<StageWarning> {
        std::mem::take(&mut self.warnings)
    }

    fn column_literal(&mut self, column: &ColumnSchema, value: Option<&Value>, at: &Located<'_>) -> Result<String> {
        let value = match value {
            None | Some(Value::Null) => {
                return Ok(match column.column_type {
                    ColumnType::Id => format!("{},{}", NULL, NULL),
                    _ => NULL.to_string(),
                });
            }
            Some(value) => value,
        };

        let literal = match (column.column_type, value) {
            (ColumnType::BigInt, Value::Number(n)) if n.is_i64() => n.to_string(),
            (ColumnType::Numeric, Value::Number(n)) => n.to_string(),
            (ColumnType::Boolean, Value::Bool(b)) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            (ColumnType::Id, Value::String(uuid)) => {
                let key = self.keys.resolve(GLOBAL_NAMESPACE, uuid)?;
                format!("{},{}", key, self.string_literal(&column.name, uuid, at))
            }
            (ColumnType::Varchar | ColumnType::Timestamptz, Value::String(s)) => {
                self.string_literal(&column.name, s, at)
            }
            // Text columns keep the JSON text of any other value
            (ColumnType::Varchar, other) => {
                let text = serde_json::to_string(other)?;
                self.string_literal(&column.name, &text, at)
            }
            (column_type, _) => {
                self.push_warning(&column.name, at, false);
                match column_type {
                    ColumnType::Id => format!("{},{}", NULL, NULL),
                    _ => NULL.to_string(),
                }
            }
        };
        Ok(literal)
    }

    /// Quoted `s`, or NULL with a warning when it is over the size ceiling
    fn string_literal(&mut self, column: &str, s: &str, at: &Located<'_>) -> String {
        if self.too_long(s) {
            self.push_warning(column, at, true);
            return NULL.to_string();
        }
        self.config.dialect.encode_string(s)
    }

    /// Pretty text of the record, the compact text if that is too long, or
    /// NULL if both are
    fn payload(&mut self, record: &Value, at: &Located<'_>) -> Result<String> {
        let pretty = serde_json::to_string_pretty(record)?;
        if !self.too_long(&pretty) {
            return Ok(self.config.dialect.encode_string(&pretty));
        }

        let compact = serde_json::to_string(record)?;
        if !self.too_long(&compact) {
            return Ok(self.config.dialect.encode_string(&compact));
        }

        self.push_warning(DATA_COLUMN, at, true);
        Ok(NULL.to_string())
    }

    fn too_long(&self, s: &str) -> bool {
        let limit = self.config.max_value_len;
        s.len() > limit && self.config.dialect.value_len(s) > limit
    }

    fn push_warning(&mut self, column: &str, at: &Located<'_>, oversized: bool) {
        let table = self.schema.table_name.clone();
        let column = column.to_string();
        let id = at.id.to_string();

        let warning = if oversized {
            StageWarning::OversizedValue { table, column, sk: at.sk, id }
        } else {
            StageWarning::TypeMismatch { table, column, sk: at.sk, id }
        };
        warn!(table = %self.schema.table_name, sk = at.sk, id = %at.id, "{}", warning);
        self.warnings.push(warning);
    }
}
