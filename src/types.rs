use serde::{Deserialize, Serialize};
use std::fmt;

use crate::warehouse::dialect::Dialect;

/// Largest value, in characters, that fits a string column or the `data` payload.
pub const MAX_VALUE_LEN: usize = 65535;

/// Size, in characters, past which a pending insert statement is flushed.
pub const FLUSH_THRESHOLD: usize = 10_000_000;

/// Per-field statistics gathered during the analysis pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub total: usize,
    pub null: usize,
    pub boolean: usize,
    pub number: usize,
    pub integer: usize,
    pub floating: usize,
    pub string: usize,
    pub uuid: usize,
    pub date_time: usize,
}

impl Counts {
    /// Occurrences that carried a value
    pub fn non_null(&self) -> usize {
        self.total - self.null
    }
}

/// Relational type chosen for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    BigInt,
    Boolean,
    Numeric,
    Timestamptz,
    Varchar,
    /// A UUID pointing at another record; loaded with a companion `_sk` column
    Id,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::BigInt => "bigint",
            ColumnType::Boolean => "boolean",
            ColumnType::Numeric => "numeric",
            ColumnType::Timestamptz => "timestamptz",
            ColumnType::Varchar => "varchar",
            ColumnType::Id => "id",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inferred column of a loading table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name in the warehouse, e.g. "user_id"
    pub name: String,

    /// Top-level field in the source record, e.g. "userId"
    pub source_name: String,

    pub column_type: ColumnType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, source_name: impl Into<String>, column_type: ColumnType) -> Self {
        ColumnSchema {
            name: name.into(),
            source_name: source_name.into(),
            column_type,
        }
    }

    /// Name of the companion surrogate key column for `Id` columns
    pub fn key_column_name(&self) -> String {
        format!("{}_sk", self.name)
    }
}

/// Schema of one logical table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,

    /// Inferred columns, in declaration order
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,

    /// Where the records came from, used for the table comment
    #[serde(default)]
    pub source_path: Option<String>,

    #[serde(default)]
    pub module_name: Option<String>,
}

impl TableSchema {
    pub fn new(table_name: impl Into<String>) -> Self {
        TableSchema {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source_path: impl Into<String>, module_name: impl Into<String>) -> Self {
        self.source_path = Some(source_path.into());
        self.module_name = Some(module_name.into());
        self
    }
}

/// Which of the two passes over a table's pages is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Analyze,
    Load,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pass::Analyze => f.write_str("analyze"),
            Pass::Load => f.write_str("load"),
        }
    }
}

/// A non-fatal problem found while loading, kept so the record can be located later
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageWarning {
    /// A value exceeded the column limit and was stored as NULL
    OversizedValue {
        table: String,
        column: String,
        sk: i64,
        id: String,
    },
    /// A value did not match its inferred column type and was stored as NULL
    TypeMismatch {
        table: String,
        column: String,
        sk: i64,
        id: String,
    },
    /// A record had no natural id, or one too long to store, and was skipped
    MissingId { table: String },
}

impl fmt::Display for StageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageWarning::OversizedValue { table, column, sk, id } => write!(
                f,
                "value exceeds database limit: table {}, column {}, sk {}, id {}: stored as NULL",
                table, column, sk, id
            ),
            StageWarning::TypeMismatch { table, column, sk, id } => write!(
                f,
                "value does not match column type: table {}, column {}, sk {}, id {}: stored as NULL",
                table, column, sk, id
            ),
            StageWarning::MissingId { table } => {
                write!(f, "record without usable id skipped: table {}", table)
            }
        }
    }
}

/// Configuration for staging one table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Target warehouse dialect
    pub dialect: Dialect,

    /// Tenant written to every loaded and history row
    pub tenant_id: i16,

    /// Column and payload size ceiling in characters
    pub max_value_len: usize,

    /// Pending statement size that triggers a flush
    pub flush_threshold: usize,

    /// Role granted SELECT on each loading table, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_select_to: Option<String>,
}

impl Default for StageConfig {
    fn default() -> Self {
        StageConfig {
            dialect: Dialect::Postgres,
            tenant_id: 1,
            max_value_len: MAX_VALUE_LEN,
            flush_threshold: FLUSH_THRESHOLD,
            grant_select_to: None,
        }
    }
}
