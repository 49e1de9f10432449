//! SQL dialect differences between target warehouses
//!
//! Everything the staging core needs to know about a warehouse is expressed
//! here as plain strings: type names, literal quoting, the clock expression,
//! and a few optional clauses.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::ColumnType;

/// Target warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    Redshift,
    Sqlite,
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "redshift" => Ok(Dialect::Redshift),
            "sqlite" => Ok(Dialect::Sqlite),
            _ => Err(format!(
                "Unknown dialect: {}. Use 'postgres', 'redshift' or 'sqlite'.",
                s
            )),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::Redshift => write!(f, "redshift"),
            Dialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl Dialect {
    /// Expression evaluating to the current time, used for history `updated`
    pub fn current_timestamp(self) -> &'static str {
        match self {
            Dialect::Postgres => "CURRENT_TIMESTAMP",
            Dialect::Redshift => "GETDATE()",
            // Millisecond resolution; 'now' is fixed for the whole statement
            Dialect::Sqlite => "strftime('%Y-%m-%d %H:%M:%f', 'now')",
        }
    }

    /// Declaration of the `data` payload column
    pub fn json_type(self) -> &'static str {
        match self {
            Dialect::Postgres => "JSON",
            Dialect::Redshift => "VARCHAR(65535)",
            Dialect::Sqlite => "TEXT",
        }
    }

    /// Declaration of the history `updated` column
    pub fn timestamp_type(self) -> &'static str {
        match self {
            Dialect::Postgres => "TIMESTAMPTZ",
            Dialect::Redshift => "TIMESTAMP",
            Dialect::Sqlite => "TEXT",
        }
    }

    pub fn column_type(self, column_type: ColumnType) -> &'static str {
        match (self, column_type) {
            (_, ColumnType::BigInt) => "BIGINT",
            (_, ColumnType::Boolean) => "BOOLEAN",
            (Dialect::Redshift, ColumnType::Numeric) => "DOUBLE PRECISION",
            (_, ColumnType::Numeric) => "NUMERIC",
            (Dialect::Sqlite, ColumnType::Timestamptz) => "TEXT",
            (_, ColumnType::Timestamptz) => "TIMESTAMPTZ",
            (_, ColumnType::Varchar) => "VARCHAR(65535)",
            (_, ColumnType::Id) => "VARCHAR(36)",
        }
    }

    /// Length of `s` in the unit text column limits are declared in
    pub fn value_len(self, s: &str) -> usize {
        match self {
            // VARCHAR(n) is n bytes on Redshift
            Dialect::Redshift => s.len(),
            _ => s.chars().count(),
        }
    }

    /// `expr` as text for comparing payloads
    pub fn payload_text(self, expr: &str) -> String {
        match self {
            // Payloads are VARCHAR(65535) already; a bare VARCHAR cast is VARCHAR(256)
            Dialect::Redshift => expr.to_string(),
            _ => format!("CAST({} AS VARCHAR)", expr),
        }
    }

    /// Quote a string as a SQL literal
    pub fn encode_string(self, s: &str) -> String {
        let mut literal = String::with_capacity(s.len() + 2);
        literal.push('\'');
        for c in s.chars() {
            match c {
                '\'' => literal.push_str("''"),
                // Redshift treats backslash as an escape inside literals
                '\\' if self == Dialect::Redshift => literal.push_str("\\\\"),
                // Text columns cannot hold NUL
                '\0' => {}
                c => literal.push(c),
            }
        }
        literal.push('\'');
        literal
    }

    /// Quote an identifier
    pub fn quote_ident(self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Trailing table options for `CREATE TABLE`
    pub fn table_options(self) -> &'static str {
        match self {
            Dialect::Redshift => " DISTKEY(sk) COMPOUND SORTKEY(sk)",
            _ => "",
        }
    }

    pub fn supports_comments(self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    pub fn supports_grants(self) -> bool {
        !matches!(self, Dialect::Sqlite)
    }

    /// Statement start for bulk inserts into a loading table
    pub fn insert_into(self) -> &'static str {
        match self {
            // Replaces the row holding the same key, and so the same id
            Dialect::Sqlite => "INSERT OR REPLACE INTO",
            _ => "INSERT INTO",
        }
    }

    /// Clause appended to bulk inserts so a repeated key replaces the earlier
    /// row. `None` where the warehouse has no upsert clause.
    pub fn upsert_clause(self, key: &str, columns: &[String]) -> Option<String> {
        match self {
            Dialect::Redshift | Dialect::Sqlite => None,
            Dialect::Postgres => {
                let assignments: Vec<String> = columns
                    .iter()
                    .filter(|c| c.as_str() != key)
                    .map(|c| format!("{} = excluded.{}", c, c))
                    .collect();
                Some(format!(" ON CONFLICT ({}) DO UPDATE SET {}", key, assignments.join(", ")))
            }
        }
    }

    /// Statements that move a renamed table's index names along with it.
    /// PostgreSQL keeps the loading table's index names after a rename, which
    /// would collide with the next loading table.
    pub fn rename_indexes(self, from: &str, to: &str) -> Vec<String> {
        match self {
            Dialect::Postgres => vec![
                format!("ALTER INDEX IF EXISTS {}_pkey RENAME TO {}_pkey", from, to),
                format!("ALTER INDEX IF EXISTS {}_id_key RENAME TO {}_id_key", from, to),
            ],
            _ => Vec::new(),
        }
    }
}
