//! System catalog
//!
//! `kiln_main` holds the catalog version in a single row. `kiln_tables` holds
//! one row per staged table with the time it was last promoted and its live
//! and history row counts.

use tracing::info;

use super::tables::history_table_name;
use super::{run, Dialect, SqlExecutor};
use crate::Result;

pub const CATALOG_VERSION: i64 = 1;

pub const MAIN_TABLE: &str = "kiln_main";
pub const TABLES_TABLE: &str = "kiln_tables";

pub fn create_catalog_sql(dialect: Dialect) -> Vec<String> {
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    database_version BIGINT NOT NULL\n)",
            MAIN_TABLE
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    table_name VARCHAR(63) NOT NULL,\n    updated {},\n    row_count BIGINT,\n    history_row_count BIGINT,\n    PRIMARY KEY (table_name)\n)",
            TABLES_TABLE,
            dialect.timestamp_type()
        ),
    ]
}

/// Create the catalog tables if missing and stamp the catalog version
pub fn create_catalog<E: SqlExecutor + ?Sized>(exec: &mut E, dialect: Dialect) -> Result<()> {
    for sql in create_catalog_sql(dialect) {
        run(exec, &sql)?;
    }
    exec.transaction(&[
        format!("DELETE FROM {}", MAIN_TABLE),
        format!("INSERT INTO {} (database_version) VALUES ({})", MAIN_TABLE, CATALOG_VERSION),
    ])
}

/// Statements replacing the catalog row of `table` with fresh counts
pub fn record_table_sql(table: &str, dialect: Dialect) -> Vec<String> {
    let name = dialect.encode_string(table);
    vec![
        format!("DELETE FROM {} WHERE table_name = {}", TABLES_TABLE, name),
        format!(
            "INSERT INTO {catalog}
    (table_name, updated, row_count, history_row_count)
SELECT {name},
       {now},
       (SELECT COUNT(*) FROM {table}),
       (SELECT COUNT(*) FROM {history})",
            catalog = TABLES_TABLE,
            name = name,
            now = dialect.current_timestamp(),
            table = table,
            history = history_table_name(table),
        ),
    ]
}

/// Record `table` in the catalog. Both the live and history tables must exist.
pub fn record_table<E: SqlExecutor + ?Sized>(exec: &mut E, table: &str, dialect: Dialect) -> Result<()> {
    exec.transaction(&record_table_sql(table, dialect))?;
    info!(table, "recorded in {}", TABLES_TABLE);
    Ok(())
}
