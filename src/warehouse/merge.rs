//! History merge and promotion
//!
//! History is append-only. A merge adds a version of a record only when the
//! record is new or its payload text differs from the latest version already
//! in history, so merging the same snapshot twice adds nothing.

use tracing::info;

use super::tables::{create_history_table, history_table_name, latest_table_name, loading_table_name};
use super::{run, Dialect, SqlExecutor};
use crate::Result;

/// Select the latest history version of each (tenant, id) into a temporary
/// table. Rows with tied timestamps are all kept.
pub fn latest_versions_sql(table: &str) -> String {
    let history = history_table_name(table);
    format!(
        "CREATE TEMPORARY TABLE {latest} AS
SELECT id, data, tenant_id
    FROM {history} AS h1
    WHERE NOT EXISTS
      ( SELECT 1
            FROM {history} AS h2
            WHERE h1.tenant_id = h2.tenant_id AND
                  h1.id = h2.id AND
                  h1.updated < h2.updated
      )",
        latest = latest_table_name(table),
        history = history,
    )
}

/// Append each snapshot row that is new or changed. Rows with a NULL
/// payload are never appended.
pub fn append_changes_sql(table: &str, dialect: Dialect) -> String {
    format!(
        "INSERT INTO {history}
    (id, data, updated, tenant_id)
SELECT s.id,
       s.data,
       {now},
       s.tenant_id
    FROM {loading} AS s
        LEFT JOIN {latest} AS h
            ON s.tenant_id = h.tenant_id AND
               s.id = h.id
    WHERE s.data IS NOT NULL AND
          ( h.id IS NULL OR
            {new_text} <> {old_text} )",
        history = history_table_name(table),
        now = dialect.current_timestamp(),
        loading = loading_table_name(table),
        latest = latest_table_name(table),
        new_text = dialect.payload_text("s.data"),
        old_text = dialect.payload_text("h.data"),
    )
}

/// Merge the loading table of `table` into its history, returning the number
/// of history rows appended. The history table is created if missing.
pub fn merge_table<E: SqlExecutor + ?Sized>(exec: &mut E, table: &str, dialect: Dialect) -> Result<u64> {
    let latest = latest_table_name(table);

    create_history_table(exec, table, dialect)?;
    run(exec, &format!("DROP TABLE IF EXISTS {}", latest))?;
    run(exec, &latest_versions_sql(table))?;
    let appended = run(exec, &append_changes_sql(table, dialect))?;
    run(exec, &format!("DROP TABLE IF EXISTS {}", latest))?;

    info!(table, appended, "merged into {}", history_table_name(table));
    Ok(appended)
}

/// Replace the live table with the loading table in one transaction
pub fn promote_table<E: SqlExecutor + ?Sized>(exec: &mut E, table: &str, dialect: Dialect) -> Result<()> {
    let loading = loading_table_name(table);

    let mut statements = vec![
        format!("DROP TABLE IF EXISTS {}", table),
        format!("ALTER TABLE {} RENAME TO {}", loading, table),
    ];
    statements.extend(dialect.rename_indexes(&loading, table));

    exec.transaction(&statements)?;
    info!(table, "promoted {}", loading);
    Ok(())
}
