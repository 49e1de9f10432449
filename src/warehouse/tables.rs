//! Table naming and DDL

use tracing::info;

use super::{run, Dialect, SqlExecutor};
use crate::types::{ColumnType, StageConfig, TableSchema};
use crate::Result;

pub fn loading_table_name(table: &str) -> String {
    format!("{}_loading", table)
}

pub fn history_table_name(table: &str) -> String {
    format!("history_{}", table)
}

/// Temporary table holding the latest history version of each record
pub fn latest_table_name(table: &str) -> String {
    format!("{}_history_latest", table)
}

/// Columns of a loading table in declaration order, paired with their types
fn loading_column_defs(schema: &TableSchema, dialect: Dialect) -> Vec<(String, String)> {
    let mut defs = vec![
        ("sk".to_string(), "BIGINT NOT NULL".to_string()),
        (
            "id".to_string(),
            format!("{} NOT NULL", dialect.column_type(ColumnType::Varchar)),
        ),
    ];

    for column in &schema.columns {
        if column.column_type == ColumnType::Id {
            defs.push((dialect.quote_ident(&column.key_column_name()), "BIGINT".to_string()));
        }
        defs.push((
            dialect.quote_ident(&column.name),
            dialect.column_type(column.column_type).to_string(),
        ));
    }

    defs.push(("data".to_string(), dialect.json_type().to_string()));
    defs.push(("tenant_id".to_string(), "SMALLINT NOT NULL".to_string()));
    defs
}

/// Column names of a loading table as they appear in statements
pub fn loading_columns(schema: &TableSchema, dialect: Dialect) -> Vec<String> {
    loading_column_defs(schema, dialect)
        .into_iter()
        .map(|(name, _)| name)
        .collect()
}

pub fn create_loading_table_sql(schema: &TableSchema, dialect: Dialect) -> String {
    let columns: Vec<String> = loading_column_defs(schema, dialect)
        .into_iter()
        .map(|(name, decl)| format!("    {} {}", name, decl))
        .collect();

    format!(
        "CREATE TABLE {} (\n{},\n    PRIMARY KEY (sk),\n    UNIQUE (id)\n){}",
        loading_table_name(&schema.table_name),
        columns.join(",\n"),
        dialect.table_options()
    )
}

pub fn create_history_table_sql(table: &str, dialect: Dialect) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    id {} NOT NULL,\n    data {} NOT NULL,\n    updated {} NOT NULL,\n    tenant_id SMALLINT NOT NULL\n)",
        history_table_name(table),
        dialect.column_type(ColumnType::Varchar),
        dialect.json_type(),
        dialect.timestamp_type()
    )
}

/// `COMMENT ON TABLE` describing where the records came from
pub fn table_comment_sql(schema: &TableSchema, dialect: Dialect) -> Option<String> {
    if !dialect.supports_comments() {
        return None;
    }
    let source = schema.source_path.as_deref()?;
    let text = match schema.module_name.as_deref() {
        Some(module) => format!("{} in {}", source, module),
        None => source.to_string(),
    };
    Some(format!(
        "COMMENT ON TABLE {} IS {}",
        loading_table_name(&schema.table_name),
        dialect.encode_string(&text)
    ))
}

/// Replace any earlier loading table with an empty one for `schema`
pub fn create_loading_table<E: SqlExecutor + ?Sized>(
    exec: &mut E,
    schema: &TableSchema,
    config: &StageConfig,
) -> Result<()> {
    let loading = loading_table_name(&schema.table_name);
    info!(table = %schema.table_name, columns = schema.columns.len(), "creating {}", loading);

    run(exec, &format!("DROP TABLE IF EXISTS {}", loading))?;
    run(exec, &create_loading_table_sql(schema, config.dialect))?;

    if let Some(comment) = table_comment_sql(schema, config.dialect) {
        run(exec, &comment)?;
    }
    if let Some(role) = config.grant_select_to.as_deref() {
        if config.dialect.supports_grants() {
            run(exec, &format!("GRANT SELECT ON {} TO {}", loading, role))?;
        }
    }
    Ok(())
}

pub fn create_history_table<E: SqlExecutor + ?Sized>(
    exec: &mut E,
    table: &str,
    dialect: Dialect,
) -> Result<()> {
    run(exec, &create_history_table_sql(table, dialect))?;
    Ok(())
}
