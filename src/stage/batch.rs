//! Bulk insert batching
//!
//! Encoded tuples accumulate into a single multi-row `INSERT` that is flushed
//! once it grows past the configured threshold, so neither statement size
//! nor memory depend on the number of records in a table.

use std::collections::HashSet;
use tracing::debug;

use crate::stage::encoder::Tuple;
use crate::types::TableSchema;
use crate::warehouse::tables::{loading_columns, loading_table_name};
use crate::warehouse::{Dialect, SqlExecutor};
use crate::Result;

/// One pending `INSERT ... VALUES` statement for a loading table
pub struct InsertBatch {
    header: String,
    footer: String,
    buffer: String,
    threshold: usize,
    pending: HashSet<i64>,
    statements: usize,
    rows: usize,
}

impl InsertBatch {
    pub fn new(schema: &TableSchema, dialect: Dialect, threshold: usize) -> Self {
        let columns = loading_columns(schema, dialect);
        InsertBatch {
            header: format!(
                "{} {} VALUES ",
                dialect.insert_into(),
                loading_table_name(&schema.table_name)
            ),
            footer: dialect.upsert_clause("sk", &columns).unwrap_or_default(),
            buffer: String::new(),
            threshold,
            pending: HashSet::new(),
            statements: 0,
            rows: 0,
        }
    }

    /// Add a tuple, first flushing the pending statement if it is already over
    /// the threshold or already holds a row with the same key
    pub fn push<E: SqlExecutor + ?Sized>(&mut self, tuple: Tuple, exec: &mut E) -> Result<()> {
        if self.buffer.len() > self.threshold || self.pending.contains(&tuple.sk) {
            self.flush(exec)?;
        }

        if self.pending.is_empty() {
            self.buffer.push_str(&self.header);
        } else {
            self.buffer.push(',');
        }
        self.buffer.push_str(&tuple.text);
        self.pending.insert(tuple.sk);
        Ok(())
    }

    /// Execute the pending statement, if any
    pub fn flush<E: SqlExecutor + ?Sized>(&mut self, exec: &mut E) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        self.buffer.push_str(&self.footer);
        debug!(rows = self.pending.len(), bytes = self.buffer.len(), "flushing insert");
        exec.execute(&self.buffer)?;

        self.statements += 1;
        self.rows += self.pending.len();
        self.buffer.clear();
        self.pending.clear();
        Ok(())
    }

    /// Rows buffered but not yet flushed
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Statements executed so far
    pub fn statements(&self) -> usize {
        self.statements
    }

    /// Rows sent to the database so far
    pub fn rows(&self) -> usize {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl SqlExecutor for Recorder {
        fn execute(&mut self, sql: &str) -> Result<u64> {
            self.0.push(sql.to_string());
            Ok(0)
        }
    }

    fn tuple(sk: i64, width: usize) -> Tuple {
        Tuple {
            sk,
            text: format!("({},'{}',NULL,1)", sk, "x".repeat(width)),
        }
    }

    #[test]
    fn test_single_statement_below_threshold() {
        let mut exec = Recorder::default();
        let mut batch = InsertBatch::new(&TableSchema::new("items"), Dialect::Redshift, 1000);

        batch.push(tuple(1, 1), &mut exec).unwrap();
        batch.push(tuple(2, 1), &mut exec).unwrap();
        assert!(exec.0.is_empty());
        assert_eq!(batch.pending(), 2);

        batch.flush(&mut exec).unwrap();
        assert_eq!(exec.0, vec!["INSERT INTO items_loading VALUES (1,'x',NULL,1),(2,'x',NULL,1)"]);
        assert_eq!(batch.rows(), 2);

        // Nothing left to flush
        batch.flush(&mut exec).unwrap();
        assert_eq!(batch.statements(), 1);
    }

    #[test]
    fn test_sqlite_replaces_on_insert() {
        let mut exec = Recorder::default();
        let mut batch = InsertBatch::new(&TableSchema::new("items"), Dialect::Sqlite, 1000);
        batch.push(tuple(1, 1), &mut exec).unwrap();
        batch.flush(&mut exec).unwrap();
        assert_eq!(exec.0, vec!["INSERT OR REPLACE INTO items_loading VALUES (1,'x',NULL,1)"]);
    }

    #[test]
    fn test_flushes_past_threshold() {
        let mut exec = Recorder::default();
        let threshold = 10_000;
        let mut batch = InsertBatch::new(&TableSchema::new("items"), Dialect::Redshift, threshold);

        let count = 100;
        for sk in 1..=count {
            batch.push(tuple(sk, 990), &mut exec).unwrap();
        }
        batch.flush(&mut exec).unwrap();

        assert!(exec.0.len() > 1);
        let tuple_len = tuple(100, 990).text.len();
        for statement in &exec.0 {
            assert!(statement.len() <= threshold + tuple_len + 1);
        }

        // Every key lands in exactly one statement
        let mut seen = Vec::new();
        for statement in &exec.0 {
            for sk in 1..=count {
                if statement.contains(&format!("({},'", sk)) {
                    seen.push(sk);
                }
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=count).collect::<Vec<_>>());
        assert_eq!(batch.rows(), count as usize);
    }

    #[test]
    fn test_repeated_key_starts_new_statement() {
        let mut exec = Recorder::default();
        let mut batch = InsertBatch::new(&TableSchema::new("items"), Dialect::Postgres, 1000);

        batch.push(tuple(1, 1), &mut exec).unwrap();
        batch.push(tuple(2, 1), &mut exec).unwrap();
        batch.push(tuple(1, 2), &mut exec).unwrap();
        batch.flush(&mut exec).unwrap();

        assert_eq!(exec.0.len(), 2);
        assert_eq!(batch.rows(), 3);
        assert!(exec.0[0].ends_with(
            " ON CONFLICT (sk) DO UPDATE SET id = excluded.id, data = excluded.data, tenant_id = excluded.tenant_id"
        ));
        assert!(exec.0[1].starts_with("INSERT INTO items_loading VALUES (1,'xx',NULL,1)"));
    }
}
