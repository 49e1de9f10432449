//! SQL-facing side of staging: dialects, key mapping, DDL, the merge and the catalog
//!
//! Statements are plain strings handed to a [`SqlExecutor`]. The crate ships
//! a SQLite executor for direct loading and [`ScriptWriter`] for producing a
//! script to run against PostgreSQL or Redshift with their own clients.

pub mod catalog;
pub mod dialect;
pub mod keys;
pub mod merge;
pub mod sqlite;
pub mod tables;

pub use catalog::{create_catalog, record_table};
pub use dialect::Dialect;
pub use keys::{KeyStore, MemoryKeyStore, GLOBAL_NAMESPACE};
pub use merge::{merge_table, promote_table};
pub use sqlite::{SqliteExecutor, SqliteKeyStore};
pub use tables::{history_table_name, latest_table_name, loading_table_name};

use std::io::Write;
use tracing::debug;

use crate::Result;

const PREVIEW_LEN: usize = 200;

/// Runs complete SQL statements
pub trait SqlExecutor {
    /// Execute one statement, returning the number of rows it changed when
    /// the executor can tell, otherwise 0
    fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Run `statements` in one transaction, rolling back on the first failure
    fn transaction(&mut self, statements: &[String]) -> Result<()> {
        self.execute("BEGIN")?;
        for sql in statements {
            if let Err(err) = self.execute(sql) {
                // The statement error is the one worth reporting
                let _ = self.execute("ROLLBACK");
                return Err(err);
            }
        }
        self.execute("COMMIT")?;
        Ok(())
    }
}

impl<E: SqlExecutor + ?Sized> SqlExecutor for &mut E {
    fn execute(&mut self, sql: &str) -> Result<u64> {
        (**self).execute(sql)
    }

    fn transaction(&mut self, statements: &[String]) -> Result<()> {
        (**self).transaction(statements)
    }
}

/// Executes `sql`, logging it first
pub(crate) fn run<E: SqlExecutor + ?Sized>(exec: &mut E, sql: &str) -> Result<u64> {
    debug!(sql = %preview(sql), "executing");
    exec.execute(sql)
}

/// First part of a statement, for logs
pub fn preview(sql: &str) -> &str {
    match sql.char_indices().nth(PREVIEW_LEN) {
        Some((end, _)) => &sql[..end],
        None => sql,
    }
}

/// Writes statements to a script instead of running them
pub struct ScriptWriter<W: Write> {
    out: W,
    statements: usize,
}

impl<W: Write> ScriptWriter<W> {
    pub fn new(out: W) -> Self {
        ScriptWriter { out, statements: 0 }
    }

    /// Number of statements written so far
    pub fn statements(&self) -> usize {
        self.statements
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SqlExecutor for ScriptWriter<W> {
    fn execute(&mut self, sql: &str) -> Result<u64> {
        writeln!(self.out, "{};", sql)?;
        self.statements += 1;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct FailOn(&'static str, Vec<String>);

    impl SqlExecutor for FailOn {
        fn execute(&mut self, sql: &str) -> Result<u64> {
            self.1.push(sql.to_string());
            if sql == self.0 {
                return Err(Error::Config("boom".to_string()));
            }
            Ok(0)
        }
    }

    #[test]
    fn test_transaction_commits() {
        let mut exec = FailOn("never", Vec::new());
        exec.transaction(&["A".to_string(), "B".to_string()]).unwrap();
        assert_eq!(exec.1, vec!["BEGIN", "A", "B", "COMMIT"]);
    }

    #[test]
    fn test_transaction_rolls_back() {
        let mut exec = FailOn("A", Vec::new());
        let err = exec
            .transaction(&["A".to_string(), "B".to_string()])
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(exec.1, vec!["BEGIN", "A", "ROLLBACK"]);
    }

    #[test]
    fn test_script_writer() {
        let mut script = ScriptWriter::new(Vec::new());
        script.execute("DROP TABLE IF EXISTS t").unwrap();
        script.execute("CREATE TABLE t (a BIGINT)").unwrap();
        assert_eq!(script.statements(), 2);

        let text = String::from_utf8(script.into_inner()).unwrap();
        assert_eq!(text, "DROP TABLE IF EXISTS t;\nCREATE TABLE t (a BIGINT);\n");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        assert_eq!(preview(&long).chars().count(), 200);
        assert_eq!(preview("SELECT 1"), "SELECT 1");
    }
}
