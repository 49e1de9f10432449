//! The per-table unit of work
//!
//! Staging a table reads its pages twice. The analysis pass collects field
//! statistics and infers the loading table's columns; the load pass encodes
//! every record against that schema and bulk-inserts it. A run then merges
//! the loading table into history and promotes it to the live table.
//!
//! A failure at any point leaves the live table as it was: records only ever
//! go into the loading table, which is replaced wholesale by the next run.

use tracing::{debug, info, warn};

use crate::pages::PageSource;
use crate::schema::{infer_columns, DefaultClassifier, FieldStats, TypeClassifier};
use crate::stage::anonymize::{redact, Anonymizer, NoAnonymization};
use crate::stage::batch::InsertBatch;
use crate::stage::builder::{stage_page, RecordSink};
use crate::stage::encoder::TupleEncoder;
use crate::types::{Pass, StageConfig, StageWarning, TableSchema};
use crate::warehouse::keys::KeyStore;
use crate::warehouse::tables::create_loading_table;
use crate::warehouse::{create_catalog, merge_table, promote_table, record_table, SqlExecutor};
use crate::Result;

static NO_ANONYMIZATION: NoAnonymization = NoAnonymization;
static DEFAULT_CLASSIFIER: DefaultClassifier = DefaultClassifier;

/// What happened to one table
#[derive(Debug, Clone)]
pub struct StageReport {
    /// Schema the table was loaded with
    pub schema: TableSchema,
    /// Pages read per pass, including an extra page
    pub pages: usize,
    /// Records seen by the analysis pass
    pub records: usize,
    /// Rows sent to the loading table
    pub loaded: usize,
    /// Insert statements executed
    pub statements: usize,
    /// History rows appended by the merge
    pub appended: u64,
    pub warnings: Vec<StageWarning>,
}

/// Stages tables from one page source with shared collaborators
pub struct Stager<'a> {
    config: &'a StageConfig,
    pages: &'a dyn PageSource,
    keys: &'a dyn KeyStore,
    anonymizer: &'a dyn Anonymizer,
    classifier: &'a dyn TypeClassifier,
}

impl<'a> Stager<'a> {
    pub fn new(config: &'a StageConfig, pages: &'a dyn PageSource, keys: &'a dyn KeyStore) -> Self {
        Stager {
            config,
            pages,
            keys,
            anonymizer: &NO_ANONYMIZATION,
            classifier: &DEFAULT_CLASSIFIER,
        }
    }

    pub fn with_anonymizer(mut self, anonymizer: &'a dyn Anonymizer) -> Self {
        self.anonymizer = anonymizer;
        self
    }

    pub fn with_classifier(mut self, classifier: &'a dyn TypeClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Stage, merge and promote one table, then record it in the catalog
    pub fn run_table<E: SqlExecutor + ?Sized>(&self, exec: &mut E, table: TableSchema) -> Result<StageReport> {
        let dialect = self.config.dialect;
        let mut report = self.stage_table(exec, table)?;
        let name = report.schema.table_name.clone();

        report.appended = merge_table(exec, &name, dialect)?;
        promote_table(exec, &name, dialect)?;
        create_catalog(exec, dialect)?;
        record_table(exec, &name, dialect)?;
        Ok(report)
    }

    /// Run both passes for `table`, leaving the records in its loading table.
    /// Any columns already on `table` are replaced by the inferred ones.
    pub fn stage_table<E: SqlExecutor + ?Sized>(&self, exec: &mut E, mut table: TableSchema) -> Result<StageReport> {
        let name = table.table_name.clone();
        let page_count = self.pages.page_count(&name)?;
        info!(table = %name, pages = page_count, "staging");

        let mut stats = FieldStats::new();
        let (pages, records) = self.read_pages(&name, page_count, Pass::Analyze, &mut stats)?;
        stats.log_summary(&name);
        table.columns = infer_columns(&name, stats.into_fields(), self.classifier);

        create_loading_table(exec, &table, self.config)?;

        let mut loader = Loader {
            table: &name,
            anonymizer: self.anonymizer,
            encoder: TupleEncoder::new(&table, self.config, self.keys),
            batch: InsertBatch::new(&table, self.config.dialect, self.config.flush_threshold),
            exec: &mut *exec,
        };
        self.read_pages(&name, page_count, Pass::Load, &mut loader)?;
        loader.batch.flush(&mut *loader.exec)?;

        let loaded = loader.batch.rows();
        let statements = loader.batch.statements();
        let warnings = loader.encoder.take_warnings();

        info!(
            table = %name,
            records,
            loaded,
            statements,
            warnings = warnings.len(),
            "staged"
        );

        Ok(StageReport {
            schema: table,
            pages,
            records,
            loaded,
            statements,
            appended: 0,
            warnings,
        })
    }

    /// Feed every page of `table` to `sink`, returning pages and records read
    fn read_pages<S: RecordSink>(
        &self,
        table: &str,
        page_count: usize,
        pass: Pass,
        sink: &mut S,
    ) -> Result<(usize, usize)> {
        let mut pages = 0;
        let mut records = 0;

        for page in 0..page_count {
            let Some(reader) = self.pages.open_page(table, page)? else {
                warn!(table, page, pass = %pass, "page not found, stopping");
                break;
            };
            let read = stage_page(table, reader, sink)?;
            debug!(table, page, pass = %pass, records = read, "page read");
            pages += 1;
            records += read;
        }

        if let Some(reader) = self.pages.open_extra_page(table)? {
            let read = stage_page(table, reader, sink)?;
            debug!(table, pass = %pass, records = read, "extra page read");
            pages += 1;
            records += read;
        }

        Ok((pages, records))
    }
}

/// Load-pass sink: redact, encode, batch
struct Loader<'l, E: SqlExecutor + ?Sized> {
    table: &'l str,
    anonymizer: &'l dyn Anonymizer,
    encoder: TupleEncoder<'l>,
    batch: InsertBatch,
    exec: &'l mut E,
}

impl<E: SqlExecutor + ?Sized> RecordSink for Loader<'_, E> {
    fn record(&mut self, record: serde_json::Value) -> Result<()> {
        let record = redact(self.table, record, self.anonymizer);
        if let Some(tuple) = self.encoder.encode(&record)? {
            self.batch.push(tuple, &mut *self.exec)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::MemoryPageSource;
    use crate::stage::anonymize::FieldPaths;
    use crate::types::ColumnType;
    use crate::warehouse::{Dialect, MemoryKeyStore, SqliteExecutor};
    use crate::Error;
    use std::time::Duration;

    fn sqlite_config() -> StageConfig {
        StageConfig {
            dialect: Dialect::Sqlite,
            ..Default::default()
        }
    }

    fn query_i64(exec: &SqliteExecutor, sql: &str) -> i64 {
        exec.connection().query_row(sql, [], |row| row.get(0)).unwrap()
    }

    fn query_text(exec: &SqliteExecutor, sql: &str) -> String {
        exec.connection().query_row(sql, [], |row| row.get(0)).unwrap()
    }

    fn tick() {
        std::thread::sleep(Duration::from_millis(15));
    }

    #[test]
    fn test_same_id_on_later_page_makes_second_version() {
        let config = sqlite_config();
        let keys = MemoryKeyStore::new();
        let mut exec = SqliteExecutor::open_in_memory().unwrap();

        let first = MemoryPageSource::new().with_pages("items", [r#"[{"id":"a","x":1}]"#]);
        let report = Stager::new(&config, &first, &keys)
            .run_table(&mut exec, TableSchema::new("items"))
            .unwrap();
        assert_eq!(report.appended, 1);

        tick();
        let both = MemoryPageSource::new()
            .with_pages("items", [r#"[{"id":"a","x":1}]"#, r#"[{"id":"a","x":2}]"#]);
        let stager = Stager::new(&config, &both, &keys);
        let report = stager.run_table(&mut exec, TableSchema::new("items")).unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.appended, 1);

        assert_eq!(query_i64(&exec, "SELECT COUNT(*) FROM history_items WHERE id = 'a'"), 2);
        assert_eq!(
            query_i64(&exec, "SELECT COUNT(DISTINCT data) FROM history_items WHERE id = 'a'"),
            2
        );
        assert_eq!(query_i64(&exec, "SELECT COUNT(*) FROM items WHERE id = 'a'"), 1);
        assert_eq!(query_i64(&exec, "SELECT x FROM items WHERE id = 'a'"), 2);

        // Unchanged rerun adds nothing
        tick();
        let report = stager.run_table(&mut exec, TableSchema::new("items")).unwrap();
        assert_eq!(report.appended, 0);
        assert_eq!(query_i64(&exec, "SELECT COUNT(*) FROM history_items"), 2);

        // One catalog row, with the counts of the last run
        assert_eq!(query_i64(&exec, "SELECT COUNT(*) FROM kiln_tables"), 1);
        assert_eq!(query_i64(&exec, "SELECT row_count FROM kiln_tables WHERE table_name = 'items'"), 1);
        assert_eq!(
            query_i64(&exec, "SELECT history_row_count FROM kiln_tables WHERE table_name = 'items'"),
            2
        );
    }

    #[test]
    fn test_columns_are_inferred_and_loaded() {
        let config = sqlite_config();
        let keys = MemoryKeyStore::new();
        let mut exec = SqliteExecutor::open_in_memory().unwrap();

        let pages = MemoryPageSource::new().with_pages(
            "loans",
            [r#"[
                {"id": "l1", "userId": "550e8400-e29b-41d4-a716-446655440000", "dueDate": "2021-01-01T00:00:00Z", "renewals": 2, "fine": 1.5, "open": true, "meta": {"a": 1}},
                {"id": "l2", "userId": "550e8400-e29b-41d4-a716-446655440001", "dueDate": "2021-02-01T00:00:00.000+0000", "renewals": 0, "fine": 0, "open": false}
            ]"#],
        );

        let report = Stager::new(&config, &pages, &keys)
            .run_table(&mut exec, TableSchema::new("loans"))
            .unwrap();

        let types: Vec<(&str, ColumnType)> = report
            .schema
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.column_type))
            .collect();
        assert_eq!(
            types,
            vec![
                ("due_date", ColumnType::Timestamptz),
                ("fine", ColumnType::Numeric),
                ("open", ColumnType::Boolean),
                ("renewals", ColumnType::BigInt),
                ("user_id", ColumnType::Id),
            ]
        );

        assert_eq!(report.loaded, 2);
        assert_eq!(query_i64(&exec, "SELECT renewals FROM loans WHERE id = 'l1'"), 2);
        assert_eq!(query_i64(&exec, "SELECT user_id_sk FROM loans WHERE id = 'l2'"), 2);
        assert_eq!(
            query_text(&exec, "SELECT user_id FROM loans WHERE id = 'l1'"),
            "550e8400-e29b-41d4-a716-446655440000"
        );

        // The payload is the canonical record, nested members included
        let data = query_text(&exec, "SELECT data FROM loans WHERE id = 'l1'");
        let value: serde_json::Value = serde_json::from_str(&data).unwrap();
        assert_eq!(value["meta"]["a"], 1);
        assert!(data.starts_with("{\n  \"id\": \"l1\",\n  \"dueDate\""));
    }

    #[test]
    fn test_sensitive_fields_are_redacted() {
        let config = sqlite_config();
        let keys = MemoryKeyStore::new();
        let anonymize = FieldPaths::new().with_path("users", "/email");
        let mut exec = SqliteExecutor::open_in_memory().unwrap();

        let pages = MemoryPageSource::new()
            .with_pages("users", [r#"[{"id": "u1", "email": "a@example.com", "name": "Ann"}]"#]);
        Stager::new(&config, &pages, &keys)
            .with_anonymizer(&anonymize)
            .run_table(&mut exec, TableSchema::new("users"))
            .unwrap();

        assert_eq!(query_text(&exec, "SELECT email FROM users"), "");
        let data = query_text(&exec, "SELECT data FROM history_users");
        assert!(!data.contains("a@example.com"));
        assert!(data.contains("\"name\": \"Ann\""));
    }

    #[test]
    fn test_small_threshold_splits_inserts() {
        let config = StageConfig {
            flush_threshold: 1,
            ..sqlite_config()
        };
        let keys = MemoryKeyStore::new();
        let mut exec = SqliteExecutor::open_in_memory().unwrap();

        let pages = MemoryPageSource::new().with_pages(
            "items",
            [r#"[{"id": "a"}, {"id": "b"}]"#, r#"[{"id": "c"}]"#],
        );
        let report = Stager::new(&config, &pages, &keys)
            .stage_table(&mut exec, TableSchema::new("items"))
            .unwrap();

        assert_eq!(report.statements, 3);
        assert_eq!(report.loaded, 3);
        assert_eq!(query_i64(&exec, "SELECT COUNT(*) FROM items_loading"), 3);
    }

    #[test]
    fn test_records_without_id_are_reported() {
        let config = sqlite_config();
        let keys = MemoryKeyStore::new();
        let mut exec = SqliteExecutor::open_in_memory().unwrap();

        let pages = MemoryPageSource::new()
            .with_pages("items", [r#"[{"id": "a"}, {"name": "orphan"}]"#])
            .with_extra_page("items", r#"[{"id": "t"}]"#);
        let report = Stager::new(&config, &pages, &keys)
            .run_table(&mut exec, TableSchema::new("items"))
            .unwrap();

        assert_eq!(report.pages, 2);
        assert_eq!(report.records, 3);
        assert_eq!(report.loaded, 2);
        assert_eq!(
            report.warnings,
            vec![StageWarning::MissingId {
                table: "items".to_string()
            }]
        );
        assert_eq!(query_i64(&exec, "SELECT COUNT(*) FROM items"), 2);
    }

    #[test]
    fn test_failed_run_keeps_live_table() {
        let config = sqlite_config();
        let keys = MemoryKeyStore::new();
        let mut exec = SqliteExecutor::open_in_memory().unwrap();

        let good = MemoryPageSource::new().with_pages("items", [r#"[{"id": "a"}]"#]);
        Stager::new(&config, &good, &keys)
            .run_table(&mut exec, TableSchema::new("items"))
            .unwrap();

        let bad = MemoryPageSource::new().with_pages("items", [r#"[{"id": "a"}, {"id": "b"}, 5]"#]);
        let err = Stager::new(&config, &bad, &keys)
            .run_table(&mut exec, TableSchema::new("items"))
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedEvent { .. }));

        assert_eq!(query_i64(&exec, "SELECT COUNT(*) FROM items"), 1);
        assert_eq!(query_i64(&exec, "SELECT COUNT(*) FROM history_items"), 1);
        assert_eq!(query_i64(&exec, "SELECT row_count FROM kiln_tables WHERE table_name = 'items'"), 1);
    }

    #[test]
    fn test_table_without_pages() {
        let config = sqlite_config();
        let keys = MemoryKeyStore::new();
        let mut exec = SqliteExecutor::open_in_memory().unwrap();

        let pages = MemoryPageSource::new();
        let report = Stager::new(&config, &pages, &keys)
            .run_table(&mut exec, TableSchema::new("items"))
            .unwrap();

        assert_eq!(report.pages, 0);
        assert_eq!(report.appended, 0);
        assert!(report.schema.columns.is_empty());
        assert_eq!(query_i64(&exec, "SELECT COUNT(*) FROM items"), 0);
    }
}
