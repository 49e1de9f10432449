//! kiln-stage: Stage JSON page dumps into warehouse tables with history
//!
//! Usage:
//!   # Load every table listed in the config into a SQLite database
//!   kiln-stage --config kiln.toml --data-dir ./pages --db warehouse.db
//!
//!   # Stage two tables in parallel
//!   kiln-stage --data-dir ./pages --db warehouse.db --table items --table users --jobs 2
//!
//!   # Write PostgreSQL scripts (one per table) instead of executing
//!   kiln-stage --data-dir ./pages --emit-sql ./sql --dialect postgres --keys keys.db --table items

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use kiln::warehouse::{MemoryKeyStore, ScriptWriter, SqliteExecutor, SqliteKeyStore};
use kiln::{Dialect, DirPageSource, KeyStore, KilnConfig, StageReport, Stager, TableEntry};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kiln-stage")]
#[command(about = "Stage JSON page dumps into warehouse tables with history", long_about = None)]
struct Args {
    /// Directory holding <table>_count.txt and <table>_<n>.json pages
    #[arg(long, value_name = "DIR")]
    data_dir: PathBuf,

    /// TOML configuration file
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database to load into
    #[arg(long, value_name = "FILE", conflicts_with = "emit_sql")]
    db: Option<PathBuf>,

    /// Write one SQL script per table into this directory instead of executing
    #[arg(long, value_name = "DIR")]
    emit_sql: Option<PathBuf>,

    /// SQLite file holding surrogate keys (default: the --db file)
    #[arg(long, value_name = "FILE")]
    keys: Option<PathBuf>,

    /// Table to stage; repeat for several (default: all tables in the config)
    #[arg(long = "table", short = 't', value_name = "NAME")]
    tables: Vec<String>,

    /// Number of tables staged at once
    #[arg(long, short = 'j', default_value_t = 1)]
    jobs: usize,

    /// SQL dialect for --emit-sql: postgres, redshift or sqlite
    #[arg(long)]
    dialect: Option<Dialect>,

    /// Tenant written to every row
    #[arg(long)]
    tenant_id: Option<i16>,
}

/// Where staged tables go
enum Target {
    Sqlite(PathBuf),
    Script(PathBuf),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => KilnConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => KilnConfig::default(),
    };
    if let Some(dialect) = args.dialect {
        config.stage.dialect = dialect;
    }
    if let Some(tenant_id) = args.tenant_id {
        config.stage.tenant_id = tenant_id;
    }

    let target = match (&args.db, &args.emit_sql) {
        (Some(db), None) => {
            if config.stage.dialect != Dialect::Sqlite {
                info!(dialect = %config.stage.dialect, "--db loads SQLite, using the sqlite dialect");
                config.stage.dialect = Dialect::Sqlite;
            }
            Target::Sqlite(db.clone())
        }
        (None, Some(dir)) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            Target::Script(dir.clone())
        }
        _ => bail!("one of --db or --emit-sql is required"),
    };

    let tables: Vec<TableEntry> = if args.tables.is_empty() {
        config.tables.clone()
    } else {
        args.tables.iter().map(|name| config.table(name)).collect()
    };
    if tables.is_empty() {
        bail!("no tables to stage: pass --table or list [[tables]] in the config");
    }

    let keys: Box<dyn KeyStore> = match (&args.keys, &target) {
        (Some(path), _) | (None, Target::Sqlite(path)) => Box::new(
            SqliteKeyStore::open(path)
                .with_context(|| format!("Failed to open key store: {}", path.display()))?,
        ),
        (None, Target::Script(_)) => {
            warn!("no --keys file given, surrogate keys will not outlive this run");
            Box::new(MemoryKeyStore::new())
        }
    };

    let pages = DirPageSource::new(&args.data_dir);
    let stager = Stager::new(&config.stage, &pages, &*keys).with_anonymizer(&config.anonymize);

    let results = stage_all(&stager, &target, &tables, args.jobs)?;

    let mut failed = 0;
    for (table, result) in &results {
        match result {
            Ok(report) => println!(
                "✓ {}: {} records, {} rows loaded, {} new versions, {} warnings",
                table,
                report.records,
                report.loaded,
                report.appended,
                report.warnings.len()
            ),
            Err(err) => {
                failed += 1;
                println!("✗ {}: {:#}", table, err);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} tables failed", failed, results.len());
    }
    Ok(())
}

/// Stage `tables` on up to `jobs` worker threads, keeping going past failures
fn stage_all(
    stager: &Stager<'_>,
    target: &Target,
    tables: &[TableEntry],
    jobs: usize,
) -> Result<Vec<(String, Result<StageReport>)>> {
    let next = AtomicUsize::new(0);
    let results = Mutex::new(Vec::with_capacity(tables.len()));
    let workers = jobs.clamp(1, tables.len().max(1));

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let Some(entry) = tables.get(next.fetch_add(1, Ordering::Relaxed)) else {
                    break;
                };

                let result = stage_one(stager, target, entry);
                if let Err(err) = &result {
                    error!(table = %entry.name, "{:#}", err);
                }
                if let Ok(mut results) = results.lock() {
                    results.push((entry.name.clone(), result));
                }
            });
        }
    });

    let mut results = results
        .into_inner()
        .map_err(|_| anyhow!("a worker panicked while recording results"))?;
    results.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(results)
}

fn stage_one(stager: &Stager<'_>, target: &Target, entry: &TableEntry) -> Result<StageReport> {
    match target {
        Target::Sqlite(db) => {
            let mut exec = SqliteExecutor::open(db)
                .with_context(|| format!("Failed to open database: {}", db.display()))?;
            Ok(stager.run_table(&mut exec, entry.schema())?)
        }
        Target::Script(dir) => {
            let path = dir.join(format!("{}.sql", entry.name));
            let file = File::create(&path)
                .with_context(|| format!("Failed to create script: {}", path.display()))?;

            let mut script = ScriptWriter::new(BufWriter::new(file));
            let report = stager.run_table(&mut script, entry.schema())?;
            info!(table = %entry.name, statements = script.statements(), path = %path.display(), "script written");
            script
                .into_inner()
                .flush()
                .with_context(|| format!("Failed to write script: {}", path.display()))?;
            Ok(report)
        }
    }
}
