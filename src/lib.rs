//! # Kiln - JSON snapshot staging with temporal history
//!
//! Loads periodic snapshots of JSON record collections into a relational
//! warehouse and keeps an append-only history of every record version.
//!
//! ## Modules
//!
//! - **stage**: stream pages into canonical records, redact them, and encode
//!   them as bulk inserts
//! - **schema**: collect field statistics and infer column types
//! - **warehouse**: SQL dialects, surrogate keys, DDL, history merge, catalog
//! - **pipeline**: the two-pass unit of work for one table
//!
//! ## Quick Start
//!
//! ```rust
//! use kiln::pages::MemoryPageSource;
//! use kiln::warehouse::{Dialect, MemoryKeyStore, SqliteExecutor};
//! use kiln::{Stager, StageConfig, TableSchema};
//!
//! # fn main() -> kiln::Result<()> {
//! let pages = MemoryPageSource::new()
//!     .with_pages("items", [r#"[{"id": "a", "barcode": "1001"}]"#]);
//! let config = StageConfig {
//!     dialect: Dialect::Sqlite,
//!     ..Default::default()
//! };
//! let keys = MemoryKeyStore::new();
//! let mut db = SqliteExecutor::open_in_memory()?;
//!
//! let report = Stager::new(&config, &pages, &keys).run_table(&mut db, TableSchema::new("items"))?;
//!
//! // items now holds one row; history_items holds its first version
//! assert_eq!(report.loaded, 1);
//! assert_eq!(report.appended, 1);
//! # Ok(())
//! # }
//! ```

pub mod canonical;
pub mod config;
pub mod error;
pub mod pages;
pub mod pipeline;
pub mod schema;
pub mod stage;
pub mod types;
pub mod warehouse;

// Re-export commonly used types for convenience
pub use canonical::{canonical_text, canonicalize};
pub use config::{KilnConfig, TableEntry};
pub use error::{Error, Result};
pub use pages::{DirPageSource, PageSource};
pub use pipeline::{StageReport, Stager};
pub use types::{ColumnSchema, ColumnType, Counts, StageConfig, StageWarning, TableSchema};
pub use warehouse::{Dialect, KeyStore, SqlExecutor};
