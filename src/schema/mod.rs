//! Relational schema inference
//!
//! The analysis pass feeds every record into [`FieldStats`]; once the pass is
//! over, [`infer_columns`] turns the counters into the loading table's columns.

pub mod inference;
pub mod stats;

pub use inference::{column_name, infer_columns, DefaultClassifier, TypeClassifier, FIXED_COLUMNS};
pub use stats::{looks_like_date_time, looks_like_uuid, FieldStats};
