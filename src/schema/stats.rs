//! Field statistics for the analysis pass
//!
//! Like a streaming schema builder, the collector never keeps records around:
//! it folds each record into per-field counters and the column types are
//! derived from those counters once the pass is over.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::stage::builder::RecordSink;
use crate::types::Counts;
use crate::Result;

static DATE_TIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}(\.[0-9]{3}[+-][0-9]{4}|Z)$").unwrap()
});

static UUID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});

/// Matches timestamps such as `2020-05-01T12:00:00.000+0000` or `2020-05-01T12:00:00Z`
pub fn looks_like_date_time(s: &str) -> bool {
    // DateTime - check length and T separator before regex
    s.len() >= 20 && s.as_bytes()[10] == b'T' && DATE_TIME_REGEX.is_match(s)
}

pub fn looks_like_uuid(s: &str) -> bool {
    s.len() == 36 && UUID_REGEX.is_match(s)
}

/// Accumulates [`Counts`] for every top-level field of a table's records
#[derive(Debug, Default)]
pub struct FieldStats {
    fields: BTreeMap<String, Counts>,
    record_count: usize,
}

impl FieldStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record's direct scalar members into the counters.
    /// Nested objects and arrays carry no column and are not counted.
    pub fn add_record(&mut self, record: &Value) {
        self.record_count += 1;

        let Value::Object(members) = record else {
            return;
        };

        for (field, value) in members.iter() {
            if matches!(value, Value::Object(_) | Value::Array(_)) {
                continue;
            }
            let counts = self.fields.entry(field.clone()).or_default();
            add_scalar(counts, value);
        }
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn get(&self, field: &str) -> Option<&Counts> {
        self.fields.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn log_summary(&self, table: &str) {
        for (field, counts) in &self.fields {
            debug!(
                table,
                field = field.as_str(),
                total = counts.total,
                null = counts.null,
                boolean = counts.boolean,
                number = counts.number,
                integer = counts.integer,
                floating = counts.floating,
                string = counts.string,
                uuid = counts.uuid,
                date_time = counts.date_time,
                "field statistics"
            );
        }
    }

    /// Hand the counters over; they are consumed exactly once by inference
    pub fn into_fields(self) -> BTreeMap<String, Counts> {
        self.fields
    }
}

fn add_scalar(counts: &mut Counts, value: &Value) {
    counts.total += 1;
    match value {
        Value::Null => counts.null += 1,
        Value::Bool(_) => counts.boolean += 1,
        Value::Number(n) => {
            counts.number += 1;
            // Integers past i64::MAX cannot load into BIGINT
            if n.is_i64() {
                counts.integer += 1;
            } else {
                counts.floating += 1;
            }
        }
        Value::String(s) => {
            counts.string += 1;
            if looks_like_uuid(s) {
                counts.uuid += 1;
            }
            if looks_like_date_time(s) {
                counts.date_time += 1;
            }
        }
        Value::Array(_) | Value::Object(_) => {}
    }
}

impl RecordSink for FieldStats {
    fn record(&mut self, record: Value) -> Result<()> {
        self.add_record(&record);
        Ok(())
    }
}
