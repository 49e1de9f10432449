//! Streaming record reconstruction
//!
//! A page is one JSON array of record objects. [`RecordBuilder`] follows the
//! token stream with a small state machine, copies the tokens of the current
//! record into a text buffer, and hands each finished record to a
//! [`RecordSink`] as a canonicalized tree. Only one record is held at a time.

use serde_json::Value;
use std::io::{Read, Write};

use crate::canonical::canonicalize;
use crate::stage::reader::{read_events, Event, EventHandler};
use crate::{Error, Result};

/// Consumer of finished, canonicalized records
pub trait RecordSink {
    fn record(&mut self, record: Value) -> Result<()>;
}

/// Where the builder is within a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    /// Before the top-level array
    OutsideArray,
    /// Inside the top-level array, between two records
    BetweenRecords,
    /// Inside a record; depth 1 is the record object itself
    InRecord { depth: usize },
    /// The top-level array has been closed
    Finished,
}

/// What the builder does with the event that caused a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Skip,
    /// Start a new record buffer
    Open,
    /// Copy the token into the record buffer
    Append,
    /// Close the record buffer and emit the record
    Close,
}

impl BuilderState {
    /// The state that follows `event`, or `None` if the event is not legal here
    pub fn transition(self, event: &Event<'_>) -> Option<(BuilderState, Action)> {
        use BuilderState::*;

        match (self, event) {
            (OutsideArray, Event::StartArray) => Some((BetweenRecords, Action::Skip)),
            (BetweenRecords, Event::StartObject) => Some((InRecord { depth: 1 }, Action::Open)),
            (BetweenRecords, Event::EndArray) => Some((Finished, Action::Skip)),
            (InRecord { depth: 1 }, Event::EndObject) => Some((BetweenRecords, Action::Close)),
            (InRecord { depth: 1 }, Event::EndArray) => None,
            (InRecord { depth }, Event::StartObject | Event::StartArray) => {
                Some((InRecord { depth: depth + 1 }, Action::Append))
            }
            (InRecord { depth }, Event::EndObject | Event::EndArray) => {
                Some((InRecord { depth: depth - 1 }, Action::Append))
            }
            (InRecord { depth }, _) => Some((InRecord { depth }, Action::Append)),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuilderState::OutsideArray => "outside the record array",
            BuilderState::BetweenRecords => "between records",
            BuilderState::InRecord { .. } => "inside a record",
            BuilderState::Finished => "after the record array",
        }
    }
}

/// Rebuilds records from page events and passes them to a sink
pub struct RecordBuilder<'s, S: RecordSink> {
    table: String,
    state: BuilderState,
    buffer: Vec<u8>,
    sink: &'s mut S,
    record_count: usize,
}

impl<'s, S: RecordSink> RecordBuilder<'s, S> {
    pub fn new(table: impl Into<String>, sink: &'s mut S) -> Self {
        RecordBuilder {
            table: table.into(),
            state: BuilderState::OutsideArray,
            buffer: Vec::new(),
            sink,
            record_count: 0,
        }
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    fn append(&mut self, event: &Event<'_>) -> Result<()> {
        if !matches!(event, Event::EndObject | Event::EndArray) {
            self.separate();
        }

        match *event {
            Event::StartObject => self.buffer.push(b'{'),
            Event::EndObject => self.buffer.push(b'}'),
            Event::StartArray => self.buffer.push(b'['),
            Event::EndArray => self.buffer.push(b']'),
            Event::Key(key) => {
                serde_json::to_writer(&mut self.buffer, key)?;
                self.buffer.push(b':');
            }
            Event::String(s) => serde_json::to_writer(&mut self.buffer, s)?,
            Event::Integer(i) => write!(self.buffer, "{}", i)?,
            Event::Unsigned(u) => write!(self.buffer, "{}", u)?,
            // serde_json keeps the fraction ("1.0"), so floats stay floats
            Event::Float(f) => serde_json::to_writer(&mut self.buffer, &f)?,
            Event::Bool(b) => self.buffer.extend_from_slice(if b { b"true" } else { b"false" }),
            Event::Null => self.buffer.extend_from_slice(b"null"),
        }
        Ok(())
    }

    /// Write a comma unless the buffer just opened a container or a member
    fn separate(&mut self) {
        match self.buffer.last() {
            None | Some(b'{') | Some(b'[') | Some(b':') => {}
            Some(_) => self.buffer.push(b','),
        }
    }

    fn complete(&mut self) -> Result<()> {
        let mut record: Value =
            serde_json::from_slice(&self.buffer).map_err(|source| Error::MalformedRecord {
                table: self.table.clone(),
                source,
            })?;
        self.buffer.clear();

        canonicalize(&mut record);
        self.record_count += 1;
        self.sink.record(record)
    }
}

impl<S: RecordSink> EventHandler for RecordBuilder<'_, S> {
    fn event(&mut self, event: Event<'_>) -> Result<()> {
        let (next, action) =
            self.state
                .transition(&event)
                .ok_or_else(|| Error::UnexpectedEvent {
                    table: self.table.clone(),
                    event: event.name(),
                    state: self.state.name(),
                })?;

        match action {
            Action::Skip => {}
            Action::Open => {
                self.buffer.clear();
                self.buffer.push(b'{');
            }
            Action::Append => self.append(&event)?,
            Action::Close => {
                self.buffer.push(b'}');
                self.complete()?;
            }
        }

        self.state = next;
        Ok(())
    }
}

/// Stream one page into `sink`, returning the number of records read
pub fn stage_page<R: Read, S: RecordSink>(table: &str, page: R, sink: &mut S) -> Result<usize> {
    let mut builder = RecordBuilder::new(table, sink);
    read_events(page, &mut builder)?;
    Ok(builder.record_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Collect(Vec<Value>);

    impl RecordSink for Collect {
        fn record(&mut self, record: Value) -> Result<()> {
            self.0.push(record);
            Ok(())
        }
    }

    #[test]
    fn test_transitions() {
        use BuilderState::*;

        assert_eq!(
            OutsideArray.transition(&Event::StartArray),
            Some((BetweenRecords, Action::Skip))
        );
        assert_eq!(
            BetweenRecords.transition(&Event::StartObject),
            Some((InRecord { depth: 1 }, Action::Open))
        );
        assert_eq!(
            InRecord { depth: 1 }.transition(&Event::StartArray),
            Some((InRecord { depth: 2 }, Action::Append))
        );
        assert_eq!(
            InRecord { depth: 2 }.transition(&Event::EndArray),
            Some((InRecord { depth: 1 }, Action::Append))
        );
        assert_eq!(
            InRecord { depth: 1 }.transition(&Event::Key("a")),
            Some((InRecord { depth: 1 }, Action::Append))
        );
        assert_eq!(
            InRecord { depth: 1 }.transition(&Event::EndObject),
            Some((BetweenRecords, Action::Close))
        );
        assert_eq!(
            BetweenRecords.transition(&Event::EndArray),
            Some((Finished, Action::Skip))
        );
    }

    #[test]
    fn test_illegal_transitions() {
        use BuilderState::*;

        assert_eq!(OutsideArray.transition(&Event::StartObject), None);
        assert_eq!(OutsideArray.transition(&Event::Null), None);
        assert_eq!(BetweenRecords.transition(&Event::String("x")), None);
        assert_eq!(BetweenRecords.transition(&Event::StartArray), None);
        assert_eq!(InRecord { depth: 1 }.transition(&Event::EndArray), None);
        assert_eq!(Finished.transition(&Event::StartArray), None);
    }

    #[test]
    fn test_records_are_rebuilt_and_canonicalized() {
        let page = r#"[
            {"name": "Alice", "id": "a", "tags": ["x", "y"], "meta": {"z": 1, "b": [{"k": null}]}},
            {"id": "b", "score": 1.0, "n": -3, "ok": false, "note": "line\nbreak \"quoted\" \\ \u0001"}
        ]"#;

        let mut sink = Collect::default();
        let count = stage_page("users", page.as_bytes(), &mut sink).unwrap();
        assert_eq!(count, 2);

        assert_eq!(
            sink.0[0],
            json!({"id": "a", "meta": {"b": [{"k": null}], "z": 1}, "name": "Alice", "tags": ["x", "y"]})
        );
        assert_eq!(
            serde_json::to_string(&sink.0[0]).unwrap(),
            r#"{"id":"a","meta":{"b":[{"k":null}],"z":1},"name":"Alice","tags":["x","y"]}"#
        );

        let second = &sink.0[1];
        assert_eq!(second["note"], "line\nbreak \"quoted\" \\ \u{1}");
        assert!(second["score"].is_f64());
        assert_eq!(second["n"], -3);
        assert_eq!(second["ok"], false);
    }

    #[test]
    fn test_empty_containers() {
        let page = r#"[{"id": "e", "a": [], "o": {}, "aa": [[], [{}]]}]"#;
        let mut sink = Collect::default();
        stage_page("t", page.as_bytes(), &mut sink).unwrap();
        assert_eq!(sink.0[0], json!({"id": "e", "a": [], "aa": [[], [{}]], "o": {}}));
    }

    #[test]
    fn test_empty_page() {
        let mut sink = Collect::default();
        assert_eq!(stage_page("t", "[]".as_bytes(), &mut sink).unwrap(), 0);
        assert!(sink.0.is_empty());
    }

    #[test]
    fn test_page_must_be_an_array() {
        let mut sink = Collect::default();
        let err = stage_page("t", r#"{"id": "a"}"#.as_bytes(), &mut sink).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEvent { state: "outside the record array", .. }));
    }

    #[test]
    fn test_records_must_be_objects() {
        let mut sink = Collect::default();
        let err = stage_page("t", r#"[{"id": "a"}, 5]"#.as_bytes(), &mut sink).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEvent { event: "number", .. }));
        // The record before the bad element was already delivered
        assert_eq!(sink.0.len(), 1);
    }
}
