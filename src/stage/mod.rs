//! Reading pages and turning their records into loading-table rows

pub mod anonymize;
pub mod batch;
pub mod builder;
pub mod encoder;
pub mod reader;

pub use anonymize::{redact, Anonymizer, FieldPaths, NoAnonymization};
pub use batch::InsertBatch;
pub use builder::{stage_page, BuilderState, RecordBuilder, RecordSink};
pub use encoder::{Tuple, TupleEncoder};
pub use reader::{read_events, Event, EventHandler};
