//! Error type for staging and merging.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// Reconstructed record text failed to parse. Indicates a bug in the
    /// record builder, never bad input: the token stream was already valid.
    #[error("malformed record in table {table}: {source}")]
    MalformedRecord {
        table: String,
        #[source]
        source: serde_json::Error,
    },

    /// The page did not have the shape of an array of record objects.
    #[error("unexpected {event} while {state} in table {table}")]
    UnexpectedEvent {
        table: String,
        event: &'static str,
        state: &'static str,
    },

    #[error("unable to read page count from {path}")]
    InvalidPageCount { path: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("key store error: {0}")]
    KeyStore(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
