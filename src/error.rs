//! Error taxonomy for the sweep run.
//!
//! Config and Auth are fatal to the whole run. Query and BatchEnvelope
//! abort the current (account, folder) pair only. Individual item failures
//! inside a batch response are never errors; they are absorbed into counts
//! and the log.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(#[from] hyper::Error),

    #[error("request build error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("query rejected with status {status}: {body}")]
    Query { status: u16, body: String },

    #[error("batch envelope error: {0}")]
    BatchEnvelope(String),

    #[error("malformed response payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(#[from] sqlx::Error),

    #[error("archive write refused for {account}: delete blocked by policy")]
    ArchiveRefused { account: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
