//! Error taxonomy for a single transfer attempt.
//!
//! Every variant here is attempt-fatal: the orchestrator records it into the
//! attempt's `TransferResult` and the session moves on to the next pair.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::ByteRange;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("could not resolve an asset endpoint for provider {provider}")]
    EndpointUnresolved { provider: String },

    #[error("content metadata not found for content id {0}")]
    MetadataNotFound(String),

    #[error("received an empty response from asset endpoint {0}")]
    EmptyResponse(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("stream failed after {consumed} bytes: {reason}")]
    StreamError { consumed: u64, reason: String },

    #[error("fingerprint mismatch for range {range}: expected {}, got {actual}", .range.fingerprint)]
    RangeIntegrity { range: ByteRange, actual: String },

    #[error("range {range} ended early: received {received} of {} bytes", .range.len())]
    IncompleteRange { range: ByteRange, received: u64 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("cannot upload {}: {reason}", .path.display())]
    FileRejected { path: PathBuf, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// Transport-level failure (connect, timeout, non-2xx status) from reqwest.
    pub fn request(err: reqwest::Error) -> Self {
        TransferError::RequestFailed(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("no range ledger for content id {content_id} at {}", .path.display())]
    NotFound { content_id: String, path: PathBuf },

    #[error("range ledger i/o on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt range ledger {} at line {line}: {reason}", .path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Failure from the stream consumer, carrying the bytes drained before it
/// stopped so callers can keep partial-result accounting.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct ConsumeError {
    pub consumed: u64,
    #[source]
    pub source: TransferError,
}
