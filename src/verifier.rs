//! Replay of recorded ranges: collect the bytes returned for one ranged
//! request and compare their fingerprint with the one in the ledger.

use tracing::{debug, warn};

use crate::error::TransferError;
use crate::hashing::fingerprint;
use crate::model::ByteRange;
use crate::stream::ChunkHandler;

/// Upper bound on the buffer reserved up front; longer ranges grow as bytes arrive.
const MAX_PREALLOCATE: usize = 1024 * 1024;

#[derive(Debug, Default)]
pub struct RangeVerifier {
    current: Option<ByteRange>,
    buffer: Vec<u8>,
    checked: bool,
    matched: usize,
}

impl RangeVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the accumulation buffer for the next ranged request.
    pub fn begin(&mut self, range: ByteRange) {
        let capacity = usize::try_from(range.len()).map_or(MAX_PREALLOCATE, |len| len.min(MAX_PREALLOCATE));
        self.buffer = Vec::with_capacity(capacity);
        self.current = Some(range);
        self.checked = false;
    }

    pub fn matched(&self) -> usize {
        self.matched
    }

    fn check(&mut self, range: &ByteRange) -> Result<(), TransferError> {
        let expected_len = range.len() as usize;
        let actual = fingerprint(&self.buffer[..expected_len]);
        self.checked = true;
        self.buffer = Vec::new();
        if actual == range.fingerprint {
            self.matched += 1;
            debug!(range = %range, fingerprint = %actual, "range fingerprint matched");
            Ok(())
        } else {
            Err(TransferError::RangeIntegrity {
                range: range.clone(),
                actual,
            })
        }
    }
}

impl ChunkHandler for RangeVerifier {
    fn on_chunk(&mut self, _offset: u64, chunk: &[u8]) -> Result<(), TransferError> {
        if self.checked {
            return Ok(());
        }
        let Some(range) = self.current.clone() else {
            return Ok(());
        };
        let expected_len = range.len() as usize;
        // Bytes beyond the expected length are never part of the fingerprint.
        let take = chunk.len().min(expected_len - self.buffer.len());
        self.buffer.extend_from_slice(&chunk[..take]);
        if self.buffer.len() >= expected_len {
            if take < chunk.len() {
                warn!(range = %range, "server returned more bytes than requested");
            }
            self.check(&range)?;
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.checked
    }

    fn on_finish(&mut self, _total: u64) -> Result<(), TransferError> {
        match &self.current {
            Some(range) if !self.checked => Err(TransferError::IncompleteRange {
                range: range.clone(),
                received: self.buffer.len() as u64,
            }),
            _ => Ok(()),
        }
    }
}
