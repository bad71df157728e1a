//! Random range sampling during a full download.
//!
//! For every chunk of `n` bytes, a slice of `n / 2` bytes starting at a random
//! offset in `[0, n / 2)` is fingerprinted. The slice always lies inside the
//! chunk, so nothing has to be buffered across chunks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::TransferError;
use crate::hashing::fingerprint;
use crate::model::ByteRange;
use crate::stream::ChunkHandler;

pub struct RandomRangeSampler<R: Rng = StdRng> {
    rng: R,
    ranges: Vec<ByteRange>,
}

impl RandomRangeSampler<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl Default for RandomRangeSampler<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> RandomRangeSampler<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            ranges: Vec::new(),
        }
    }

    /// Ranges recorded so far, in arrival order.
    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    pub fn into_ranges(self) -> Vec<ByteRange> {
        self.ranges
    }
}

impl<R: Rng> ChunkHandler for RandomRangeSampler<R> {
    fn on_chunk(&mut self, offset: u64, chunk: &[u8]) -> Result<(), TransferError> {
        let half = chunk.len() / 2;
        // A 0- or 1-byte chunk has no non-empty half to sample.
        if half == 0 {
            return Ok(());
        }
        let start = self.rng.gen_range(0..half);
        let slice = &chunk[start..start + half];
        let global_start = offset + start as u64;
        self.ranges.push(ByteRange::new(
            global_start,
            global_start + half as u64,
            fingerprint(slice),
        ));
        Ok(())
    }
}
