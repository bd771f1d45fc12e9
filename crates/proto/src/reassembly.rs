//! Receiver side of the chunked transfer: writes each chunk at its
//! sequence offset and tracks completion with a counter (strict in-order)
//! or a bitmask (order-free).

use log::{debug, info};
use serde::{Deserialize, Serialize};

use motelink_core::{SampleBuffer, SamplePair};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChunkTracking {
    /// Sequential index advance; a future chunk is rejected until its
    /// predecessors have arrived.
    #[default]
    InOrder,
    /// Any-order arrival; complete once every bit is set.
    Bitmask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// New chunk stored.
    Stored,
    /// Already held; worth re-acking since the previous ack may have been
    /// lost.
    Duplicate,
    /// Out of range, wrong size, or ahead of the in-order cursor; not
    /// acked.
    Rejected,
    /// This chunk filled the buffer.
    Completed,
}

pub struct Reassembly {
    pairs: Vec<SamplePair>,
    chunk_size: usize,
    total_chunks: usize,
    tracking: ChunkTracking,
    next_expected: usize,
    received_mask: u64,
    complete: bool,
}

impl Reassembly {
    pub fn new(samples: usize, chunk_size: usize, tracking: ChunkTracking) -> Self {
        Self {
            pairs: vec![SamplePair::default(); samples],
            chunk_size,
            total_chunks: samples / chunk_size,
            tracking,
            next_expected: 0,
            received_mask: 0,
            complete: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn chunks_received(&self) -> usize {
        match self.tracking {
            ChunkTracking::InOrder => self.next_expected,
            ChunkTracking::Bitmask => self.received_mask.count_ones() as usize,
        }
    }

    pub fn on_chunk(&mut self, seq: u8, payload: &[SamplePair]) -> ChunkOutcome {
        let seq = seq as usize;
        if self.complete || seq >= self.total_chunks || payload.len() != self.chunk_size {
            return ChunkOutcome::Rejected;
        }

        match self.tracking {
            ChunkTracking::InOrder => {
                if seq < self.next_expected {
                    return ChunkOutcome::Duplicate;
                }
                if seq > self.next_expected {
                    debug!("chunk {} ahead of cursor {}, rejected", seq, self.next_expected);
                    return ChunkOutcome::Rejected;
                }
                self.store(seq, payload);
                self.next_expected += 1;
                if self.next_expected == self.total_chunks {
                    self.complete = true;
                    info!("all {} chunks received in order", self.total_chunks);
                    return ChunkOutcome::Completed;
                }
            }
            ChunkTracking::Bitmask => {
                let bit = 1u64 << seq;
                if self.received_mask & bit != 0 {
                    return ChunkOutcome::Duplicate;
                }
                self.store(seq, payload);
                self.received_mask |= bit;
                let full = u64::MAX >> (64 - self.total_chunks);
                if self.received_mask == full {
                    self.complete = true;
                    info!("all {} chunks received", self.total_chunks);
                    return ChunkOutcome::Completed;
                }
            }
        }
        ChunkOutcome::Stored
    }

    fn store(&mut self, seq: usize, payload: &[SamplePair]) {
        let start = seq * self.chunk_size;
        self.pairs[start..start + self.chunk_size].copy_from_slice(payload);
    }

    /// Hand the completed buffer out and reset for the next set.
    pub fn take(&mut self) -> SampleBuffer {
        let samples = self.pairs.len();
        let pairs = std::mem::replace(&mut self.pairs, vec![SamplePair::default(); samples]);
        self.next_expected = 0;
        self.received_mask = 0;
        self.complete = false;
        SampleBuffer::new(pairs)
    }
}
