//! Sender side of the chunked transfer: one outstanding chunk at a time,
//! advanced only by a matching ack, resent on a quiet listen window.

use log::debug;

use motelink_core::{Frame, NodeId, SampleBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Stale, mismatched, or foreign ack; no state change.
    Ignored,
    /// Current chunk acknowledged, session moved to the next.
    Advanced,
    /// Last chunk acknowledged, session finished.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    RetrySame,
    Abort,
}

pub struct TransferSession {
    peer: NodeId,
    chunk: usize,
    total_chunks: usize,
    chunk_size: usize,
    awaiting_ack: bool,
    retries: u32,
    max_retries: Option<u32>,
}

impl TransferSession {
    pub fn new(
        peer: NodeId,
        samples: usize,
        chunk_size: usize,
        max_retries: Option<u32>,
    ) -> Self {
        Self {
            peer,
            chunk: 0,
            total_chunks: samples / chunk_size,
            chunk_size,
            awaiting_ack: false,
            retries: 0,
            max_retries,
        }
    }

    pub fn peer(&self) -> NodeId {
        self.peer
    }

    pub fn current_chunk(&self) -> usize {
        self.chunk
    }

    pub fn is_complete(&self) -> bool {
        self.chunk >= self.total_chunks
    }

    /// The data frame for the current chunk. Retries rebuild the identical
    /// frame: same sequence number, same payload slice.
    pub fn data_frame(&self, sender: NodeId, buf: &SampleBuffer) -> Frame {
        Frame::Data {
            sender,
            seq: self.chunk as u8,
            payload: buf.chunk(self.chunk, self.chunk_size).to_vec(),
        }
    }

    pub fn mark_sent(&mut self) {
        self.awaiting_ack = true;
    }

    /// An ack advances the session only when it is from the bound peer and
    /// names the outstanding chunk; anything else is ignored so a delayed
    /// duplicate cannot double-advance.
    pub fn on_ack(&mut self, from: NodeId, seq: u8) -> AckOutcome {
        if !self.awaiting_ack || from != self.peer || seq as usize != self.chunk {
            debug!("ignoring ack seq {} from {}", seq, from);
            return AckOutcome::Ignored;
        }
        self.awaiting_ack = false;
        self.retries = 0;
        self.chunk += 1;
        if self.is_complete() {
            AckOutcome::Complete
        } else {
            AckOutcome::Advanced
        }
    }

    /// The listen window closed without a matching ack.
    pub fn on_window_closed(&mut self) -> RetryOutcome {
        self.retries += 1;
        match self.max_retries {
            Some(max) if self.retries > max => RetryOutcome::Abort,
            _ => RetryOutcome::RetrySame,
        }
    }
}
