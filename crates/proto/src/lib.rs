//! protocol layer for motelink: neighbour discovery, link-quality gating,
//! and reliable chunked transfer of sample buffers, driven over a
//! duty-cycled radio

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use motelink_core::types::LINK_MTU;
use motelink_core::Rssi;

pub mod collector;
pub mod discovery;
pub mod link;
pub mod node;
pub mod reassembly;
pub mod transfer;

pub use collector::{Collector, Sampler};
pub use discovery::{Discovery, Phase};
pub use link::{LinkEvent, LinkGate, LinkState};
pub use node::{DiscoveryNode, ReceiverNode, SenderNode};
pub use reassembly::{ChunkOutcome, ChunkTracking, Reassembly};
pub use transfer::{AckOutcome, RetryOutcome, TransferSession};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{samples} samples do not divide evenly into chunks of {chunk_size}")]
    UnevenChunks { samples: usize, chunk_size: usize },

    #[error("chunk count exceeds the 8-bit sequence space")]
    TooManyChunks,

    #[error("bitmask tracking supports at most 64 chunks")]
    MaskTooWide,

    #[error("data frame of {frame} bytes exceeds the {mtu}-byte link MTU")]
    FrameExceedsMtu { frame: usize, mtu: usize },
}

/// Tunables for every protocol role. Defaults reproduce the canonical
/// two-node deployment: 100 ms slots, 60 samples per set in 3 chunks of
/// 20, a −70 dBm gate needing 3 consecutive good readings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Duration of one scheduler slot.
    pub slot: Duration,
    /// Beacons transmitted back to back in one discovery wake episode.
    pub num_send: u32,
    /// Sleep-slot count while searching (low duty cycle).
    pub low_sleep_slots: u32,
    /// Draw the searching sleep-slot count uniformly from `[0, 2×base]`
    /// to desynchronize colliding wake phases.
    pub randomize_sleep: bool,
    /// Give up on an unconfirmed aggressive phase after this long.
    pub aggressive_timeout: Duration,
    /// Length of the explicit acknowledgment-beacon window.
    pub ack_window: Duration,
    /// Break the simultaneous-ack-sender tie by node id (lower id wins).
    pub tie_break_by_id: bool,
    /// Listening window after each transmission.
    pub wake_window: Duration,
    /// Pause between acknowledged chunks.
    pub chunk_interval: Duration,
    /// Sensor sampling period.
    pub sample_interval: Duration,
    pub samples: usize,
    pub chunk_size: usize,
    /// Completed sets buffered while waiting for a link.
    pub max_sets: usize,
    /// Start collecting only once |motion| reaches this; `None` samples
    /// free-running.
    pub motion_trigger: Option<i16>,
    /// Answer REQUEST only while |motion| is below this; `None` always
    /// answers.
    pub still_threshold: Option<i16>,
    pub rssi_good_threshold: Rssi,
    /// Consecutive good readings required before the link is usable.
    pub good_required: u8,
    /// Track consecutive bad readings and demote an established link.
    pub track_link_loss: bool,
    /// Times the receiver repeats each data ack.
    pub ack_repeat: u32,
    /// Abandon a chunk after this many resends; `None` retries forever.
    pub max_chunk_retries: Option<u32>,
    pub tracking: ChunkTracking,
    /// Receiver sleep slots between listen windows; 0 listens
    /// continuously.
    pub rx_sleep_slots: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            slot: Duration::from_millis(100),
            num_send: 2,
            low_sleep_slots: 18,
            randomize_sleep: false,
            aggressive_timeout: Duration::from_secs(10),
            ack_window: Duration::from_secs(2),
            tie_break_by_id: true,
            wake_window: Duration::from_millis(100),
            chunk_interval: Duration::from_millis(250),
            sample_interval: Duration::from_secs(1),
            samples: 60,
            chunk_size: 20,
            max_sets: 5,
            motion_trigger: None,
            still_threshold: None,
            rssi_good_threshold: -70,
            good_required: 3,
            track_link_loss: false,
            ack_repeat: 5,
            max_chunk_retries: None,
            tracking: ChunkTracking::InOrder,
            rx_sleep_slots: 1,
        }
    }
}

impl ProtocolConfig {
    pub fn chunk_count(&self) -> usize {
        self.samples / self.chunk_size
    }

    /// Encoded size of a full data frame under this config.
    pub fn data_frame_len(&self) -> usize {
        4 + self.chunk_size * 4
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 || self.samples == 0 || self.samples % self.chunk_size != 0 {
            return Err(ConfigError::UnevenChunks {
                samples: self.samples,
                chunk_size: self.chunk_size,
            });
        }
        if self.chunk_count() > u8::MAX as usize + 1 {
            return Err(ConfigError::TooManyChunks);
        }
        if self.tracking == ChunkTracking::Bitmask && self.chunk_count() > 64 {
            return Err(ConfigError::MaskTooWide);
        }
        if self.data_frame_len() > LINK_MTU {
            return Err(ConfigError::FrameExceedsMtu {
                frame: self.data_frame_len(),
                mtu: LINK_MTU,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = ProtocolConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.chunk_count(), 3);
        assert!(cfg.data_frame_len() <= LINK_MTU);
    }

    #[test]
    fn uneven_chunking_is_rejected() {
        let cfg = ProtocolConfig {
            samples: 60,
            chunk_size: 25,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::UnevenChunks { .. })
        ));
    }

    #[test]
    fn oversized_chunks_are_rejected() {
        let cfg = ProtocolConfig {
            samples: 120,
            chunk_size: 40,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::FrameExceedsMtu { .. })
        ));
    }
}
