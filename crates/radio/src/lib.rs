//! radio layer for motelink: the link abstraction the protocol drives,
//! the duty-cycle scheduler that owns the power switch, and a simulated
//! lossy channel for running nodes off-hardware

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use motelink_core::{NodeId, Rssi};

pub mod airwaves;
pub mod scheduler;

pub use airwaves::{Airwaves, SimRadio};
pub use scheduler::DutyCycle;

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("frame exceeds radio MTU")]
    FrameTooLarge,

    #[error("radio transmission failed")]
    TransmitFailed,

    #[error("radio is powered down")]
    PoweredDown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    pub mtu: usize,
    pub bandwidth_bps: u32,
    pub packet_loss: f64,
    pub latency: Duration,
    pub latency_jitter: Duration,
    pub rssi_dbm: Rssi,
    pub rssi_jitter_dbm: Rssi,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            mtu: 127,
            bandwidth_bps: 250_000,
            packet_loss: 0.10,
            latency: Duration::from_millis(2),
            latency_jitter: Duration::from_millis(1),
            rssi_dbm: -60,
            rssi_jitter_dbm: 6,
        }
    }
}

/// One inbound frame with its link-time signal strength reading.
#[derive(Debug, Clone)]
pub struct Received {
    pub bytes: Bytes,
    pub src: NodeId,
    pub rssi: Rssi,
}

/// The link the protocol runs over. Hardware would implement this against
/// a real transceiver; tests and simulation use [`SimRadio`].
#[async_trait]
pub trait Radio: Send {
    /// Transmit one frame, unicast to `dest` or broadcast when `None`.
    async fn transmit(&self, bytes: &[u8], dest: Option<NodeId>) -> Result<(), RadioError>;

    /// The power switch. Only the scheduler calls this.
    fn set_power(&self, on: bool);

    fn is_powered(&self) -> bool;

    /// Next frame heard while powered on. Frames arriving while powered
    /// off never reach this queue.
    async fn recv(&mut self) -> Option<Received>;
}
